pub mod edit_reader;
