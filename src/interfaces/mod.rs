pub mod csv;
pub mod frame;
pub mod merchant;
pub mod protocol;
