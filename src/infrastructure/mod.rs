//! Adapters behind the domain ports plus the cross-frame plumbing.

pub mod bus;
pub mod client;
pub mod in_memory;
pub mod reply;
pub mod shared_state;
