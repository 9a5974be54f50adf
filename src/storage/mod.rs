//! Storage collaborators
//!
//! Only the in-memory reference collaborator ships with the crate; other
//! backends implement [`Storer`](crate::core::Storer) outside of it.

pub mod in_memory;

pub use in_memory::MemoryStorer;
