//! Repository implementations for database access
//!
//! Each repository borrows the shared [`Database`](super::Database) and:
//! - Relies on unique indexes for conflicts (no check-then-insert)
//! - Registers with the drain tracker for the length of every call

pub mod users;

pub use users::UserRepo;
