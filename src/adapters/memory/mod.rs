//! In-memory adapter
//!
//! Implements every store trait without a database, for tests and dry runs.

pub mod store;

pub use store::MemoryStore;
