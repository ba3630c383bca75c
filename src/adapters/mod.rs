//! Store integrations for Harvest.
//!
//! - [`database`] - trait layer every store implements, plus the [`Stores`](database::Stores) handle
//! - [`postgresql`] - PostgreSQL implementation (LMS tables + bookkeeping)
//! - [`memory`] - in-memory implementation for tests and dry runs
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies and
//! enable testing without a database. Each adapter implements every trait on a
//! single type and is handed to the pipeline through [`Stores`](database::Stores):
//!
//! ```rust
//! use harvest::adapters::database::Stores;
//! use harvest::adapters::memory::MemoryStore;
//! use std::sync::Arc;
//!
//! let stores = Stores::from_adapter(Arc::new(MemoryStore::new()));
//! # let _ = stores;
//! ```

pub mod database;
pub mod memory;
pub mod postgresql;
