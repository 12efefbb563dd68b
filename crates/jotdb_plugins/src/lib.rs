//! # JotDB Plugins
//!
//! Ready-made [`jotdb_core::StoragePlugin`] implementations:
//! - [`MemoryPlugin`]: a fully capable in-memory backend
//! - [`LoggingPlugin`]: a tracing decorator over any plugin
//! - [`ReplicationPlugin`]: write fan-out with a designated read member
//!
//! Plugins compose: a replication group of logged memory stores is just
//! nesting.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod logging;
mod memory;
mod replication;

pub use logging::LoggingPlugin;
pub use memory::MemoryPlugin;
pub use replication::{ReadFrom, ReplicationPlugin};
