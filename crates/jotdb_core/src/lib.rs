//! # JotDB Core
//!
//! The JotDB data-access engine.
//!
//! This crate provides:
//! - Tracked records that observe mutations against a snapshot
//! - A structural diff engine producing minimal update payloads
//! - Composable, immutable query plans with predicate pushdown
//! - A session/collection unit of work with all-or-nothing commit
//! - The [`StoragePlugin`] contract that storage backends implement
//!
//! Schemas and the canonical value model live in `jotdb_schema`;
//! ready-made plugins live in `jotdb_plugins`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod collection;
pub mod diff;
mod error;
mod executor;
mod outcome;
mod plan;
mod plugin;
mod record;
mod session;

pub use change::{ChangeSet, CollectionChanges};
pub use collection::Collection;
pub use error::{EngineError, EngineResult};
pub use outcome::Outcome;
pub use plan::{
    multi_key_cmp, AggregateKind, FilterOp, Operand, PlanOp, Predicate, Projection, Projector,
    Query, RecordPredicate, SortDirection,
};
pub use plugin::{
    Capabilities, PersistReceipt, PlanPrefix, PluginError, PluginResult, PushableOp, StoragePlugin,
};
pub use record::{RecordState, TrackedRecord};
pub use session::{CommitResult, Session};
