//! # JotDB Testkit
//!
//! Test utilities for JotDB:
//! - Canned schemas and session fixtures over the in-memory plugin
//! - Property-based generators for the canonical value model
//!
//! ## Usage
//!
//! ```rust
//! use jotdb_testkit::prelude::*;
//!
//! let (session, _plugin) = memory_session();
//! let people = session.collection(people_schema());
//! people.add(vec![person("Ann", 47)]).unwrap();
//! session.commit().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
