//! # mig: versioned SQL migrations
//!
//! Applies and reverts ordered, versioned SQL change-scripts against
//! Postgres, MySQL or SQLite, tracking every apply and revert in an
//! append-only history table so repeated invocations are idempotent and
//! safe across process restarts.
//!
//! A migration script holds both directions, delimited by annotations:
//!
//! ```sql
//! -- +mig Up
//! CREATE TABLE users (id bigint PRIMARY KEY, name text);
//!
//! -- +mig Down
//! DROP TABLE users;
//! ```
//!
//! Scripts are named `<version>_<description>.sql` with a strictly positive
//! numeric version, and each one runs inside its own transaction together
//! with its history record.

pub mod catalog;
pub mod dialect;
pub mod error;
pub mod ledger;
pub mod migrator;
pub mod script;

// Re-export the working surface at the crate root.
pub use catalog::*;
pub use dialect::*;
pub use error::*;
pub use ledger::*;
pub use migrator::*;
pub use script::*;
