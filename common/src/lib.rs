//! Tally Common Types
//!
//! Shared types used across the Tally workspace: account and transfer
//! identifiers, currency codes, the ledger error taxonomy and deadlines.

pub mod identifiers;
pub mod monetary;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
pub use time::*;
