//! # Strata Core
//!
//! Primary-key lookup tables for streaming joins.
//!
//! A join operator probes a [`PrimaryKeyLookupTable`](lookup::PrimaryKeyLookupTable)
//! with join-key rows. The table routes each probe to the owning
//! partition and bucket of an upstream LSM table and answers it either
//! from a locally mirrored file set or through a remote query service.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error_codes;
pub mod lookup;

pub use lookup::{LookupError, Result};
