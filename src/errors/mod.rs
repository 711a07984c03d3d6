//! # Error Handling
//!
//! Error types shared by the certificate stores and the identity providers.
//!
//! Store write failures always propagate. Lookup misses are ordinary outcomes
//! (`Option::None`), except for `revoke` of an unknown key which reports
//! [`KeymintError::NotFound`]. Provider network failures inside the
//! authorization decision are folded to a negative result and never surface here.

pub mod types;

pub use types::{KeymintError, Result, GENERIC_AUTH_FAILURE};
