//! Handling for sensitive values: OAuth client secrets and issued tokens.

pub mod types;

pub use types::SecretString;
