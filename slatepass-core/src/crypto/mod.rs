//! Password derivation.
//!
//! This module provides:
//! - Charset assembly from the record's class flags
//! - Deterministic derivation (ratchet and legacy schemes) over HMAC-SHA-512
//! - True-random generation from the OS RNG
//! - A zeroize-on-drop wrapper for the master secret

pub mod charset;
pub mod derive;
pub mod zero;

pub use charset::{CharacterSets, Charset};
pub use derive::{
    derive, derive_from_params, derive_random, derive_with_scheme, fingerprint, random_from_params,
    DerivationScheme, Derived, RandomPassword, RANDOM_TAG,
};
pub use zero::MasterSecret;

use thiserror::Error;

/// Errors that can occur while deriving a password
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeriveError {
    #[error("Master secret must not be empty")]
    EmptySecret,

    #[error("At least one character class must be selected")]
    NoCharsetSelected,

    #[error("Length {requested} exceeds the {max} characters this scheme supports")]
    LengthUnsupported { requested: usize, max: usize },

    #[error("HMAC key rejected: {0}")]
    KeyRejected(String),

    #[error("Random number generation failed: {0}")]
    RandomFailed(String),
}

/// Result type for derivation
pub type Result<T> = std::result::Result<T, DeriveError>;
/// Alias used by callers outside this module
pub type DeriveResult<T> = Result<T>;
