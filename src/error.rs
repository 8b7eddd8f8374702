//! Error types shared across the alarm pipeline.
//!
//! Each concern owns a narrow error enum: the durable mirror ([`StoreError`]),
//! strategy lookup ([`ResolveError`]) and external notification calls
//! ([`InvokeError`]). [`AlarmError`] wraps all of them for callers that do not
//! care which stage failed.
//!
//! # Examples
//! ```
//! use tocsin::error::{AlarmError, StoreError};
//!
//! let error: AlarmError = StoreError::Unavailable("connection refused".to_string()).into();
//! assert_eq!(format!("{}", error), "Store error: store unavailable: connection refused");
//! ```

use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`Mirror`](crate::store::Mirror) backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be decoded.
    #[error("corrupt value: {0}")]
    Corrupt(String),
}

/// Failures while resolving the strategy that owns an event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("strategy not found: {0}")]
    StrategyNotFound(String),

    #[error("invalid event id: {0}")]
    InvalidEventId(String),
}

/// Failures of the external notification executable.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("failed to spawn notifier: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("notifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("notifier exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Umbrella error for the alarm pipeline.
#[derive(Error, Debug)]
pub enum AlarmError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Invoke error: {0}")]
    Invoke(#[from] InvokeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub type Result<T> = std::result::Result<T, AlarmError>;
