//! Helpers for the event id naming scheme.
//!
//! Event ids encode the strategy that produced them:
//! * `s_<strategyID>_<suffix>` for events raised by a threshold strategy;
//! * `nodata_s_<strategyID>_<suffix>` or `nodata_<strategyID>_<suffix>` for
//!   events synthesized by the no-data checker.
//!
//! # Example
//! ```
//! use tocsin::event::id::{is_nodata, parse_strategy_id};
//!
//! assert_eq!(parse_strategy_id("s_7_host1").unwrap(), 7);
//! assert_eq!(parse_strategy_id("nodata_s_12_host1").unwrap(), 12);
//! assert!(is_nodata("nodata_12_host1"));
//! ```

use crate::error::ResolveError;

/// Prefix of events raised by a strategy.
pub const STRATEGY_PREFIX: &str = "s_";
/// Prefix of events raised by the no-data checker.
pub const NODATA_PREFIX: &str = "nodata_";

/// Returns `true` when the id was produced by the no-data checker.
pub fn is_nodata(id: &str) -> bool {
    id.starts_with(NODATA_PREFIX)
}

/// Extracts the strategy id from an event id.
///
/// # Errors
/// Returns [`ResolveError::InvalidEventId`] when the id carries neither known
/// prefix or the strategy segment is not numeric.
pub fn parse_strategy_id(id: &str) -> Result<u64, ResolveError> {
    let invalid = || ResolveError::InvalidEventId(id.to_string());

    let (rest, nodata) = match id.strip_prefix(NODATA_PREFIX) {
        Some(rest) => (rest, true),
        None => (id, false),
    };
    let rest = match rest.strip_prefix(STRATEGY_PREFIX) {
        Some(rest) => rest,
        None if nodata => rest,
        None => return Err(invalid()),
    };

    rest.split('_')
        .next()
        .filter(|segment| !segment.is_empty())
        .and_then(|segment| segment.parse::<u64>().ok())
        .ok_or_else(invalid)
}
