///! Shared domain types for the SkyStat telescope status service.
///!
///! This crate holds everything both the server and external consumers agree
///! on: the snapshot record, the closed filter enumeration, and the
///! sexagesimal coordinate formatting used for display.

// ============ Coordinate Formatting ============
pub mod coords;

// ============ Snapshot Record ============
mod snapshot;
pub use snapshot::{
    Filter, NewSnapshot, StatusSnapshot, UnknownFilter, MIN_EFFECTIVE_EXPOSURE_SECS,
};
