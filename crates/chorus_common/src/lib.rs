//! Chorus Common - wire types shared by chorusd and chorusctl.
//!
//! Everything that crosses the HTTP boundary lives here so the daemon and the
//! client can never disagree on field names.

pub mod frames;
pub mod types;

pub use frames::{FrameError, SessionOutcome, SessionReader, StreamFrame};
pub use types::*;
