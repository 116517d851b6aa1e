//! Tracking module
//!
//! This module contains the live-tracking functionality:
//! - Session and fix data model ([`session`])
//! - Location source subscription abstraction ([`source`])
//! - The session state machine and flush policy ([`engine`])

pub mod engine;
pub mod session;
pub mod source;
