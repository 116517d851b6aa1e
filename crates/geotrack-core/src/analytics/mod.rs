//! Read-only analytics over stored sessions
//!
//! - Derived statistics (average/top speed) ([`stats`])
//! - CSV and GPX serialization ([`export`])

pub mod export;
pub mod stats;
