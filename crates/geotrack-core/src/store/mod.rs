//! Durable session persistence

pub mod sessions;
