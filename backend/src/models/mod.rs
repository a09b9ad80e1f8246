//! Data models shared across database access and the gate.

pub mod profile;
