//! Event types broadcast to frontends.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so hosts can
//! forward them as JSON lines or over any other IPC transport.

pub mod events;
