//! # qdms
//!
//! The QDMS application crate: HTTP API, CLI, and configuration on top
//! of the deterministic `qdms-core` engine. Exposed as a library so the
//! integration tests can drive the router directly.

pub mod api;
pub mod cli;
pub mod config;
