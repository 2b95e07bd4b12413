//! Transit routing server.
//!
//! Answers point-to-point routing queries from a remote simulation over
//! gRPC. Each query runs on one of a fixed set of worker threads, every one
//! of which owns a private copy of the scenario and routing engine.

pub mod config;
pub mod domain;
pub mod engine;
pub mod ids;
pub mod pool;
pub mod profiling;
pub mod proto;
pub mod server;
pub mod service;

/// Abbreviated commit hash this binary was built from.
pub const BUILD_ID: &str = env!("ROUTING_BUILD_ID");
