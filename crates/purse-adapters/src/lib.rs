//! Reference adapters for the purse engine's extension points.
//!
//! These are the batteries-included implementations used by integration
//! tests and local development: deterministic payment gateways and simple
//! in-memory collaborators. Production deployments supply their own.

#![deny(unsafe_code)]

pub mod collaborators;
pub mod gateways;

pub use collaborators::{DenyListPolicy, RecordingNotifier, StaticDirectory};
pub use gateways::{AlwaysFailGateway, MockGateway};
