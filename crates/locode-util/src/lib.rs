//! Shared utilities for locode.
//!
//! This crate provides common utilities used across the locode workspace:
//! - Path resolution and the trusted-root guard used by file tools
//! - Logging setup with tracing

pub mod log;
pub mod path;

pub use path::{is_safe, TrustedRoot};
