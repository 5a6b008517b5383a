//! Testing utilities, fixtures, and mocks for locode.
//!
//! - **Fixtures**: temporary project directories
//! - **Mocks**: scripted confirmation gates
//! - **Providers**: a language model that replays queued responses
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use locode_test_utils::{RecordingGate, RecordingProvider, TestProject};
//!
//! let project = TestProject::new().with_file("notes.txt", "hello").build();
//! let provider = RecordingProvider::new()
//!     .with_tool_call("call_1", "read_file", r#"{"path": "notes.txt"}"#)
//!     .with_response("It says hello.");
//! let gate = RecordingGate::approving();
//! ```

pub mod fixtures;
pub mod mocks;
pub mod providers;

// Re-export commonly used items
pub use fixtures::{BuiltTestProject, TestProject};
pub use mocks::{HeldGate, PendingGate, RecordingGate};
pub use providers::{ProviderResponse, RecordedCall, RecordingProvider};
