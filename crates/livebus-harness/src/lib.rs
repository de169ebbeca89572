#![forbid(unsafe_code)]

//! Test fixtures for livebus.
//!
//! - [`Recorder`]: collects the values a subscriber callback receives.
//! - [`EventLog`]: one ordered log shared by several subscribers, exportable
//!   as JSONL for failure reports.
//! - [`ScriptedSource`]: a liveness source whose state can be changed
//!   silently, emitted, or scripted to move while it is being queried.
//! - [`init_test_logging`]: installs a `tracing` subscriber once per process.

pub mod logging;
pub mod recorder;
pub mod scripted;

pub use logging::init_test_logging;
pub use recorder::{EventLog, LoggedEvent, Recorder};
pub use scripted::ScriptedSource;
