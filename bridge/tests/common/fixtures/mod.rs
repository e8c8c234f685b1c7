//! Reusable test utilities:
//! - Scripted remote shell
//! - Recording issue reporter and entity sink
//! - Test configuration builder
//! - Coordinator harness over in-memory collaborators

// Not every test binary uses every fixture
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fake_shell;
pub mod harness;
pub mod recording;
pub mod test_config;

pub use fake_shell::FakeShell;
pub use harness::{TestAppliance, ENTRY_ID, VERSION};
pub use recording::{RecordingReporter, RecordingSink};
pub use test_config::TestConfigBuilder;
