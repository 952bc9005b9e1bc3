//! Test Helper Utilities
//!
//! Fake collaborators for driving the run orchestrator without network
//! access or external tools.

pub mod fakes;

pub use fakes::{
    build_orchestrator, FakeCatalog, FakeInspector, RecordingProgress, ScriptedSnapshotter, ScriptedWriter,
};
