//! Prelude module - commonly used test types for convenient import.
//!
//! Use `use mosaic_test::prelude::*;` to import all essential test types.

pub use crate::{
    EventLog, MemoryDocument, MemoryGlobal, MockEntry, MockEntryFetcher, MockGlobalState,
    MockRouter, MockSandboxProvider, RecordingCssScoper, RecordingPrefetcher, TestHarness,
    init_test_logging, recording_module, test_app,
};

pub use mosaic_runtime::prelude::*;
