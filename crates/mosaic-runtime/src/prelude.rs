//! Prelude module - commonly used types for convenient import.
//!
//! Use `use mosaic_runtime::prelude::*;` to import all essential types.

// Errors
pub use crate::{MosaicError, MosaicResult};

// Descriptors and configuration
pub use crate::{
    ActivationRule, AppDescriptor, AppInstanceId, Configuration, ContainerTarget, Entry, Props,
    SingularMode,
};

// Lifecycle
pub use crate::{
    ExportedModule, HookContext, HookStage, LifecycleHooks, LifecyclePhase, LifecyclePipeline,
    LifecycleProps, PipelineFactory,
};

// Orchestration
pub use crate::{AppStatus, Deferred, Host, MicroAppHandle, MicroFrontend, SingularGate};

// Host contracts
pub use crate::host::{
    CssScoper, EntryFetcher, GlobalScope, GlobalStateActions, GlobalStateProvider, GlobalValue,
    HostDocument, NodeId, Router, Sandbox, SandboxProvider,
};
