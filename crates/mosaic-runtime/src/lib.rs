//! Mosaic Runtime - micro-app lifecycle orchestration.
//!
//! This crate composes independently built micro apps into one host page.
//! It turns an [`AppDescriptor`] into an ordered, re-invokable pipeline of
//! async lifecycle steps, serializes mount/unmount across apps in singular
//! mode, and reuses app instances mounted into the same container.
//!
//! # Architecture
//!
//! - [`Deferred`]: one-shot completion signal used as a rendezvous.
//! - [`SingularGate`]: keeps at most one app active at a time.
//! - [`InstanceCache`]: cached pipeline factories and per-container
//!   instance lists for ad-hoc loads.
//! - [`PipelineFactory`] / [`LifecyclePipeline`]: the lifecycle builder.
//! - [`Renderer`]: puts the app wrapper into its container.
//! - [`MicroFrontend`]: registration, start and ad-hoc loading facade.
//!
//! Everything that touches the real page (document, script execution,
//! sandbox internals, routing) is reached through the traits in [`host`].
//!
//! # Example
//!
//! ```rust,ignore
//! use mosaic_runtime::prelude::*;
//!
//! let frontend = MicroFrontend::new(host);
//! frontend.register_micro_apps(
//!     vec![AppDescriptor::new("orders", Entry::url("//localhost:7100"))
//!         .with_container(ContainerTarget::selector("#subapp"))
//!         .with_activation(ActivationRule::prefix("/orders"))],
//!     LifecycleHooks::new(),
//! )?;
//! frontend.start(None)?;
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod addons;
pub mod app;
pub mod cache;
pub mod config;
pub mod deferred;
pub mod error;
pub mod exports;
pub mod gate;
pub mod handle;
pub mod hooks;
pub mod host;
pub mod orchestrator;
pub mod pipeline;
pub mod render;

pub use app::{
    ActivationRule, AppDescriptor, AppInstanceId, ContainerTarget, Entry, LegacyRender,
    LegacyRenderProps, LoaderFn, Props,
};
pub use cache::{InstanceCache, InstanceKey};
pub use config::{Configuration, SingularMode};
pub use deferred::Deferred;
pub use error::{MosaicError, MosaicResult};
pub use exports::{ExportedModule, LifecycleFn, LifecyclePhase, LifecycleProps, Lifecycles};
pub use gate::SingularGate;
pub use handle::{AppStatus, MicroAppHandle};
pub use hooks::{HookContext, HookFn, HookStage, LifecycleHooks};
pub use host::Host;
pub use orchestrator::MicroFrontend;
pub use pipeline::{LifecyclePipeline, PipelineFactory, Step};
pub use render::{RenderPhase, Renderer};
