//! The re-invokable pipeline factory and the steps it assembles.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tracing::{debug, info};

use super::builder::WrapperSpec;
use super::{LifecyclePipeline, Step, merge_props};
use crate::app::{AppDescriptor, AppInstanceId, ContainerTarget, Props};
use crate::deferred::Deferred;
use crate::error::{MosaicError, MosaicResult, render_error};
use crate::exports::{LifecycleFn, LifecyclePhase, LifecycleProps, Lifecycles};
use crate::gate::SingularGate;
use crate::hooks::{HookContext, HookStage, LifecycleHooks, run_chain};
use crate::host::{CssScoper, GlobalScope, GlobalStateActions, HostDocument, NodeId, Sandbox};
use crate::render::{RenderPhase, Renderer};

/// Everything built once per app instance and shared by every invocation.
pub(crate) struct AppRuntime {
    pub(crate) app: Arc<AppDescriptor>,
    pub(crate) instance_id: AppInstanceId,
    pub(crate) singular: bool,
    pub(crate) gate: Arc<SingularGate>,
    pub(crate) document: Arc<dyn HostDocument>,
    pub(crate) css: Arc<dyn CssScoper>,
    pub(crate) renderer: Renderer,
    pub(crate) wrapper_spec: WrapperSpec,
    pub(crate) initial_wrapper: NodeId,
    /// The element the sandbox's getter reads.
    pub(crate) sandbox_wrapper: Arc<Mutex<Option<NodeId>>>,
    pub(crate) sandbox: Option<Arc<dyn Sandbox>>,
    pub(crate) hooks: LifecycleHooks,
    pub(crate) hook_ctx: HookContext,
    pub(crate) lifecycles: Lifecycles,
    pub(crate) global_state: Arc<dyn GlobalStateActions>,
    pub(crate) invocations: AtomicUsize,
    /// Resolved once the constructing invocation's bootstrap has settled.
    pub(crate) bootstrapped: Deferred,
    pub(crate) bootstrap_error: Mutex<Option<MosaicError>>,
}

impl AppRuntime {
    fn name(&self) -> &str {
        &self.app.name
    }

    fn sync_sandbox_wrapper(&self, wrapper: Option<NodeId>) {
        *self
            .sandbox_wrapper
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = wrapper;
    }

    async fn call(
        &self,
        phase: LifecyclePhase,
        f: &LifecycleFn,
        props: LifecycleProps,
    ) -> MosaicResult<()> {
        f(props).await.map_err(|e| MosaicError::Lifecycle {
            app: self.name().to_owned(),
            phase,
            message: render_error(&e),
        })
    }

    fn sandbox_error(&self, e: &anyhow::Error) -> MosaicError {
        MosaicError::Sandbox {
            app: self.name().to_owned(),
            message: render_error(e),
        }
    }
}

/// State of one factory invocation.
struct Invocation {
    container: Option<ContainerTarget>,
    new_container: bool,
    wrapper: Mutex<Option<NodeId>>,
    /// Claimed at the gate, not yet committed.
    pending_gate: Mutex<Option<Deferred>>,
    /// Committed after a full mount; resolved at the end of unmount.
    gate_token: Mutex<Option<Deferred>>,
}

impl Invocation {
    fn wrapper(&self) -> Option<NodeId> {
        *self.wrapper.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_wrapper(&self, wrapper: Option<NodeId>) {
        *self.wrapper.lock().unwrap_or_else(PoisonError::into_inner) = wrapper;
    }

    fn slot(&self, slot: GateSlot) -> &Mutex<Option<Deferred>> {
        match slot {
            GateSlot::Pending => &self.pending_gate,
            GateSlot::Committed => &self.gate_token,
        }
    }

    fn take_token(&self, slot: GateSlot) -> Option<Deferred> {
        self.slot(slot)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn put_token(&self, slot: GateSlot, token: Deferred) {
        *self.slot(slot).lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }
}

#[derive(Debug, Clone, Copy)]
enum GateSlot {
    Pending,
    Committed,
}

/// Builds [`LifecyclePipeline`]s for one loaded app instance.
///
/// The expensive setup (fetch, sandbox, script execution) happened once in
/// [`load_app`](super::load_app). Invoking the factory only assembles fresh
/// mount and unmount sequences, optionally bound to another container; from
/// the second invocation on `bootstrap` is a no-op.
#[derive(Clone)]
pub struct PipelineFactory {
    runtime: Arc<AppRuntime>,
}

impl fmt::Debug for PipelineFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineFactory")
            .field("app", &self.runtime.app.name)
            .field("instance_id", &self.runtime.instance_id)
            .field("singular", &self.runtime.singular)
            .field("invocations", &self.invocations())
            .finish()
    }
}

impl PipelineFactory {
    pub(crate) fn new(runtime: AppRuntime) -> Self {
        Self {
            runtime: Arc::new(runtime),
        }
    }

    /// App name.
    #[must_use]
    pub fn app_name(&self) -> &str {
        self.runtime.name()
    }

    /// Id of the loaded instance.
    #[must_use]
    pub fn instance_id(&self) -> &AppInstanceId {
        &self.runtime.instance_id
    }

    /// How many pipelines this factory has produced.
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.runtime.invocations.load(Ordering::SeqCst)
    }

    /// The global object the app's scripts run against.
    #[must_use]
    pub fn global(&self) -> Arc<dyn GlobalScope> {
        Arc::clone(&self.runtime.hook_ctx.global)
    }

    /// Whether the two factories are the same instance.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.runtime, &other.runtime)
    }

    /// Assemble a pipeline, mounting into `remount_container` instead of the
    /// descriptor's container when given.
    ///
    /// Only the caller that constructed the instance passes `bootstrap`.
    /// Every other pipeline gets a bootstrap step that runs nothing and
    /// just waits for the real one to settle, failing if it failed.
    #[must_use]
    pub fn invoke(
        &self,
        remount_container: Option<ContainerTarget>,
        bootstrap: bool,
    ) -> LifecyclePipeline {
        let rt = &self.runtime;
        let invocation = rt.invocations.fetch_add(1, Ordering::SeqCst);
        let new_container = remount_container
            .as_ref()
            .is_some_and(|c| rt.app.container.as_ref() != Some(c));
        let inv = Arc::new(Invocation {
            container: remount_container.or_else(|| rt.app.container.clone()),
            new_container,
            wrapper: Mutex::new(None),
            pending_gate: Mutex::new(None),
            gate_token: Mutex::new(None),
        });
        debug!(
            app = %rt.name(),
            instance_id = %rt.instance_id,
            invocation,
            bootstrap,
            new_container,
            "Assembling lifecycle pipeline"
        );

        let bootstrap = if bootstrap {
            step(rt, &inv, bootstrap_app)
        } else {
            step(rt, &inv, await_bootstrap)
        };

        let mount = [
            step(rt, &inv, mount_begin_loading),
            step(rt, &inv, mount_wait_gate),
            step(rt, &inv, mount_snapshot_wrapper),
            step(rt, &inv, mount_render_mounting),
            step(rt, &inv, mount_sandbox),
            step(rt, &inv, mount_before_hooks),
            step(rt, &inv, mount_app),
            step(rt, &inv, mount_render_mounted),
            step(rt, &inv, mount_after_hooks),
            step(rt, &inv, mount_commit_gate),
        ]
        .into_iter()
        .map(|s| release_on_error(&inv, GateSlot::Pending, s))
        .collect();

        let unmount = [
            step(rt, &inv, unmount_before_hooks),
            step(rt, &inv, unmount_app),
            step(rt, &inv, unmount_sandbox),
            step(rt, &inv, unmount_after_hooks),
            step(rt, &inv, unmount_clear_render),
            step(rt, &inv, unmount_release_gate),
        ]
        .into_iter()
        .map(|s| release_on_error(&inv, GateSlot::Committed, s))
        .collect();

        let update = rt.lifecycles.update.is_some().then(|| step(rt, &inv, update_app));

        LifecyclePipeline {
            name: rt.name().to_owned(),
            bootstrap,
            mount,
            unmount,
            update,
        }
    }
}

fn step<F, Fut>(rt: &Arc<AppRuntime>, inv: &Arc<Invocation>, f: F) -> Step
where
    F: Fn(Arc<AppRuntime>, Arc<Invocation>, Props) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MosaicResult<()>> + Send + 'static,
{
    let rt = Arc::clone(rt);
    let inv = Arc::clone(inv);
    Arc::new(move |props| f(Arc::clone(&rt), Arc::clone(&inv), props).boxed())
}

/// A failing step resolves the token held in `slot` so the next singular
/// waiter is not stranded.
fn release_on_error(inv: &Arc<Invocation>, slot: GateSlot, inner: Step) -> Step {
    let inv = Arc::clone(inv);
    Arc::new(move |props| {
        let inv = Arc::clone(&inv);
        let fut = inner(props);
        async move {
            let result = fut.await;
            if result.is_err()
                && let Some(token) = inv.take_token(slot)
                && token.resolve()
            {
                debug!(?slot, "Released singular gate after failed step");
            }
            result
        }
        .boxed()
    })
}

fn lifecycle_props(rt: &AppRuntime, props: &Props, container: Option<NodeId>) -> LifecycleProps {
    LifecycleProps {
        name: rt.name().to_owned(),
        props: merge_props(&rt.app.props, props),
        container,
        global_state: Some(Arc::clone(&rt.global_state)),
    }
}

async fn bootstrap_app(
    rt: Arc<AppRuntime>,
    _inv: Arc<Invocation>,
    props: Props,
) -> MosaicResult<()> {
    debug!(app = %rt.name(), "Bootstrapping");
    let props = LifecycleProps {
        global_state: None,
        ..lifecycle_props(&rt, &props, None)
    };
    let result = rt
        .call(LifecyclePhase::Bootstrap, &rt.lifecycles.bootstrap, props)
        .await;
    if let Err(e) = &result {
        *rt.bootstrap_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(e.clone());
    }
    rt.bootstrapped.resolve();
    result
}

async fn await_bootstrap(
    rt: Arc<AppRuntime>,
    _inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    if !rt.bootstrapped.is_resolved() {
        debug!(app = %rt.name(), "Waiting for the instance to bootstrap");
        rt.bootstrapped.wait().await;
    }
    let failed = rt
        .bootstrap_error
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    failed.map_or(Ok(()), Err)
}

async fn mount_begin_loading(
    rt: Arc<AppRuntime>,
    _inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    rt.app.set_loading(true);
    Ok(())
}

async fn mount_wait_gate(
    rt: Arc<AppRuntime>,
    inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    if rt.singular {
        debug!(app = %rt.name(), "Waiting for singular gate");
        let token = rt.gate.acquire().await;
        inv.put_token(GateSlot::Pending, token);
    }
    Ok(())
}

async fn mount_snapshot_wrapper(
    rt: Arc<AppRuntime>,
    inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    inv.set_wrapper(Some(rt.initial_wrapper));
    rt.sync_sandbox_wrapper(inv.wrapper());
    Ok(())
}

async fn mount_render_mounting(
    rt: Arc<AppRuntime>,
    inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    if inv.new_container || inv.wrapper().is_none() {
        let wrapper = rt.wrapper_spec.create(rt.document.as_ref(), rt.css.as_ref())?;
        inv.set_wrapper(Some(wrapper));
        rt.sync_sandbox_wrapper(Some(wrapper));
    }
    rt.renderer.render(inv.wrapper(), true, inv.container.as_ref(), RenderPhase::Mounting)
}

async fn mount_sandbox(
    rt: Arc<AppRuntime>,
    _inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    if let Some(sandbox) = &rt.sandbox {
        sandbox.mount().await.map_err(|e| rt.sandbox_error(&e))?;
    }
    Ok(())
}

async fn mount_before_hooks(
    rt: Arc<AppRuntime>,
    _inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    run_chain(&rt.hooks, HookStage::BeforeMount, &rt.hook_ctx).await
}

async fn mount_app(rt: Arc<AppRuntime>, inv: Arc<Invocation>, props: Props) -> MosaicResult<()> {
    let props = lifecycle_props(&rt, &props, inv.wrapper());
    rt.call(LifecyclePhase::Mount, &rt.lifecycles.mount, props).await
}

async fn mount_render_mounted(
    rt: Arc<AppRuntime>,
    inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    rt.renderer.render(inv.wrapper(), false, inv.container.as_ref(), RenderPhase::Mounted)?;
    rt.app.set_loading(false);
    Ok(())
}

async fn mount_after_hooks(
    rt: Arc<AppRuntime>,
    _inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    run_chain(&rt.hooks, HookStage::AfterMount, &rt.hook_ctx).await
}

async fn mount_commit_gate(
    rt: Arc<AppRuntime>,
    inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    if rt.singular
        && let Some(token) = inv.take_token(GateSlot::Pending)
    {
        inv.put_token(GateSlot::Committed, token);
    }
    info!(app = %rt.name(), instance_id = %rt.instance_id, "App mounted");
    Ok(())
}

async fn unmount_before_hooks(
    rt: Arc<AppRuntime>,
    _inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    run_chain(&rt.hooks, HookStage::BeforeUnmount, &rt.hook_ctx).await
}

async fn unmount_app(rt: Arc<AppRuntime>, inv: Arc<Invocation>, props: Props) -> MosaicResult<()> {
    let props = LifecycleProps {
        global_state: None,
        ..lifecycle_props(&rt, &props, inv.wrapper())
    };
    rt.call(LifecyclePhase::Unmount, &rt.lifecycles.unmount, props).await
}

async fn unmount_sandbox(
    rt: Arc<AppRuntime>,
    _inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    if let Some(sandbox) = &rt.sandbox {
        sandbox.unmount().await.map_err(|e| rt.sandbox_error(&e))?;
    }
    Ok(())
}

async fn unmount_after_hooks(
    rt: Arc<AppRuntime>,
    _inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    run_chain(&rt.hooks, HookStage::AfterUnmount, &rt.hook_ctx).await
}

async fn unmount_clear_render(
    rt: Arc<AppRuntime>,
    inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    rt.renderer.render(None, false, inv.container.as_ref(), RenderPhase::Unmounted)?;
    rt.global_state.off_global_state_change();
    inv.set_wrapper(None);
    rt.sync_sandbox_wrapper(None);
    Ok(())
}

async fn unmount_release_gate(
    rt: Arc<AppRuntime>,
    inv: Arc<Invocation>,
    _props: Props,
) -> MosaicResult<()> {
    if rt.singular
        && let Some(token) = inv.take_token(GateSlot::Committed)
    {
        token.resolve();
        debug!(app = %rt.name(), "Released singular gate");
    }
    info!(app = %rt.name(), instance_id = %rt.instance_id, "App unmounted");
    Ok(())
}

async fn update_app(rt: Arc<AppRuntime>, inv: Arc<Invocation>, props: Props) -> MosaicResult<()> {
    let Some(update) = &rt.lifecycles.update else {
        return Ok(());
    };
    let props = lifecycle_props(&rt, &props, inv.wrapper());
    rt.call(LifecyclePhase::Update, update, props).await
}
