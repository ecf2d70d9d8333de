//! One-time construction of an app instance.

use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use super::factory::{AppRuntime, PipelineFactory};
use crate::addons::addon_hooks;
use crate::app::{AppDescriptor, AppInstanceId};
use crate::config::Configuration;
use crate::deferred::Deferred;
use crate::error::{MosaicError, MosaicResult, render_error};
use crate::exports::{LifecyclePhase, resolve_lifecycles};
use crate::gate::SingularGate;
use crate::hooks::{HookContext, HookStage, LifecycleHooks, run_chain};
use crate::host::{
    CssScoper, ElementGetter, GlobalScope, Host, HostDocument, NodeId, SCOPED_CSS_ATTRIBUTE,
    SandboxKind, SandboxRequest,
};
use crate::render::{RenderPhase, Renderer};

/// How to build an app's wrapper element.
pub(crate) struct WrapperSpec {
    app_name: String,
    markup: String,
    strict_style_isolation: bool,
    scoped_css: bool,
}

impl WrapperSpec {
    fn new(
        app_name: &str,
        instance_id: &AppInstanceId,
        template: &str,
        config: &Configuration,
    ) -> Self {
        let sandbox = config.framework.sandbox;
        let sandbox_cfg = serde_json::to_string(&sandbox).unwrap_or_default();
        let markup = format!(
            "<div id=\"__mosaic_microapp_wrapper_for_{id}__\" data-name=\"{name}\" \
             data-version=\"{version}\" data-sandbox-cfg='{sandbox_cfg}'>{template}</div>",
            id = instance_id.snake_case(),
            name = escape_attribute(app_name),
            sandbox_cfg = escape_attribute(&sandbox_cfg),
            version = env!("CARGO_PKG_VERSION"),
        );
        Self {
            app_name: app_name.to_owned(),
            markup,
            strict_style_isolation: sandbox.strict_style_isolation(),
            scoped_css: sandbox.scoped_css(),
        }
    }

    /// Create a detached wrapper, isolating or scoping its styles as
    /// configured.
    pub(crate) fn create(
        &self,
        document: &dyn HostDocument,
        css: &dyn CssScoper,
    ) -> MosaicResult<NodeId> {
        let render_err = |e: &anyhow::Error| MosaicError::Render {
            app: self.app_name.clone(),
            message: render_error(e),
        };
        let wrapper = document
            .create_element(&self.markup)
            .map_err(|e| render_err(&e))?;

        if self.strict_style_isolation {
            if document.supports_shadow_root() {
                document
                    .attach_shadow_root(wrapper)
                    .map_err(|e| render_err(&e))?;
            } else {
                warn!(
                    app = %self.app_name,
                    "Strict style isolation requested but shadow roots are not supported, rendering without isolation"
                );
            }
        }

        if self.scoped_css {
            document.set_attribute(wrapper, SCOPED_CSS_ATTRIBUTE, &self.app_name);
            for style in document.style_elements(wrapper) {
                css.process(wrapper, style, &self.app_name);
            }
        }
        Ok(wrapper)
    }
}

/// Escape `value` for use inside a quoted attribute.
fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Build a [`PipelineFactory`] for `app`.
///
/// Fetches the entry, renders the initial loading state, creates the
/// sandbox, runs the `before_load` chain (add-ons first), executes the
/// scripts and resolves the exported lifecycle. None of this is repeated
/// when the factory is invoked again.
///
/// # Errors
///
/// - [`MosaicError::ConfigurationConflict`] for impossible option
///   combinations, before any async work
/// - [`MosaicError::EntryFetch`] if fetching or parsing fails
/// - [`MosaicError::ContainerNotFound`] if the initial container is missing
/// - [`MosaicError::Sandbox`], [`MosaicError::Hook`] or
///   [`MosaicError::Lifecycle`] from the respective collaborator
/// - [`MosaicError::LifecycleExport`] if no lifecycle can be found
pub async fn load_app(
    host: &Host,
    gate: Arc<SingularGate>,
    app: AppDescriptor,
    config: &Configuration,
    hooks: &LifecycleHooks,
) -> MosaicResult<PipelineFactory> {
    config.check_conflicts(&app)?;
    let exclude_asset_filter = config.asset_filter()?;

    let app = Arc::new(app);
    let instance_id = AppInstanceId::generate(&app.name);
    let singular = config.is_singular(&app);
    info!(app = %app.name, instance_id = %instance_id, entry = %app.entry, singular, "Loading app");

    let parsed = host
        .fetcher
        .fetch_and_parse(&app.entry, &config.framework.fetch)
        .await
        .map_err(|e| MosaicError::EntryFetch {
            app: app.name.clone(),
            message: render_error(&e),
        })?;
    debug!(app = %app.name, public_path = %parsed.asset_public_path, "Entry parsed");

    let wrapper_spec = WrapperSpec::new(&app.name, &instance_id, &parsed.template, config);
    let initial_wrapper = wrapper_spec.create(host.document.as_ref(), host.css.as_ref())?;

    let renderer = Renderer::new(&app, Arc::clone(&host.document));
    renderer.render(
        Some(initial_wrapper),
        true,
        app.container.as_ref(),
        RenderPhase::Loading,
    )?;

    let sandbox_wrapper = Arc::new(Mutex::new(Some(initial_wrapper)));
    let sandbox_setting = config.framework.sandbox;
    let sandbox = if sandbox_setting.is_enabled() {
        let kind = if !host.sandbox.supports_proxy() {
            SandboxKind::Snapshot
        } else if sandbox_setting.loose() {
            SandboxKind::Legacy
        } else {
            SandboxKind::Proxy
        };
        let element_getter: ElementGetter = {
            let slot = Arc::clone(&sandbox_wrapper);
            Arc::new(move || *slot.lock().unwrap_or_else(PoisonError::into_inner))
        };
        let request = SandboxRequest {
            app_name: app.name.clone(),
            kind,
            element_getter,
            scoped_css: sandbox_setting.scoped_css(),
            exclude_asset_filter,
        };
        debug!(app = %app.name, %kind, "Creating sandbox");
        let sandbox = host
            .sandbox
            .create(request, Arc::clone(&host.global))
            .map_err(|e| MosaicError::Sandbox {
                app: app.name.clone(),
                message: render_error(&e),
            })?;
        Some(sandbox)
    } else {
        None
    };
    let global: Arc<dyn GlobalScope> = match &sandbox {
        Some(sandbox) => sandbox.proxy(),
        None => Arc::clone(&host.global),
    };

    let hooks = addon_hooks(&global, &parsed.asset_public_path).merge(hooks);
    let hook_ctx = HookContext {
        app: Arc::clone(&app),
        global: Arc::clone(&global),
    };
    run_chain(&hooks, HookStage::BeforeLoad, &hook_ctx).await?;

    let strict_global = sandbox_setting.is_enabled() && !sandbox_setting.loose();
    let exports = parsed
        .scripts
        .exec_scripts(Arc::clone(&global), strict_global)
        .await
        .map_err(|e| MosaicError::Lifecycle {
            app: app.name.clone(),
            phase: LifecyclePhase::Scripts,
            message: render_error(&e),
        })?;

    let latest_set_prop = sandbox.as_ref().and_then(|s| s.latest_set_prop());
    let lifecycles = resolve_lifecycles(
        &app.name,
        exports.as_ref(),
        global.as_ref(),
        latest_set_prop.as_deref(),
    )?;
    let global_state = host.global_state.actions(&instance_id);

    Ok(PipelineFactory::new(AppRuntime {
        app,
        instance_id,
        singular,
        gate,
        document: Arc::clone(&host.document),
        css: Arc::clone(&host.css),
        renderer,
        wrapper_spec,
        initial_wrapper,
        sandbox_wrapper,
        sandbox,
        hooks,
        hook_ctx,
        lifecycles,
        global_state,
        invocations: AtomicUsize::new(0),
        bootstrapped: Deferred::new(),
        bootstrap_error: Mutex::new(None),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_attribute() {
        assert_eq!(escape_attribute("orders"), "orders");
        assert_eq!(
            escape_attribute(r#"a"b'c<d>&"#),
            "a&quot;b&#39;c&lt;d&gt;&amp;"
        );
    }

    #[test]
    fn test_wrapper_markup_escapes_name() {
        let id = AppInstanceId::generate("x");
        let wrapper = WrapperSpec::new(r#"o"rders"#, &id, "<p></p>", &Configuration::default());
        assert!(wrapper.markup.contains(r#"data-name="o&quot;rders""#));
        assert!(wrapper.markup.contains("data-sandbox-cfg='true'"));
    }
}
