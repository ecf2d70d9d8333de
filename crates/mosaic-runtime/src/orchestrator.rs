//! The registration, start and ad-hoc loading facade.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::app::{AppDescriptor, Props};
use crate::cache::{InstanceCache, InstanceKey, SharedFactory, TrackedInstance};
use crate::config::Configuration;
use crate::deferred::Deferred;
use crate::error::{MosaicError, MosaicResult, render_error};
use crate::gate::SingularGate;
use crate::handle::MicroAppHandle;
use crate::hooks::LifecycleHooks;
use crate::host::{AppLoader, ApplicationRegistration, Host, RouterStartOptions};
use crate::pipeline::{Step, load_app};

struct FrontendInner {
    host: Host,
    gate: Arc<SingularGate>,
    cache: Arc<InstanceCache>,
    config: RwLock<Configuration>,
    apps: Mutex<Vec<AppDescriptor>>,
    started: Deferred,
    router_started: AtomicBool,
    next_handle: AtomicU64,
}

impl FrontendInner {
    fn configuration(&self) -> Configuration {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ensure_router_started(&self, url_reroute_only: bool) {
        if !self.router_started.swap(true, Ordering::SeqCst) {
            debug!(url_reroute_only, "Starting router");
            self.host.router.start(RouterStartOptions { url_reroute_only });
        }
    }
}

/// Composes micro apps into one host page.
///
/// One `MicroFrontend` owns its singular gate and instance cache, so
/// independent instances never interfere with each other. Cloning is cheap
/// and shares that state.
#[derive(Clone)]
pub struct MicroFrontend {
    inner: Arc<FrontendInner>,
}

impl std::fmt::Debug for MicroFrontend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicroFrontend")
            .field("host", &self.inner.host)
            .field("apps", &self.registered_apps())
            .field("started", &self.is_started())
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

impl MicroFrontend {
    /// Create an orchestrator with the default configuration.
    #[must_use]
    pub fn new(host: Host) -> Self {
        Self::with_config(host, Configuration::default())
    }

    /// Create an orchestrator whose configuration, until `start()` replaces
    /// it, is `config`. Ad-hoc loads without an explicit configuration
    /// inherit it with singular mode off.
    #[must_use]
    pub fn with_config(host: Host, config: Configuration) -> Self {
        Self {
            inner: Arc::new(FrontendInner {
                host,
                gate: Arc::new(SingularGate::new()),
                cache: Arc::new(InstanceCache::new()),
                config: RwLock::new(config),
                apps: Mutex::new(Vec::new()),
                started: Deferred::new(),
                router_started: AtomicBool::new(false),
                next_handle: AtomicU64::new(1),
            }),
        }
    }

    /// The current framework configuration.
    #[must_use]
    pub fn configuration(&self) -> Configuration {
        self.inner.configuration()
    }

    /// The singular gate.
    #[must_use]
    pub fn gate(&self) -> &Arc<SingularGate> {
        &self.inner.gate
    }

    /// The instance cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<InstanceCache> {
        &self.inner.cache
    }

    /// Whether `start()` has run.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.started.is_resolved()
    }

    /// Names of the registered apps, in registration order.
    #[must_use]
    pub fn registered_apps(&self) -> Vec<String> {
        self.inner
            .apps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|app| app.name.clone())
            .collect()
    }

    /// Register apps with the router. An app whose name is already
    /// registered is ignored.
    ///
    /// The router may activate an app right away, but its pipeline is only
    /// built once `start()` has run.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::Router`] if an app has no activation rule or
    /// the router rejects it. Apps before it stay registered.
    pub fn register_micro_apps(
        &self,
        apps: Vec<AppDescriptor>,
        hooks: LifecycleHooks,
    ) -> MosaicResult<()> {
        for app in apps {
            let Some(activation) = app.activation.clone() else {
                return Err(MosaicError::Router(format!(
                    "app '{}' has no activation rule",
                    app.name
                )));
            };
            {
                let mut registered = self
                    .inner
                    .apps
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if registered.iter().any(|a| a.name == app.name) {
                    warn!(app = %app.name, "App already registered, ignoring duplicate");
                    continue;
                }
                registered.push(app.clone());
            }

            let registration = ApplicationRegistration {
                name: app.name.clone(),
                loader: app_loader(Arc::downgrade(&self.inner), app.clone(), hooks.clone()),
                activation,
                custom_props: app.props.clone(),
            };
            if let Err(e) = self.inner.host.router.register_application(registration) {
                self.forget(&app.name);
                return Err(MosaicError::Router(render_error(&e)));
            }
            info!(app = %app.name, "App registered");
        }
        Ok(())
    }

    /// Start the framework: settle the configuration, prefetch, start the
    /// router and release every loader waiting for start.
    ///
    /// Without an explicit configuration the current one is used.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::Config`] if the excluded-asset globs do not
    /// compile.
    pub fn start(&self, config: Option<Configuration>) -> MosaicResult<()> {
        let config = config
            .unwrap_or_else(|| self.configuration())
            .auto_downgrade(self.inner.host.sandbox.supports_proxy());
        config.asset_filter()?;

        let framework = config.framework.clone();
        *self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;

        if framework.prefetch.is_enabled()
            && let Some(prefetcher) = &self.inner.host.prefetcher
        {
            let apps = self
                .inner
                .apps
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            debug!(apps = apps.len(), "Prefetching");
            prefetcher.prefetch(&apps, &framework.prefetch, &framework.fetch);
        }

        self.inner.ensure_router_started(framework.url_reroute_only);
        if self.inner.started.resolve() {
            info!(singular = framework.singular, "Framework started");
        }
        Ok(())
    }

    /// Load and mount an app outside router control.
    ///
    /// Instances are reused per app name and container identity (or per app
    /// name with `cache_lifecycle_by_app_name`). A new instance whose
    /// container already holds earlier instances waits for them to unmount
    /// before it mounts. Loading and mounting continue on a spawned task;
    /// follow them through the returned handle. Must be called within a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::ConfigurationConflict`] for impossible option
    /// combinations. Everything later is reported through the handle.
    pub fn load_micro_app(
        &self,
        app: AppDescriptor,
        config: Option<Configuration>,
        hooks: LifecycleHooks,
    ) -> MosaicResult<MicroAppHandle> {
        let inner = &self.inner;
        let config = config
            .unwrap_or_else(|| inner.configuration().for_ad_hoc_load())
            .auto_downgrade(inner.host.sandbox.supports_proxy());
        config.check_conflicts(&app)?;

        if config.framework.auto_start {
            inner.ensure_router_started(config.framework.url_reroute_only);
        }

        let document = &inner.host.document;
        let container_path = app
            .container
            .as_ref()
            .and_then(|target| document.resolve(target))
            .and_then(|node| document.structural_path(node));
        let key = match (&app.container, &container_path) {
            (Some(_), _) if config.framework.cache_lifecycle_by_app_name => {
                Some(InstanceKey::Name(app.name.clone()))
            },
            (Some(_), Some(path)) => Some(InstanceKey::Container {
                name: app.name.clone(),
                path: path.clone(),
            }),
            _ => None,
        };

        let build = || -> SharedFactory {
            let host = inner.host.clone();
            let gate = Arc::clone(&inner.gate);
            let app = app.clone();
            let config = config.clone();
            let hooks = hooks.clone();
            async move { load_app(&host, gate, app, &config, &hooks).await }
                .boxed()
                .shared()
        };
        let (factory, cached) = match &key {
            Some(key) => inner.cache.get_or_insert_with(key, build),
            None => (build(), false),
        };

        let id = inner.next_handle.fetch_add(1, Ordering::SeqCst);
        let handle = MicroAppHandle::new(id, &app.name, app.props.clone());
        debug!(
            app = %app.name,
            handle = id,
            key = ?key,
            cached,
            "Loading app instance"
        );

        if let Some(path) = &container_path {
            inner.cache.track(
                path,
                TrackedInstance {
                    id,
                    status: handle.watch_status(),
                    unmounted: handle.unmounted_signal(),
                },
            );
            let cache = Arc::clone(&inner.cache);
            let path = path.clone();
            handle.on_settled(move || cache.untrack(&path, id));
        }

        let remount = cached.then(|| app.container.clone()).flatten();
        let pipeline = {
            let cache = Arc::clone(&inner.cache);
            async move {
                match factory.clone().await {
                    Ok(factory) => {
                        let mut pipeline = factory.invoke(remount, !cached);
                        if let Some(path) = container_path {
                            pipeline.prepend_mount(container_wait_step(cache, path, id));
                        }
                        Ok(pipeline)
                    },
                    Err(e) => {
                        if let Some(key) = &key {
                            cache.evict_if_same(key, &factory);
                        }
                        Err(e)
                    },
                }
            }
        };

        let guard = handle.claim_ops();
        let driver = handle.clone();
        tokio::spawn(async move { driver.drive_initial_mount(guard, pipeline).await });
        Ok(handle)
    }

    /// Forget an app: evict every cached instance of it and unregister it
    /// from the router, so it can be registered again. Mounted handles are
    /// not touched. Returns how many cache entries were evicted.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::Router`] if the router fails to unregister a
    /// registered app.
    pub fn remove_micro_app(&self, name: &str) -> MosaicResult<usize> {
        let evicted = self.inner.cache.evict_app(name);
        let was_registered = self.forget(name);
        if was_registered {
            self.inner
                .host
                .router
                .unregister_application(name)
                .map_err(|e| MosaicError::Router(render_error(&e)))?;
        }
        info!(app = %name, evicted, was_registered, "App removed");
        Ok(evicted)
    }

    fn forget(&self, name: &str) -> bool {
        let mut apps = self.inner.apps.lock().unwrap_or_else(PoisonError::into_inner);
        let before = apps.len();
        apps.retain(|app| app.name != name);
        apps.len() != before
    }
}

/// The loader the router calls when an app first activates.
fn app_loader(inner: Weak<FrontendInner>, app: AppDescriptor, hooks: LifecycleHooks) -> AppLoader {
    Arc::new(move || {
        let inner = inner.clone();
        let app = app.clone();
        let hooks = hooks.clone();
        async move {
            let inner = inner.upgrade().ok_or_else(|| {
                MosaicError::Router(format!("orchestrator for app '{}' is gone", app.name))
            })?;
            app.set_loading(true);
            inner.started.wait().await;

            let config = inner.configuration();
            let factory =
                load_app(&inner.host, Arc::clone(&inner.gate), app, &config, &hooks).await?;
            Ok(factory.invoke(None, true))
        }
        .boxed()
    })
}

/// Waits for every earlier, unbroken instance in the same container to
/// unmount.
fn container_wait_step(cache: Arc<InstanceCache>, path: String, id: u64) -> Step {
    Arc::new(move |_: Props| {
        let waits = cache.prior_unmounts(&path, id);
        let path = path.clone();
        async move {
            if !waits.is_empty() {
                debug!(container = %path, pending = waits.len(), "Waiting for earlier instances");
            }
            for unmounted in waits {
                unmounted.wait().await;
            }
            Ok::<_, MosaicError>(())
        }
        .boxed()
    })
}
