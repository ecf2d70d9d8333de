//! A miniature route-driven lifecycle driver.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::bail;
use futures::future::join_all;
use mosaic_runtime::host::{ApplicationRegistration, Router, RouterStartOptions};
use mosaic_runtime::{AppStatus, LifecyclePipeline, MosaicError};
use tracing::debug;

struct RoutedApp {
    registration: ApplicationRegistration,
    pipeline: Option<LifecyclePipeline>,
    status: AppStatus,
    error: Option<MosaicError>,
}

/// Drives registered apps through load, bootstrap, mount and unmount as
/// [`navigate`](MockRouter::navigate) changes the location.
///
/// Navigation is explicit: `start()` only records that it was called.
/// On each navigation, apps that stop matching are unmounted while newly
/// matching apps load and bootstrap; mounts run once every unmount has
/// finished.
#[derive(Default)]
pub struct MockRouter {
    apps: Mutex<Vec<RoutedApp>>,
    rejected: Mutex<HashSet<String>>,
    starts: AtomicUsize,
    start_options: Mutex<Option<RouterStartOptions>>,
    location: Mutex<String>,
    navigation: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for MockRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRouter")
            .field("registered", &self.registered())
            .field("starts", &self.start_count())
            .field("location", &self.location())
            .finish_non_exhaustive()
    }
}

impl MockRouter {
    /// A router with nothing registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn apps(&self) -> std::sync::MutexGuard<'_, Vec<RoutedApp>> {
        self.apps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_app<T>(&self, name: &str, f: impl FnOnce(&mut RoutedApp) -> T) -> Option<T> {
        self.apps().iter_mut().find(|a| a.registration.name == name).map(f)
    }

    /// Refuse registrations of `name`.
    pub fn reject(&self, name: impl Into<String>) {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into());
    }

    /// Registered app names, in order.
    #[must_use]
    pub fn registered(&self) -> Vec<String> {
        self.apps()
            .iter()
            .map(|a| a.registration.name.clone())
            .collect()
    }

    /// Lifecycle status of `name`.
    #[must_use]
    pub fn status(&self, name: &str) -> Option<AppStatus> {
        self.with_app(name, |a| a.status)
    }

    /// The error that broke `name`, if any.
    #[must_use]
    pub fn error(&self, name: &str) -> Option<MosaicError> {
        self.with_app(name, |a| a.error.clone()).flatten()
    }

    /// How many times `start()` was called.
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Options of the last `start()` call.
    #[must_use]
    pub fn start_options(&self) -> Option<RouterStartOptions> {
        *self
            .start_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current location.
    #[must_use]
    pub fn location(&self) -> String {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Move to `path` and settle every app's lifecycle for it.
    pub async fn navigate(&self, path: &str) {
        let _navigation = self.navigation.lock().await;
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = path.to_owned();

        let (leaving, entering): (Vec<String>, Vec<String>) = {
            let apps = self.apps();
            let leaving = apps
                .iter()
                .filter(|a| {
                    a.status == AppStatus::Mounted && !a.registration.activation.matches(path)
                })
                .map(|a| a.registration.name.clone())
                .collect();
            let entering = apps
                .iter()
                .filter(|a| {
                    matches!(a.status, AppStatus::NotLoaded | AppStatus::Unmounted)
                        && a.registration.activation.matches(path)
                })
                .map(|a| a.registration.name.clone())
                .collect();
            (leaving, entering)
        };
        debug!(path, ?leaving, ?entering, "Rerouting");

        let unmounts = join_all(leaving.iter().map(|name| self.unmount_app(name)));
        let loads = join_all(entering.iter().map(|name| self.load_app(name)));
        let (_, loaded) = futures::join!(unmounts, loads);

        for (name, ready) in entering.iter().zip(loaded) {
            if ready {
                self.mount_app(name).await;
            }
        }
    }

    fn fail(&self, name: &str, status: AppStatus, e: MosaicError) {
        self.with_app(name, |a| {
            a.status = status;
            a.error = Some(e);
        });
    }

    /// Load (first time) and bootstrap. Returns whether the app can mount.
    async fn load_app(&self, name: &str) -> bool {
        let Some((status, loader, props)) = self.with_app(name, |a| {
            (
                a.status,
                a.registration.loader.clone(),
                a.registration.custom_props.clone(),
            )
        }) else {
            return false;
        };
        if status == AppStatus::Unmounted {
            return true;
        }

        self.with_app(name, |a| a.status = AppStatus::Loading);
        let pipeline = match loader().await {
            Ok(pipeline) => pipeline,
            Err(e) => {
                self.fail(name, AppStatus::LoadError, e);
                return false;
            },
        };

        self.with_app(name, |a| a.status = AppStatus::Bootstrapping);
        if let Err(e) = pipeline.bootstrap(&props).await {
            self.fail(name, AppStatus::SkipBecauseBroken, e);
            return false;
        }
        self.with_app(name, |a| {
            a.pipeline = Some(pipeline);
            a.status = AppStatus::Unmounted;
        });
        true
    }

    async fn mount_app(&self, name: &str) {
        let Some((Some(pipeline), props)) = self.with_app(name, |a| {
            a.status = AppStatus::Mounting;
            (a.pipeline.clone(), a.registration.custom_props.clone())
        }) else {
            return;
        };
        match pipeline.mount(&props).await {
            Ok(()) => {
                self.with_app(name, |a| a.status = AppStatus::Mounted);
            },
            Err(e) => self.fail(name, AppStatus::SkipBecauseBroken, e),
        }
    }

    async fn unmount_app(&self, name: &str) {
        let Some((Some(pipeline), props)) = self.with_app(name, |a| {
            a.status = AppStatus::Unmounting;
            (a.pipeline.clone(), a.registration.custom_props.clone())
        }) else {
            return;
        };
        match pipeline.unmount(&props).await {
            Ok(()) => {
                self.with_app(name, |a| a.status = AppStatus::Unmounted);
            },
            Err(e) => self.fail(name, AppStatus::SkipBecauseBroken, e),
        }
    }
}

impl Router for MockRouter {
    fn register_application(&self, registration: ApplicationRegistration) -> anyhow::Result<()> {
        if self
            .rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&registration.name)
        {
            bail!("registration of '{}' refused", registration.name);
        }
        let mut apps = self.apps();
        if apps.iter().any(|a| a.registration.name == registration.name) {
            bail!("'{}' is already registered", registration.name);
        }
        apps.push(RoutedApp {
            registration,
            pipeline: None,
            status: AppStatus::NotLoaded,
            error: None,
        });
        Ok(())
    }

    fn unregister_application(&self, name: &str) -> anyhow::Result<()> {
        let mut apps = self.apps();
        let before = apps.len();
        apps.retain(|a| a.registration.name != name);
        if apps.len() == before {
            bail!("'{name}' is not registered");
        }
        Ok(())
    }

    fn start(&self, options: RouterStartOptions) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self
            .start_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(options);
    }
}
