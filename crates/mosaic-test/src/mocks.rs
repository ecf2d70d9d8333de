//! Mock implementations of the host collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use mosaic_config::{FetchOptions, PrefetchStrategy};
use mosaic_runtime::host::{
    CssScoper, EntryFetcher, GlobalScope, GlobalStateActions, GlobalStateListener,
    GlobalStateProvider, GlobalValue, NodeId, ParsedEntry, Prefetcher, Sandbox, SandboxKind,
    SandboxProvider, SandboxRequest, ScriptRunner,
};
use mosaic_runtime::{AppDescriptor, AppInstanceId, Entry, ExportedModule};

use crate::fixtures::{EventLog, recording_module};

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Global object
// ---------------------------------------------------------------------------

/// The real, shared global object.
#[derive(Debug, Default)]
pub struct MemoryGlobal {
    values: Mutex<HashMap<String, GlobalValue>>,
}

impl MemoryGlobal {
    /// An empty global.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The data value under `key`, if it holds data.
    #[must_use]
    pub fn data(&self, key: &str) -> Option<serde_json::Value> {
        self.get(key).and_then(|v| v.as_data().cloned())
    }

    /// Whether anything is stored under `key`.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        locked(&self.values).contains_key(key)
    }
}

impl GlobalScope for MemoryGlobal {
    fn get(&self, key: &str) -> Option<GlobalValue> {
        locked(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: GlobalValue) {
        locked(&self.values).insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) -> Option<GlobalValue> {
        locked(&self.values).remove(key)
    }
}

// ---------------------------------------------------------------------------
// Sandboxes
// ---------------------------------------------------------------------------

/// Scope handed to app scripts by a [`MockSandbox`].
///
/// The proxy kind keeps writes in a private overlay and reads through to the
/// real global. The legacy and snapshot kinds write through and remember
/// what they overwrote so unmount can restore it.
struct SandboxScope {
    kind: SandboxKind,
    real: Arc<dyn GlobalScope>,
    /// Proxy kind: private writes (`None` marks a deletion).
    overlay: Mutex<HashMap<String, Option<GlobalValue>>>,
    /// Write-through kinds: values seen before the first write.
    originals: Mutex<HashMap<String, Option<GlobalValue>>>,
    /// Write-through kinds: the app's own writes, reapplied on mount.
    modified: Mutex<HashMap<String, Option<GlobalValue>>>,
    latest_set_prop: Mutex<Option<String>>,
}

impl SandboxScope {
    fn remember_original(&self, key: &str) {
        locked(&self.originals)
            .entry(key.to_owned())
            .or_insert_with(|| self.real.get(key));
    }

    fn write_through(&self, key: &str, value: Option<GlobalValue>) {
        match &value {
            Some(v) => self.real.set(key, v.clone()),
            None => {
                self.real.remove(key);
            },
        }
        locked(&self.modified).insert(key.to_owned(), value);
    }

    fn apply(&self, values: &HashMap<String, Option<GlobalValue>>) {
        for (key, value) in values {
            match value {
                Some(v) => self.real.set(key, v.clone()),
                None => {
                    self.real.remove(key);
                },
            }
        }
    }
}

impl GlobalScope for SandboxScope {
    fn get(&self, key: &str) -> Option<GlobalValue> {
        if self.kind == SandboxKind::Proxy
            && let Some(value) = locked(&self.overlay).get(key)
        {
            return value.clone();
        }
        self.real.get(key)
    }

    fn set(&self, key: &str, value: GlobalValue) {
        *locked(&self.latest_set_prop) = Some(key.to_owned());
        if self.kind == SandboxKind::Proxy {
            locked(&self.overlay).insert(key.to_owned(), Some(value));
        } else {
            self.remember_original(key);
            self.write_through(key, Some(value));
        }
    }

    fn remove(&self, key: &str) -> Option<GlobalValue> {
        let previous = self.get(key);
        if self.kind == SandboxKind::Proxy {
            locked(&self.overlay).insert(key.to_owned(), None);
        } else {
            self.remember_original(key);
            self.write_through(key, None);
        }
        previous
    }
}

/// A sandbox created by [`MockSandboxProvider`].
pub struct MockSandbox {
    request: SandboxRequest,
    scope: Arc<SandboxScope>,
    mounts: AtomicUsize,
    unmounts: AtomicUsize,
}

impl std::fmt::Debug for MockSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSandbox")
            .field("request", &self.request)
            .field("mounts", &self.mount_count())
            .field("unmounts", &self.unmount_count())
            .finish()
    }
}

impl MockSandbox {
    /// The request this sandbox was created from.
    #[must_use]
    pub fn request(&self) -> &SandboxRequest {
        &self.request
    }

    /// Sandbox kind.
    #[must_use]
    pub fn kind(&self) -> SandboxKind {
        self.request.kind
    }

    /// What the element getter returns right now.
    #[must_use]
    pub fn element(&self) -> Option<NodeId> {
        (self.request.element_getter)()
    }

    /// Number of `mount` calls.
    #[must_use]
    pub fn mount_count(&self) -> usize {
        self.mounts.load(Ordering::SeqCst)
    }

    /// Number of `unmount` calls.
    #[must_use]
    pub fn unmount_count(&self) -> usize {
        self.unmounts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    fn proxy(&self) -> Arc<dyn GlobalScope> {
        Arc::clone(&self.scope) as Arc<dyn GlobalScope>
    }

    fn latest_set_prop(&self) -> Option<String> {
        locked(&self.scope.latest_set_prop).clone()
    }

    async fn mount(&self) -> anyhow::Result<()> {
        self.mounts.fetch_add(1, Ordering::SeqCst);
        if self.scope.kind != SandboxKind::Proxy {
            let modified = locked(&self.scope.modified).clone();
            self.scope.apply(&modified);
        }
        Ok(())
    }

    async fn unmount(&self) -> anyhow::Result<()> {
        self.unmounts.fetch_add(1, Ordering::SeqCst);
        if self.scope.kind != SandboxKind::Proxy {
            let originals = locked(&self.scope.originals).clone();
            self.scope.apply(&originals);
        }
        Ok(())
    }
}

/// Creates [`MockSandbox`]es and records every request.
#[derive(Debug)]
pub struct MockSandboxProvider {
    supports_proxy: bool,
    fail_create: AtomicBool,
    sandboxes: Mutex<Vec<Arc<MockSandbox>>>,
}

impl MockSandboxProvider {
    /// A provider that does or does not support proxy isolation.
    #[must_use]
    pub fn new(supports_proxy: bool) -> Self {
        Self {
            supports_proxy,
            fail_create: AtomicBool::new(false),
            sandboxes: Mutex::new(Vec::new()),
        }
    }

    /// Make every following `create` fail.
    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// Every sandbox created so far.
    #[must_use]
    pub fn sandboxes(&self) -> Vec<Arc<MockSandbox>> {
        locked(&self.sandboxes).clone()
    }

    /// The most recent sandbox created for `app_name`.
    #[must_use]
    pub fn last_for(&self, app_name: &str) -> Option<Arc<MockSandbox>> {
        locked(&self.sandboxes)
            .iter()
            .rev()
            .find(|s| s.request.app_name == app_name)
            .cloned()
    }
}

impl SandboxProvider for MockSandboxProvider {
    fn supports_proxy(&self) -> bool {
        self.supports_proxy
    }

    fn create(
        &self,
        request: SandboxRequest,
        global: Arc<dyn GlobalScope>,
    ) -> anyhow::Result<Arc<dyn Sandbox>> {
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("sandbox creation disabled for '{}'", request.app_name);
        }
        let sandbox = Arc::new(MockSandbox {
            scope: Arc::new(SandboxScope {
                kind: request.kind,
                real: global,
                overlay: Mutex::new(HashMap::new()),
                originals: Mutex::new(HashMap::new()),
                modified: Mutex::new(HashMap::new()),
                latest_set_prop: Mutex::new(None),
            }),
            request,
            mounts: AtomicUsize::new(0),
            unmounts: AtomicUsize::new(0),
        });
        locked(&self.sandboxes).push(Arc::clone(&sandbox));
        Ok(sandbox)
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Script body of a [`MockEntry`]: receives the execution global and the
/// strict-global flag.
pub type ScriptFn =
    Arc<dyn Fn(Arc<dyn GlobalScope>, bool) -> anyhow::Result<Option<ExportedModule>> + Send + Sync>;

fn no_exports(
    _global: Arc<dyn GlobalScope>,
    _strict_global: bool,
) -> anyhow::Result<Option<ExportedModule>> {
    Ok(None)
}

/// A scripted HTML entry.
#[derive(Clone)]
pub struct MockEntry {
    template: String,
    public_path: Option<String>,
    script: ScriptFn,
}

impl std::fmt::Debug for MockEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEntry")
            .field("template", &self.template)
            .field("public_path", &self.public_path)
            .finish_non_exhaustive()
    }
}

impl MockEntry {
    /// An entry with `template` whose scripts export nothing.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            public_path: None,
            script: Arc::new(no_exports),
        }
    }

    /// An entry exporting [`recording_module`] for `name`.
    #[must_use]
    pub fn recording(name: &str, log: &EventLog) -> Self {
        Self::new(format!("<p>{name}</p>")).exporting(recording_module(name, log))
    }

    /// Override the asset public path.
    #[must_use]
    pub fn with_public_path(mut self, path: impl Into<String>) -> Self {
        self.public_path = Some(path.into());
        self
    }

    /// Replace the script body.
    #[must_use]
    pub fn with_script(
        mut self,
        script: impl Fn(Arc<dyn GlobalScope>, bool) -> anyhow::Result<Option<ExportedModule>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.script = Arc::new(script);
        self
    }

    /// Scripts that export `module` directly.
    #[must_use]
    pub fn exporting(self, module: ExportedModule) -> Self {
        self.with_script(move |_, _| Ok(Some(module.clone())))
    }
}

struct MockScripts {
    url: String,
    script: ScriptFn,
    stats: Arc<FetchStats>,
}

#[async_trait]
impl ScriptRunner for MockScripts {
    async fn exec_scripts(
        &self,
        global: Arc<dyn GlobalScope>,
        strict_global: bool,
    ) -> anyhow::Result<Option<ExportedModule>> {
        {
            let mut execs = locked(&self.stats.execs);
            let count = execs.entry(self.url.clone()).or_default();
            *count = count.saturating_add(1);
        }
        locked(&self.stats.strict).insert(self.url.clone(), strict_global);
        (self.script)(global, strict_global)
    }
}

#[derive(Debug, Default)]
struct FetchStats {
    fetches: Mutex<HashMap<String, usize>>,
    execs: Mutex<HashMap<String, usize>>,
    strict: Mutex<HashMap<String, bool>>,
    last_options: Mutex<Option<FetchOptions>>,
}

/// Serves registered [`MockEntry`]s by URL and counts fetches and script
/// executions.
#[derive(Debug, Default)]
pub struct MockEntryFetcher {
    entries: Mutex<HashMap<String, MockEntry>>,
    failures: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    stats: Arc<FetchStats>,
}

impl MockEntryFetcher {
    /// An empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `entry` for `url`.
    pub fn register(&self, url: impl Into<String>, entry: MockEntry) {
        locked(&self.entries).insert(url.into(), entry);
    }

    /// Make fetching `url` fail.
    pub fn fail(&self, url: impl Into<String>) {
        locked(&self.failures).insert(url.into());
    }

    /// Let fetching `url` succeed again.
    pub fn clear_failure(&self, url: &str) {
        locked(&self.failures).remove(url);
    }

    /// Delay every fetch.
    pub fn set_delay(&self, delay: Duration) {
        *locked(&self.delay) = Some(delay);
    }

    /// Fetches of `url` so far, including failed ones.
    #[must_use]
    pub fn fetch_count(&self, url: &str) -> usize {
        locked(&self.stats.fetches).get(url).copied().unwrap_or(0)
    }

    /// Script executions of `url` so far.
    #[must_use]
    pub fn exec_count(&self, url: &str) -> usize {
        locked(&self.stats.execs).get(url).copied().unwrap_or(0)
    }

    /// The strict-global flag of the last execution of `url`.
    #[must_use]
    pub fn last_strict(&self, url: &str) -> Option<bool> {
        locked(&self.stats.strict).get(url).copied()
    }

    /// The options passed to the last fetch.
    #[must_use]
    pub fn last_options(&self) -> Option<FetchOptions> {
        locked(&self.stats.last_options).clone()
    }
}

#[async_trait]
impl EntryFetcher for MockEntryFetcher {
    async fn fetch_and_parse(
        &self,
        entry: &Entry,
        options: &FetchOptions,
    ) -> anyhow::Result<ParsedEntry> {
        let url = entry.to_string();
        let delay = *locked(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut fetches = locked(&self.stats.fetches);
            let count = fetches.entry(url.clone()).or_default();
            *count = count.saturating_add(1);
        }
        *locked(&self.stats.last_options) = Some(options.clone());

        if locked(&self.failures).contains(&url) {
            bail!("network error fetching {url}");
        }
        let entry = locked(&self.entries)
            .get(&url)
            .cloned()
            .ok_or_else(|| anyhow!("no entry registered for {url}"))?;

        let asset_public_path = options
            .public_path
            .clone()
            .or_else(|| entry.public_path.clone())
            .unwrap_or_else(|| format!("{url}/"));
        Ok(ParsedEntry {
            template: entry.template.clone(),
            asset_public_path,
            scripts: Arc::new(MockScripts {
                url,
                script: Arc::clone(&entry.script),
                stats: Arc::clone(&self.stats),
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Global state, CSS, prefetch
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StateShared {
    state: Mutex<serde_json::Value>,
    listeners: Mutex<Vec<(String, GlobalStateListener)>>,
    off_calls: AtomicUsize,
    instances: Mutex<Vec<String>>,
}

struct MockStateActions {
    instance: String,
    shared: Arc<StateShared>,
}

impl GlobalStateActions for MockStateActions {
    fn on_global_state_change(&self, listener: GlobalStateListener, fire_immediately: bool) {
        if fire_immediately {
            let state = locked(&self.shared.state).clone();
            listener(&state, &state);
        }
        locked(&self.shared.listeners).push((self.instance.clone(), listener));
    }

    fn set_global_state(&self, state: serde_json::Value) -> bool {
        let previous = std::mem::replace(&mut *locked(&self.shared.state), state.clone());
        let listeners: Vec<GlobalStateListener> = locked(&self.shared.listeners)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&state, &previous);
        }
        true
    }

    fn off_global_state_change(&self) -> bool {
        self.shared.off_calls.fetch_add(1, Ordering::SeqCst);
        locked(&self.shared.listeners).retain(|(owner, _)| *owner != self.instance);
        true
    }
}

/// Cross-app state store shared by every instance.
#[derive(Default)]
pub struct MockGlobalState {
    shared: Arc<StateShared>,
}

impl std::fmt::Debug for MockGlobalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockGlobalState")
            .field("instances", &self.instances())
            .field("off_calls", &self.off_calls())
            .finish_non_exhaustive()
    }
}

impl MockGlobalState {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> serde_json::Value {
        locked(&self.shared.state).clone()
    }

    /// Instance ids that asked for actions, in order.
    #[must_use]
    pub fn instances(&self) -> Vec<String> {
        locked(&self.shared.instances).clone()
    }

    /// Number of `off_global_state_change` calls.
    #[must_use]
    pub fn off_calls(&self) -> usize {
        self.shared.off_calls.load(Ordering::SeqCst)
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        locked(&self.shared.listeners).len()
    }
}

impl GlobalStateProvider for MockGlobalState {
    fn actions(&self, instance: &AppInstanceId) -> Arc<dyn GlobalStateActions> {
        locked(&self.shared.instances).push(instance.as_str().to_owned());
        Arc::new(MockStateActions {
            instance: instance.as_str().to_owned(),
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Records every stylesheet handed to it and rewrites nothing.
#[derive(Debug, Default)]
pub struct RecordingCssScoper {
    processed: Mutex<Vec<(NodeId, NodeId, String)>>,
}

impl RecordingCssScoper {
    /// An empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `(wrapper, style, app_name)` for every processed stylesheet.
    #[must_use]
    pub fn processed(&self) -> Vec<(NodeId, NodeId, String)> {
        locked(&self.processed).clone()
    }
}

impl CssScoper for RecordingCssScoper {
    fn process(&self, wrapper: NodeId, style: NodeId, app_name: &str) {
        locked(&self.processed).push((wrapper, style, app_name.to_owned()));
    }
}

/// One recorded prefetch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchCall {
    /// Names of the apps passed in.
    pub apps: Vec<String>,
    /// Strategy.
    pub strategy: PrefetchStrategy,
}

/// Records prefetch calls.
#[derive(Debug, Default)]
pub struct RecordingPrefetcher {
    calls: Mutex<Vec<PrefetchCall>>,
}

impl RecordingPrefetcher {
    /// An empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<PrefetchCall> {
        locked(&self.calls).clone()
    }
}

impl Prefetcher for RecordingPrefetcher {
    fn prefetch(&self, apps: &[AppDescriptor], strategy: &PrefetchStrategy, _options: &FetchOptions) {
        locked(&self.calls).push(PrefetchCall {
            apps: apps.iter().map(|a| a.name.clone()).collect(),
            strategy: strategy.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: SandboxKind) -> SandboxRequest {
        SandboxRequest {
            app_name: "a".to_owned(),
            kind,
            element_getter: Arc::new(|| None::<NodeId>),
            scoped_css: false,
            exclude_asset_filter: None,
        }
    }

    #[tokio::test]
    async fn test_proxy_sandbox_keeps_writes_private() {
        let global = Arc::new(MemoryGlobal::new());
        global.set("shared", GlobalValue::Data(serde_json::json!(1)));
        let provider = MockSandboxProvider::new(true);
        let sandbox = provider
            .create(request(SandboxKind::Proxy), Arc::clone(&global) as Arc<dyn GlobalScope>)
            .unwrap();
        let scope = sandbox.proxy();

        scope.set("leak", GlobalValue::Data(serde_json::json!(true)));
        assert!(!global.has("leak"));
        assert!(scope.get("shared").is_some());
        assert_eq!(sandbox.latest_set_prop().as_deref(), Some("leak"));
    }

    #[tokio::test]
    async fn test_snapshot_sandbox_restores_on_unmount() {
        let global = Arc::new(MemoryGlobal::new());
        global.set("k", GlobalValue::Data(serde_json::json!("before")));
        let provider = MockSandboxProvider::new(false);
        let sandbox = provider
            .create(request(SandboxKind::Snapshot), Arc::clone(&global) as Arc<dyn GlobalScope>)
            .unwrap();
        let scope = sandbox.proxy();

        scope.set("k", GlobalValue::Data(serde_json::json!("app")));
        scope.set("new", GlobalValue::Data(serde_json::json!(1)));
        assert_eq!(global.data("k"), Some(serde_json::json!("app")));

        sandbox.unmount().await.unwrap();
        assert_eq!(global.data("k"), Some(serde_json::json!("before")));
        assert!(!global.has("new"));

        sandbox.mount().await.unwrap();
        assert_eq!(global.data("k"), Some(serde_json::json!("app")));
        assert!(global.has("new"));
    }

    #[tokio::test]
    async fn test_fetcher_counts_and_fails() {
        let fetcher = MockEntryFetcher::new();
        fetcher.register("//a.test", MockEntry::new("<p>a</p>").with_public_path("/cdn/a/"));
        fetcher.fail("//b.test");

        let parsed = fetcher
            .fetch_and_parse(&Entry::url("//a.test"), &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(parsed.asset_public_path, "/cdn/a/");
        let global: Arc<dyn GlobalScope> = Arc::new(MemoryGlobal::new());
        assert!(parsed.scripts.exec_scripts(global, true).await.unwrap().is_none());

        assert!(
            fetcher
                .fetch_and_parse(&Entry::url("//b.test"), &FetchOptions::default())
                .await
                .is_err()
        );
        assert_eq!(fetcher.fetch_count("//a.test"), 1);
        assert_eq!(fetcher.fetch_count("//b.test"), 1);
        assert_eq!(fetcher.exec_count("//a.test"), 1);
        assert_eq!(fetcher.last_strict("//a.test"), Some(true));
    }

    #[test]
    fn test_global_state_listeners() {
        let state = MockGlobalState::new();
        let a = state.actions(&AppInstanceId::generate("a"));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        a.on_global_state_change(
            Arc::new(move |_: &serde_json::Value, _: &serde_json::Value| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            true,
        );
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(a.set_global_state(serde_json::json!({"user": "x"})));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(a.off_global_state_change());
        assert_eq!(state.listener_count(), 0);
        assert_eq!(state.off_calls(), 1);
    }
}
