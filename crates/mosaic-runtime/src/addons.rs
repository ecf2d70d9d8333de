//! Built-in hooks merged ahead of caller hooks.
//!
//! - The engine flag lets app code detect that it runs under mosaic.
//! - The runtime public path tells the app's bundler runtime where to load
//!   chunks from. The value present when the add-on was created is put back
//!   on unmount.

use std::sync::Arc;

use serde_json::Value;

use crate::hooks::{HookContext, HookStage, LifecycleHooks};
use crate::host::{GlobalScope, GlobalValue};

/// Set on the app's global while it is loaded or mounted.
pub const ENGINE_FLAG: &str = "__POWERED_BY_MOSAIC__";

/// The app's asset public path, set on its global.
pub const PUBLIC_PATH_KEY: &str = "__INJECTED_PUBLIC_PATH_BY_MOSAIC__";

/// Add-on hooks for one app executing against `global`.
#[must_use]
pub fn addon_hooks(global: &Arc<dyn GlobalScope>, public_path: &str) -> LifecycleHooks {
    engine_flag(global).merge(&runtime_public_path(global, public_path))
}

fn engine_flag(global: &Arc<dyn GlobalScope>) -> LifecycleHooks {
    let set = {
        let global = Arc::clone(global);
        move |_: HookContext| {
            global.set(ENGINE_FLAG, GlobalValue::Data(Value::Bool(true)));
            async { Ok::<_, anyhow::Error>(()) }
        }
    };
    let unset = {
        let global = Arc::clone(global);
        move |_: HookContext| {
            global.remove(ENGINE_FLAG);
            async { Ok::<_, anyhow::Error>(()) }
        }
    };
    LifecycleHooks::new()
        .on(HookStage::BeforeLoad, set.clone())
        .on(HookStage::BeforeMount, set)
        .on(HookStage::BeforeUnmount, unset)
}

fn runtime_public_path(global: &Arc<dyn GlobalScope>, public_path: &str) -> LifecycleHooks {
    let raw = global.get(PUBLIC_PATH_KEY);
    let inject = {
        let global = Arc::clone(global);
        let path = public_path.to_owned();
        move |_: HookContext| {
            global.set(PUBLIC_PATH_KEY, GlobalValue::Data(Value::String(path.clone())));
            async { Ok::<_, anyhow::Error>(()) }
        }
    };
    let restore = {
        let global = Arc::clone(global);
        move |_: HookContext| {
            match raw.clone() {
                Some(value) => global.set(PUBLIC_PATH_KEY, value),
                None => {
                    global.remove(PUBLIC_PATH_KEY);
                },
            }
            async { Ok::<_, anyhow::Error>(()) }
        }
    };
    LifecycleHooks::new()
        .on(HookStage::BeforeLoad, inject.clone())
        .on(HookStage::BeforeMount, inject)
        .on(HookStage::BeforeUnmount, restore)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppDescriptor, Entry};
    use crate::hooks::run_chain;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapGlobal(Mutex<HashMap<String, GlobalValue>>);

    impl GlobalScope for MapGlobal {
        fn get(&self, key: &str) -> Option<GlobalValue> {
            self.0.lock().unwrap().get(key).cloned()
        }
        fn set(&self, key: &str, value: GlobalValue) {
            self.0.lock().unwrap().insert(key.to_owned(), value);
        }
        fn remove(&self, key: &str) -> Option<GlobalValue> {
            self.0.lock().unwrap().remove(key)
        }
    }

    fn data(global: &Arc<dyn GlobalScope>, key: &str) -> Option<Value> {
        global.get(key).and_then(|v| v.as_data().cloned())
    }

    #[tokio::test]
    async fn test_addons_set_and_restore() {
        let global: Arc<dyn GlobalScope> = Arc::new(MapGlobal::default());
        global.set(PUBLIC_PATH_KEY, GlobalValue::Data(Value::String("/host/".to_owned())));
        let hooks = addon_hooks(&global, "//cdn/app/");
        let ctx = HookContext {
            app: Arc::new(AppDescriptor::new("app", Entry::url("//cdn/app"))),
            global: Arc::clone(&global),
        };

        run_chain(&hooks, HookStage::BeforeLoad, &ctx).await.unwrap();
        assert_eq!(data(&global, ENGINE_FLAG), Some(Value::Bool(true)));
        assert_eq!(data(&global, PUBLIC_PATH_KEY), Some(Value::String("//cdn/app/".to_owned())));

        run_chain(&hooks, HookStage::BeforeUnmount, &ctx).await.unwrap();
        assert_eq!(data(&global, ENGINE_FLAG), None);
        assert_eq!(data(&global, PUBLIC_PATH_KEY), Some(Value::String("/host/".to_owned())));
    }

    #[tokio::test]
    async fn test_public_path_removed_when_absent_before() {
        let global: Arc<dyn GlobalScope> = Arc::new(MapGlobal::default());
        let hooks = addon_hooks(&global, "/app/");
        let ctx = HookContext {
            app: Arc::new(AppDescriptor::new("app", Entry::url("/app"))),
            global: Arc::clone(&global),
        };
        run_chain(&hooks, HookStage::BeforeMount, &ctx).await.unwrap();
        run_chain(&hooks, HookStage::BeforeUnmount, &ctx).await.unwrap();
        assert!(global.get(PUBLIC_PATH_KEY).is_none());
        assert_eq!(hooks.get(HookStage::AfterMount).len(), 0);
    }
}
