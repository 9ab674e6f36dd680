//! In-process hook system.
//!
//! Hooks are named extension points. Handlers run in ascending priority
//! order, each receiving the data returned by the previous one.
//!
//! Re-entry is tracked per call chain: a handler that executes the hook it
//! is running under gets its input back unchanged, while independent
//! executions of the same hook on other tasks run normally.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Failures raised by hook handlers.
#[derive(Debug, Error)]
pub enum HookError {
    /// Logged, then the remaining handlers run.
    #[error("hook handler failed: {0}")]
    Failed(String),

    /// Stops execution and propagates to the caller.
    #[error("critical hook failure: {0}")]
    Critical(String),
}

impl HookError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::Critical(message.into())
    }
}

/// Per-execution state shared by the handlers of one hook run.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    /// Free-form values handlers can pass to each other.
    pub metadata: serde_json::Map<String, Value>,
    cancelled: bool,
}

impl HookContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the handlers after the current one.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// A hook handler.
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(&self, data: Value, ctx: &mut HookContext) -> Result<Value, HookError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> HookHandler for FnHandler<F>
where
    F: Fn(Value, &mut HookContext) -> Result<Value, HookError> + Send + Sync,
{
    async fn handle(&self, data: Value, ctx: &mut HookContext) -> Result<Value, HookError> {
        (self.0)(data, ctx)
    }
}

/// Wrap a synchronous closure as a handler.
pub fn hook_fn<F>(f: F) -> Arc<dyn HookHandler>
where
    F: Fn(Value, &mut HookContext) -> Result<Value, HookError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Identifies a registration for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct HookId(u64);

#[derive(Clone)]
struct RegisteredHook {
    id: HookId,
    priority: i32,
    plugin: Option<String>,
    handler: Arc<dyn HookHandler>,
}

/// Public view of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookInfo {
    pub id: HookId,
    pub priority: i32,
    pub plugin: Option<String>,
}

#[derive(Default)]
struct HookInner {
    hooks: DashMap<String, Vec<RegisteredHook>>,
    next_id: AtomicU64,
}

/// Hook names running in the current call chain.
type CallChain = Arc<Mutex<HashSet<String>>>;

tokio::task_local! {
    static CALL_CHAIN: CallChain;
}

/// Registry and executor of named hooks.
#[derive(Clone, Default)]
pub struct HookSystem {
    inner: Arc<HookInner>,
}

impl std::fmt::Debug for HookSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSystem")
            .field("hooks", &self.inner.hooks.len())
            .finish()
    }
}

/// Removes a hook from its call chain when the run ends.
struct ExecutionGuard {
    chain: CallChain,
    name: String,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.chain.lock().remove(&self.name);
    }
}

impl HookSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Lower priorities run first; equal priorities run
    /// in registration order.
    pub fn register(&self, name: &str, handler: Arc<dyn HookHandler>, priority: i32) -> HookId {
        self.register_inner(name, handler, priority, None)
    }

    fn register_inner(
        &self,
        name: &str,
        handler: Arc<dyn HookHandler>,
        priority: i32,
        plugin: Option<&str>,
    ) -> HookId {
        let id = HookId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.inner.hooks.entry(name.to_string()).or_default();

        let position = handlers
            .iter()
            .position(|h| h.priority > priority)
            .unwrap_or(handlers.len());
        handlers.insert(
            position,
            RegisteredHook {
                id,
                priority,
                plugin: plugin.map(str::to_string),
                handler,
            },
        );

        debug!(hook = %name, priority, plugin = ?plugin, "hook registered");
        id
    }

    /// Run every handler of a hook, threading the data through them.
    ///
    /// A hook that is already running in the same call chain returns the
    /// data unchanged.
    pub async fn execute(
        &self,
        name: &str,
        data: Value,
        ctx: &mut HookContext,
    ) -> Result<Value, HookError> {
        let handlers: Vec<RegisteredHook> = match self.inner.hooks.get(name) {
            Some(entry) if !entry.is_empty() => entry.value().clone(),
            _ => return Ok(data),
        };

        match CALL_CHAIN.try_with(Arc::clone) {
            Ok(chain) => run_in_chain(chain, name, handlers, data, ctx).await,
            Err(_) => {
                // Outermost execution on this task starts a new chain.
                let chain = CallChain::default();
                CALL_CHAIN
                    .scope(chain.clone(), run_in_chain(chain, name, handlers, data, ctx))
                    .await
            }
        }
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn unregister(&self, name: &str, id: HookId) -> bool {
        let removed = match self.inner.hooks.get_mut(name) {
            Some(mut handlers) => {
                let before = handlers.len();
                handlers.retain(|h| h.id != id);
                before != handlers.len()
            }
            None => false,
        };

        self.inner.hooks.remove_if(name, |_, handlers| handlers.is_empty());
        removed
    }

    /// Registrations of one hook in execution order.
    pub fn hooks(&self, name: &str) -> Vec<HookInfo> {
        self.inner
            .hooks
            .get(name)
            .map(|handlers| {
                handlers
                    .iter()
                    .map(|h| HookInfo {
                        id: h.id,
                        priority: h.priority,
                        plugin: h.plugin.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of hooks with at least one handler, sorted.
    pub fn hook_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.hooks.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Handler count per hook.
    pub fn stats(&self) -> BTreeMap<String, usize> {
        self.inner
            .hooks
            .iter()
            .map(|e| (e.key().clone(), e.value().len()))
            .collect()
    }

    /// Remove every handler. Executions already under way finish with the
    /// handlers they started with.
    pub fn clear(&self) {
        self.inner.hooks.clear();
    }

    /// A registration scope for one plugin.
    pub fn scope(&self, plugin: &str) -> ScopedHooks {
        ScopedHooks {
            system: self.clone(),
            plugin: plugin.to_string(),
            registered: Mutex::new(Vec::new()),
        }
    }
}

async fn run_in_chain(
    chain: CallChain,
    name: &str,
    handlers: Vec<RegisteredHook>,
    data: Value,
    ctx: &mut HookContext,
) -> Result<Value, HookError> {
    if !chain.lock().insert(name.to_string()) {
        warn!(hook = %name, "hook is already executing; skipping recursive call");
        return Ok(data);
    }
    let _guard = ExecutionGuard {
        chain,
        name: name.to_string(),
    };

    run_handlers(name, handlers, data, ctx).await
}

async fn run_handlers(
    name: &str,
    handlers: Vec<RegisteredHook>,
    data: Value,
    ctx: &mut HookContext,
) -> Result<Value, HookError> {
    let mut current = data;
    for registered in handlers {
        if ctx.is_cancelled() {
            debug!(hook = %name, "hook execution cancelled");
            break;
        }

        match registered.handler.handle(current.clone(), ctx).await {
            Ok(next) => current = next,
            Err(HookError::Critical(message)) => {
                error!(hook = %name, plugin = ?registered.plugin, error = %message, "critical hook failure");
                return Err(HookError::Critical(message));
            }
            Err(e) => {
                error!(hook = %name, plugin = ?registered.plugin, error = %e, "hook handler failed");
            }
        }
    }

    Ok(current)
}

/// Registers hooks on behalf of a plugin and can remove them all at once.
pub struct ScopedHooks {
    system: HookSystem,
    plugin: String,
    registered: Mutex<Vec<(String, HookId)>>,
}

impl std::fmt::Debug for ScopedHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedHooks")
            .field("plugin", &self.plugin)
            .field("registered", &self.registered.lock().len())
            .finish()
    }
}

impl ScopedHooks {
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn register(&self, name: &str, handler: Arc<dyn HookHandler>, priority: i32) -> HookId {
        let id = self
            .system
            .register_inner(name, handler, priority, Some(&self.plugin));
        self.registered.lock().push((name.to_string(), id));
        id
    }

    pub async fn execute(
        &self,
        name: &str,
        data: Value,
        ctx: &mut HookContext,
    ) -> Result<Value, HookError> {
        self.system.execute(name, data, ctx).await
    }

    pub fn unregister(&self, name: &str, id: HookId) -> bool {
        self.registered.lock().retain(|(n, i)| !(n == name && *i == id));
        self.system.unregister(name, id)
    }

    /// Remove every handler this scope registered.
    pub fn unregister_all(&self) {
        let registered: Vec<_> = self.registered.lock().drain(..).collect();
        for (name, id) in registered {
            self.system.unregister(&name, id);
        }
        debug!(plugin = %self.plugin, "plugin hooks unregistered");
    }
}

/// Build a namespaced hook name.
pub fn hook_name(namespace: &str, event: &str) -> String {
    format!("{namespace}:{event}")
}

/// Split a hook name into namespace and event at the first `:`.
pub fn parse_hook_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(':')
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(hook_name("content", "save"), "content:save");
        assert_eq!(parse_hook_name("admin:menu:render"), Some(("admin", "menu:render")));
        assert_eq!(parse_hook_name("plain"), None);
    }

    #[test]
    fn registration_order_follows_priority() {
        let hooks = HookSystem::new();
        let noop = || hook_fn(|data, _| Ok(data));

        let late = hooks.register("x:y", noop(), 20);
        let first = hooks.register("x:y", noop(), 1);
        let tie = hooks.register("x:y", noop(), 20);

        let ids: Vec<_> = hooks.hooks("x:y").iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![first, late, tie]);
    }

    #[test]
    fn unregister_drops_empty_hooks() {
        let hooks = HookSystem::new();
        let id = hooks.register("x:y", hook_fn(|d, _| Ok(d)), 10);

        assert!(hooks.unregister("x:y", id));
        assert!(!hooks.unregister("x:y", id));
        assert!(hooks.hook_names().is_empty());
    }
}
