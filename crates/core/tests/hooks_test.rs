#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for in-process hook execution.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use headwind_core::plugin::{HookContext, HookError, HookHandler, HookSystem, hook_fn};

/// Appends a marker to the `trail` array.
fn append(marker: &'static str) -> Arc<dyn HookHandler> {
    hook_fn(move |mut data: Value, _ctx: &mut HookContext| {
        if let Some(trail) = data["trail"].as_array_mut() {
            trail.push(json!(marker));
        }
        Ok(data)
    })
}

fn trail(data: &Value) -> Vec<&str> {
    data["trail"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn handlers_run_in_priority_order_threading_data() {
    let hooks = HookSystem::new();
    hooks.register("content:save", append("late"), 20);
    hooks.register("content:save", append("early"), 1);
    hooks.register("content:save", append("default"), 10);
    hooks.register("content:save", append("default-2"), 10);

    let mut ctx = HookContext::new();
    let out = hooks
        .execute("content:save", json!({ "trail": [] }), &mut ctx)
        .await
        .unwrap();

    assert_eq!(trail(&out), vec!["early", "default", "default-2", "late"]);
}

#[tokio::test]
async fn unknown_hook_returns_input() {
    let hooks = HookSystem::new();
    let mut ctx = HookContext::new();
    let out = hooks.execute("nothing", json!({"a": 1}), &mut ctx).await.unwrap();
    assert_eq!(out, json!({"a": 1}));
}

#[tokio::test]
async fn failures_are_skipped_but_critical_errors_stop() {
    let hooks = HookSystem::new();
    hooks.register("content:save", append("first"), 1);
    hooks.register("content:save", hook_fn(|_, _| Err(HookError::failed("flaky"))), 2);
    hooks.register("content:save", append("third"), 3);

    let mut ctx = HookContext::new();
    let out = hooks
        .execute("content:save", json!({ "trail": [] }), &mut ctx)
        .await
        .unwrap();
    assert_eq!(trail(&out), vec!["first", "third"]);

    hooks.register("content:save", hook_fn(|_, _| Err(HookError::critical("disk full"))), 4);
    let err = hooks
        .execute("content:save", json!({ "trail": [] }), &mut ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, HookError::Critical(ref m) if m == "disk full"));
}

#[tokio::test]
async fn cancel_stops_remaining_handlers() {
    let hooks = HookSystem::new();
    hooks.register("auth:login", append("one"), 1);
    hooks.register(
        "auth:login",
        hook_fn(|data, ctx| {
            ctx.metadata.insert("stoppedBy".to_string(), json!("guard"));
            ctx.cancel();
            Ok(data)
        }),
        2,
    );
    hooks.register("auth:login", append("never"), 3);

    let mut ctx = HookContext::new();
    let out = hooks
        .execute("auth:login", json!({ "trail": [] }), &mut ctx)
        .await
        .unwrap();

    assert_eq!(trail(&out), vec!["one"]);
    assert!(ctx.is_cancelled());
    assert_eq!(ctx.metadata["stoppedBy"], "guard");
}

/// Re-enters the hook it is registered on.
struct Reentrant {
    hooks: HookSystem,
}

#[async_trait]
impl HookHandler for Reentrant {
    async fn handle(&self, data: Value, ctx: &mut HookContext) -> Result<Value, HookError> {
        let inner = self.hooks.execute("loop", json!({ "nested": true }), ctx).await?;
        Ok(json!({ "outer": data, "inner": inner }))
    }
}

#[tokio::test]
async fn recursive_execution_is_short_circuited() {
    let hooks = HookSystem::new();
    hooks.register(
        "loop",
        Arc::new(Reentrant {
            hooks: hooks.clone(),
        }),
        10,
    );

    let mut ctx = HookContext::new();
    let out = hooks.execute("loop", json!(1), &mut ctx).await.unwrap();

    assert_eq!(out, json!({ "outer": 1, "inner": { "nested": true } }));

    // The guard is released once the outer run finishes.
    let again = hooks.execute("loop", json!(2), &mut ctx).await.unwrap();
    assert_eq!(again["outer"], 2);
}

#[tokio::test]
async fn scoped_hooks_are_removed_together() {
    let hooks = HookSystem::new();
    let seo = hooks.scope("seo");
    seo.register("content:save", append("seo"), 5);
    seo.register("content:render", append("seo"), 5);
    hooks.register("content:save", append("core"), 1);

    let infos = hooks.hooks("content:save");
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[1].plugin.as_deref(), Some("seo"));

    seo.unregister_all();

    assert_eq!(hooks.hook_names(), vec!["content:save"]);
    assert_eq!(hooks.stats()["content:save"], 1);

    let mut ctx = HookContext::new();
    let out = seo
        .execute("content:save", json!({ "trail": [] }), &mut ctx)
        .await
        .unwrap();
    assert_eq!(trail(&out), vec!["core"]);
}

/// Sleeps before marking the data, so concurrent runs overlap.
struct Slow;

#[async_trait]
impl HookHandler for Slow {
    async fn handle(&self, mut data: Value, _ctx: &mut HookContext) -> Result<Value, HookError> {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        data["ran"] = json!(true);
        Ok(data)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_executions_of_one_hook_both_run() {
    let hooks = HookSystem::new();
    hooks.register("content:save", Arc::new(Slow), 10);

    let first = {
        let hooks = hooks.clone();
        tokio::spawn(async move {
            let mut ctx = HookContext::new();
            hooks.execute("content:save", json!({ "req": 1 }), &mut ctx).await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let second = {
        let hooks = hooks.clone();
        tokio::spawn(async move {
            let mut ctx = HookContext::new();
            hooks.execute("content:save", json!({ "req": 2 }), &mut ctx).await
        })
    };

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    assert_eq!(a, json!({ "req": 1, "ran": true }));
    assert_eq!(b, json!({ "req": 2, "ran": true }));
}

#[tokio::test]
async fn interleaved_executions_on_one_task_are_independent() {
    let hooks = HookSystem::new();
    hooks.register("content:save", Arc::new(Slow), 10);

    let mut ctx_a = HookContext::new();
    let mut ctx_b = HookContext::new();
    let (a, b) = tokio::join!(
        hooks.execute("content:save", json!({ "req": 1 }), &mut ctx_a),
        hooks.execute("content:save", json!({ "req": 2 }), &mut ctx_b),
    );

    assert_eq!(a.unwrap()["ran"], true);
    assert_eq!(b.unwrap()["ran"], true);
}

#[tokio::test]
async fn clear_inside_a_handler_leaves_the_system_usable() {
    let hooks = HookSystem::new();
    let clearing = hooks.clone();
    hooks.register(
        "app:shutdown",
        hook_fn(move |data, _| {
            clearing.clear();
            Ok(data)
        }),
        10,
    );

    let mut ctx = HookContext::new();
    hooks.execute("app:shutdown", json!({ "trail": [] }), &mut ctx).await.unwrap();
    assert!(hooks.hook_names().is_empty());

    hooks.register("app:shutdown", append("after-clear"), 10);
    let out = hooks
        .execute("app:shutdown", json!({ "trail": [] }), &mut ctx)
        .await
        .unwrap();
    assert_eq!(trail(&out), vec!["after-clear"]);
}
