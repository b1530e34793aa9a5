//! Lifecycle hooks and concurrent operations through the engine.

mod common;

use std::sync::Arc;

use common::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use vellum_core::OperationState;
use vellum_engine::{EngineError, HookAbort, HookPhase};

#[tokio::test]
async fn before_validate_hook_can_normalize_payload() {
    let h = harness("abort");
    h.engine
        .hooks()
        .register(HookPhase::BeforeValidate, "article", 0, "trim-title", |ctx| {
            let payload = ctx.payload_mut()?;
            if let Some(Value::String(title)) = payload.get_mut("title") {
                *title = title.trim().to_string();
            }
            Ok(())
        });

    let report = h
        .engine
        .create(
            &ctx(&h.engine, "e-1", "editor"),
            "article",
            None,
            payload(json!({"title": "  spaced  "})),
        )
        .await
        .unwrap();
    let stored = h.store.raw("article", &report.value.record_id).unwrap();
    assert_eq!(stored.fields["title"], json!("spaced"));
}

#[tokio::test]
async fn hooks_run_in_priority_order() {
    let h = harness("abort");
    let order = Arc::new(Mutex::new(Vec::new()));
    for (priority, name) in [(20, "late"), (-5, "early"), (0, "middle")] {
        let order = Arc::clone(&order);
        h.engine
            .hooks()
            .register(HookPhase::AfterValidate, "*", priority, name, move |ctx| {
                order.lock().push(ctx.phase.as_str().to_string() + ":" + name);
                Ok(())
            });
    }

    h.engine
        .create(
            &ctx(&h.engine, "e-1", "editor"),
            "article",
            None,
            payload(json!({"title": "T"})),
        )
        .await
        .unwrap();

    let names: Vec<String> = order.lock().clone();
    assert_eq!(
        names,
        vec![
            "after_validate:early".to_string(),
            "after_validate:middle".to_string(),
            "after_validate:late".to_string(),
        ]
    );
}

#[tokio::test]
async fn aborting_hook_fails_operation_and_is_audited() {
    let h = harness("abort");
    h.engine
        .hooks()
        .register(HookPhase::BeforePersist, "article", 0, "embargo", |_| {
            Err(HookAbort::new("publishing is frozen"))
        });

    let failure = h
        .engine
        .create(
            &ctx(&h.engine, "e-1", "editor"),
            "article",
            None,
            payload(json!({"title": "T"})),
        )
        .await
        .unwrap_err();

    match &failure.error {
        EngineError::HookAborted {
            phase, hook, reason, ..
        } => {
            assert_eq!(*phase, HookPhase::BeforePersist);
            assert_eq!(hook, "embargo");
            assert_eq!(reason, "publishing is frozen");
        }
        other => panic!("expected HookAborted, got {other:?}"),
    }
    assert_eq!(failure.phase, OperationState::AccessChecked);
    assert!(h.store.is_empty());
    assert_eq!(h.audit.len(), 1);
}

#[tokio::test]
async fn after_validate_hooks_cannot_mutate() {
    let h = harness("abort");
    h.engine
        .hooks()
        .register(HookPhase::AfterValidate, "article", 0, "sneaky", |ctx| {
            ctx.payload_mut()?.insert("title".into(), json!("changed"));
            Ok(())
        });

    let failure = h
        .engine
        .create(
            &ctx(&h.engine, "e-1", "editor"),
            "article",
            None,
            payload(json!({"title": "T"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(failure.error, EngineError::HookAborted { .. }));
}

#[tokio::test]
async fn before_persist_edits_are_revalidated_and_rechecked() {
    let h = harness("abort");
    h.engine
        .hooks()
        .register(HookPhase::BeforePersist, "article", 0, "inject", |ctx| {
            ctx.payload_mut()?
                .insert("content".into(), json!("added by hook"));
            Ok(())
        });

    // A user may not write `content`, even when a hook adds it.
    let failure = h
        .engine
        .create(
            &ctx(&h.engine, "u-1", "user"),
            "article",
            None,
            payload(json!({"title": "T"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(failure.error, EngineError::AccessDenied { .. }));
    assert!(h.store.is_empty());

    let report = h
        .engine
        .create(
            &ctx(&h.engine, "e-1", "editor"),
            "article",
            None,
            payload(json!({"title": "T"})),
        )
        .await
        .unwrap();
    let stored = h.store.raw("article", &report.value.record_id).unwrap();
    assert!(stored.fields["content"].as_str().unwrap().starts_with("vellum:enc:v1:"));
}

#[tokio::test]
async fn before_persist_edit_that_breaks_validation_fails() {
    let h = harness("abort");
    h.engine
        .hooks()
        .register(HookPhase::BeforePersist, "article", 0, "pad", |ctx| {
            ctx.payload_mut()?
                .insert("title".into(), json!("x".repeat(300)));
            Ok(())
        });

    let failure = h
        .engine
        .create(
            &ctx(&h.engine, "e-1", "editor"),
            "article",
            None,
            payload(json!({"title": "T"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(failure.error, EngineError::ValidationFailed(_)));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn after_persist_failures_do_not_fail_the_write() {
    let h = harness("abort");
    h.engine
        .hooks()
        .register(HookPhase::AfterPersist, "*", 0, "notify", |_| {
            Err(HookAbort::new("mail relay down"))
        });

    let report = h
        .engine
        .create(
            &ctx(&h.engine, "e-1", "editor"),
            "article",
            None,
            payload(json!({"title": "T"})),
        )
        .await
        .unwrap();
    assert!(report.is_complete());
}

#[tokio::test]
async fn unregistered_hooks_stop_running() {
    let h = harness("abort");
    let id = h
        .engine
        .hooks()
        .register(HookPhase::BeforeValidate, "*", 0, "block", |_| {
            Err(HookAbort::new("blocked"))
        });
    assert!(h.engine.hooks().unregister(id));

    let report = h
        .engine
        .create(
            &ctx(&h.engine, "e-1", "editor"),
            "article",
            None,
            payload(json!({"title": "T"})),
        )
        .await;
    assert!(report.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_are_each_audited_once() {
    let h = harness("abort");
    let mut tasks = Vec::new();
    for n in 0..32 {
        let engine = Arc::clone(&h.engine);
        tasks.push(tokio::spawn(async move {
            let ctx = ctx(&engine, "e-1", "editor");
            engine
                .create(
                    &ctx,
                    "article",
                    None,
                    payload(json!({"title": format!("post {n}"), "content": "body"})),
                )
                .await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().unwrap().is_complete());
    }

    assert_eq!(h.store.len(), 32);
    assert_eq!(h.audit.len(), 32);
    assert!(h.audit.verify_chain().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_updates_on_one_record_leave_one_winner_per_revision() {
    let h = harness("abort");
    let id = record_id("contested");
    h.engine
        .create(
            &ctx(&h.engine, "e-1", "editor"),
            "article",
            Some(id.clone()),
            payload(json!({"title": "base"})),
        )
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for n in 0..8 {
        let engine = Arc::clone(&h.engine);
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let ctx = ctx(&engine, "e-1", "editor");
            engine
                .update(
                    &ctx,
                    "article",
                    &id,
                    payload(json!({"title": format!("edit {n}")})),
                    Some(vellum_engine::Revision::FIRST),
                )
                .await
        }));
    }

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => winners += 1,
            Err(failure) => assert!(matches!(failure.error, EngineError::Conflict { .. })),
        }
    }
    assert_eq!(winners, 1);
    // Create plus one audit per update attempt.
    assert_eq!(h.audit.len(), 9);
}
