use std::future::Future;

use super::{check, completed, make_run, Check, T0};
use crate::record::{HistoryEvent, SelectChoice};
use crate::{HistoryError, HistoryStore};

pub(super) async fn run_event_tests<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    checks!("events", factory =>
        events_load_in_sequence_order,
        duplicate_sequence_rejected,
        append_to_closed_run_rejected,
        append_to_unknown_run_rejected,
        history_readable_after_close,
    )
}

fn timer_started(seq: u64) -> HistoryEvent {
    HistoryEvent::TimerStarted {
        seq,
        fire_at: T0 + time::Duration::days(30),
    }
}

async fn events_load_in_sequence_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .create_run(make_run("run-1", "wf-1"))
        .await
        .map_err(|e| format!("create_run failed: {e}"))?;
    let events = vec![
        HistoryEvent::ClockRead { seq: 0, at: T0 },
        timer_started(1),
        HistoryEvent::SelectResolved {
            seq: 2,
            choice: SelectChoice::Timer { timer_seq: 1 },
        },
    ];
    // Appended out of order; loaded by sequence.
    for idx in [2usize, 0, 1] {
        store
            .append_event("run-1", events[idx].clone())
            .await
            .map_err(|e| format!("append_event failed: {e}"))?;
    }
    let loaded = store
        .load_events("run-1")
        .await
        .map_err(|e| format!("load_events failed: {e}"))?;
    check(loaded == events, format!("loaded {loaded:?}"))
}

async fn duplicate_sequence_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .create_run(make_run("run-1", "wf-1"))
        .await
        .map_err(|e| format!("create_run failed: {e}"))?;
    store
        .append_event("run-1", timer_started(0))
        .await
        .map_err(|e| format!("append_event failed: {e}"))?;
    match store
        .append_event("run-1", HistoryEvent::ClockRead { seq: 0, at: T0 })
        .await
    {
        Err(HistoryError::SequenceConflict { seq: 0, .. }) => {}
        other => return Err(format!("expected SequenceConflict, got {other:?}")),
    }
    let loaded = store
        .load_events("run-1")
        .await
        .map_err(|e| format!("load_events failed: {e}"))?;
    check(
        loaded == vec![timer_started(0)],
        "original event was overwritten",
    )
}

async fn append_to_closed_run_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .create_run(make_run("run-1", "wf-1"))
        .await
        .map_err(|e| format!("create_run failed: {e}"))?;
    store
        .close_run("run-1", completed())
        .await
        .map_err(|e| format!("close_run failed: {e}"))?;
    match store.append_event("run-1", timer_started(0)).await {
        Err(HistoryError::RunClosed { .. }) => Ok(()),
        other => Err(format!("expected RunClosed, got {other:?}")),
    }
}

async fn append_to_unknown_run_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store.append_event("nope", timer_started(0)).await {
        Err(HistoryError::RunNotFound { run_id }) if run_id == "nope" => Ok(()),
        other => Err(format!("expected RunNotFound, got {other:?}")),
    }
}

async fn history_readable_after_close<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .create_run(make_run("run-1", "wf-1"))
        .await
        .map_err(|e| format!("create_run failed: {e}"))?;
    store
        .append_event(
            "run-1",
            HistoryEvent::ActivityCompleted {
                seq: 0,
                activity: "CreateClaimActivity".to_string(),
                attempts: 2,
                output: serde_json::json!({"claim_id": "C1"}),
            },
        )
        .await
        .map_err(|e| format!("append_event failed: {e}"))?;
    store
        .close_run("run-1", completed())
        .await
        .map_err(|e| format!("close_run failed: {e}"))?;
    let loaded = store
        .load_events("run-1")
        .await
        .map_err(|e| format!("load_events failed: {e}"))?;
    check(loaded.len() == 1, format!("expected 1 event, got {}", loaded.len()))
}
