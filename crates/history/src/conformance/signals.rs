use std::future::Future;

use super::{check, completed, make_run, Check, T0};
use crate::{HistoryError, HistoryStore};

pub(super) async fn run_signal_tests<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    checks!("signals", factory =>
        signal_ids_follow_arrival_order,
        signals_isolated_per_run,
        signal_to_closed_run_rejected,
    )
}

async fn signal_ids_follow_arrival_order<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let mut ids = Vec::new();
    for name in ["evidence_added", "evidence_added", "investigation_complete"] {
        let record = store
            .append_signal("run-1", name, serde_json::json!({}), T0)
            .await
            .map_err(|e| format!("append_signal failed: {e}"))?;
        ids.push(record.signal_id);
    }
    check(
        ids.windows(2).all(|w| w[0] < w[1]),
        format!("signal ids not increasing: {ids:?}"),
    )?;
    let loaded = store
        .load_signals("run-1")
        .await
        .map_err(|e| format!("load_signals failed: {e}"))?;
    let names: Vec<&str> = loaded.iter().map(|s| s.name.as_str()).collect();
    check(
        names == ["evidence_added", "evidence_added", "investigation_complete"],
        format!("signals loaded as {names:?}"),
    )
}

async fn signals_isolated_per_run<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    for (run, wf) in [("run-1", "wf-1"), ("run-2", "wf-2")] {
        store
            .create_run(make_run(run, wf))
            .await
            .map_err(|e| format!("create_run failed: {e}"))?;
    }
    store
        .append_signal("run-1", "confirm", serde_json::json!({}), T0)
        .await
        .map_err(|e| format!("append_signal failed: {e}"))?;
    let other = store
        .load_signals("run-2")
        .await
        .map_err(|e| format!("load_signals failed: {e}"))?;
    check(other.is_empty(), "signal leaked into another run")
}

async fn signal_to_closed_run_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
    match store
        .append_signal("run-1", "cancel", serde_json::json!({}), T0)
        .await
    {
        Err(HistoryError::RunClosed { .. }) => Ok(()),
        other => Err(format!("expected RunClosed, got {other:?}")),
    }
}
