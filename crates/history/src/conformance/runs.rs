use std::future::Future;

use super::{check, completed, make_run, Check};
use crate::record::{RunOutcome, RunStatus};
use crate::{HistoryError, HistoryStore};

pub(super) async fn run_run_tests<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    checks!("runs", factory =>
        created_run_is_readable,
        duplicate_run_id_rejected,
        second_open_run_for_workflow_rejected,
        new_run_allowed_after_close,
        latest_run_tracks_newest,
        latest_run_unknown_workflow,
        close_records_outcome,
        close_twice_rejected,
        list_open_runs_excludes_closed,
    )
}

async fn created_run_is_readable<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let run = make_run("run-1", "wf-1");
    store
        .create_run(run.clone())
        .await
        .map_err(|e| format!("create_run failed: {e}"))?;
    let read = store
        .get_run("run-1")
        .await
        .map_err(|e| format!("get_run failed: {e}"))?;
    check(read == run, format!("read back {read:?}, expected {run:?}"))
}

async fn duplicate_run_id_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
    match store.create_run(make_run("run-1", "wf-2")).await {
        Err(HistoryError::RunAlreadyExists { run_id }) if run_id == "run-1" => Ok(()),
        other => Err(format!("expected RunAlreadyExists, got {other:?}")),
    }
}

async fn second_open_run_for_workflow_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
    match store.create_run(make_run("run-2", "wf-1")).await {
        Err(HistoryError::WorkflowAlreadyOpen {
            workflow_id,
            run_id,
        }) => {
            check(workflow_id == "wf-1", format!("wrong workflow id {workflow_id}"))?;
            check(run_id == "run-1", format!("wrong open run id {run_id}"))
        }
        other => Err(format!("expected WorkflowAlreadyOpen, got {other:?}")),
    }
}

async fn new_run_allowed_after_close<S, F, Fut>(factory: &F) -> Result<(), String>
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
    store
        .create_run(make_run("run-2", "wf-1"))
        .await
        .map_err(|e| format!("second create_run after close failed: {e}"))
}

async fn latest_run_tracks_newest<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let mut next = make_run("run-2", "wf-1");
    next.continued_from = Some("run-1".to_string());
    store
        .create_run(next)
        .await
        .map_err(|e| format!("create_run failed: {e}"))?;
    let latest = store
        .latest_run("wf-1")
        .await
        .map_err(|e| format!("latest_run failed: {e}"))?;
    check(
        latest.run_id == "run-2",
        format!("latest run is {}, expected run-2", latest.run_id),
    )?;
    check(
        latest.continued_from.as_deref() == Some("run-1"),
        "continued_from not preserved",
    )
}

async fn latest_run_unknown_workflow<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store.latest_run("missing").await {
        Err(HistoryError::WorkflowNotFound { workflow_id }) if workflow_id == "missing" => Ok(()),
        other => Err(format!("expected WorkflowNotFound, got {other:?}")),
    }
}

async fn close_records_outcome<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let outcome = RunOutcome {
        status: RunStatus::Failed,
        result: None,
        error: Some("boom".to_string()),
        closed_at: completed().closed_at,
    };
    store
        .close_run("run-1", outcome.clone())
        .await
        .map_err(|e| format!("close_run failed: {e}"))?;
    let run = store
        .get_run("run-1")
        .await
        .map_err(|e| format!("get_run failed: {e}"))?;
    check(run.status == RunStatus::Failed, format!("status {}", run.status))?;
    check(run.error.as_deref() == Some("boom"), "error not recorded")?;
    check(
        run.closed_at == Some(outcome.closed_at),
        "closed_at not recorded",
    )
}

async fn close_twice_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
    match store.close_run("run-1", completed()).await {
        Err(HistoryError::RunClosed { .. }) => Ok(()),
        other => Err(format!("expected RunClosed, got {other:?}")),
    }
}

async fn list_open_runs_excludes_closed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: HistoryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    for (run, wf) in [("run-1", "wf-1"), ("run-2", "wf-2"), ("run-3", "wf-3")] {
        store
            .create_run(make_run(run, wf))
            .await
            .map_err(|e| format!("create_run failed: {e}"))?;
    }
    store
        .close_run("run-2", completed())
        .await
        .map_err(|e| format!("close_run failed: {e}"))?;
    let open: Vec<String> = store
        .list_open_runs()
        .await
        .map_err(|e| format!("list_open_runs failed: {e}"))?
        .into_iter()
        .map(|r| r.run_id)
        .collect();
    check(
        open == vec!["run-1".to_string(), "run-3".to_string()],
        format!("open runs {open:?}"),
    )
}
