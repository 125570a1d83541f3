mod common;

use dict_domain::{
    EntryRepository, Ispb, SyncReportRepository, SyncStatus, SyncType,
};
use dict_durable::{RunStatus, WorkflowError};
use dict_workflows::ids::{vsync_workflow_id, VSYNC_SCHEDULER_WORKFLOW_ID};
use dict_workflows::{VSyncInput, VSyncSchedulerInput};

use common::{local_entry, remote_entry, Harness, DAY, OUR_ISPB, START};

fn full_sync() -> VSyncInput {
    VSyncInput {
        participant_ispb: Some(OUR_ISPB.to_string()),
        sync_type: "FULL".to_string(),
        last_sync_date: None,
    }
}

/// Registry holds a@ and b@; locally b@ is outdated and d@ is unknown to
/// the registry.
async fn diverged(h: &Harness) {
    h.mem.registry.put_entry(remote_entry("a@example.com", "1"));
    h.mem.registry.put_entry(remote_entry("b@example.com", "2"));
    h.seed_entry(local_entry("E-b", "b@example.com", "999")).await;
    h.seed_entry(local_entry("E-d", "d@example.com", "4")).await;
}

#[tokio::test(start_paused = true)]
async fn repairs_missing_and_outdated_entries_and_flags_the_rest() {
    let h = Harness::new();
    diverged(&h).await;

    let handle = h.client.start_vsync(&full_sync()).await.unwrap();
    assert_eq!(handle.workflow_id(), vsync_workflow_id(START.date()));
    let result = handle.result().await.unwrap();

    assert_eq!(result.status, SyncStatus::Completed);
    let c = result.counts;
    assert_eq!(c.entries_fetched, 2);
    assert_eq!(c.entries_compared, 3);
    assert_eq!((c.missing_local, c.outdated_local, c.missing_bacen), (1, 1, 1));
    assert_eq!(c.discrepancies, 3);
    assert_eq!((c.created, c.updated, c.flagged_for_review), (1, 1, 1));
    assert_eq!(c.deleted, 0);
    assert_eq!(c.repair_failures, 0);

    let created = h
        .mem
        .entries
        .get_by_key("a@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.account.number, "1");
    assert_eq!(h.entry("E-b").await.account.number, "2");

    let orphan = h.entry("E-d").await;
    assert!(!orphan.is_deleted());
    assert!(orphan.review.is_some());

    let report = h
        .mem
        .reports
        .find_by_sync_id(handle.run_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Some(report.report_id), result.report_id);
    assert_eq!(report.sync_type, SyncType::Full);
    assert_eq!(report.counts, result.counts);
    assert_eq!(report.participant_ispb, Some(Ispb::parse(OUR_ISPB).unwrap()));

    let events = h.mem.publisher.of_type("vsync_completed");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].partition_key, OUR_ISPB);
}

#[tokio::test(start_paused = true)]
async fn second_run_without_remote_changes_finds_nothing() {
    let h = Harness::new();
    diverged(&h).await;

    let first = h.client.start_vsync(&full_sync()).await.unwrap();
    first.result().await.unwrap();

    let second = h.client.start_vsync(&full_sync()).await.unwrap();
    let result = second.result().await.unwrap();
    assert_eq!(result.status, SyncStatus::Completed);
    assert_eq!(result.counts.discrepancies, 0);
    assert_eq!(result.counts.created + result.counts.updated, 0);
    assert_eq!(result.counts.flagged_for_review, 0);
    assert!(!h.entry("E-d").await.is_deleted());
    assert_eq!(h.mem.reports.list(10).await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_repairs_make_the_run_partial() {
    let h = Harness::new();
    diverged(&h).await;
    h.mem.entries.faults().fail_always("insert");

    let result = h
        .client
        .start_vsync(&full_sync())
        .await
        .unwrap()
        .result()
        .await
        .unwrap();
    assert_eq!(result.status, SyncStatus::Partial);
    assert_eq!(result.counts.repair_failures, 1);
    assert_eq!(result.counts.created, 0);
    assert_eq!(result.error_message.as_deref(), Some("1 out of 3 fixes failed"));
    assert!(result.report_id.is_some());
}

#[tokio::test(start_paused = true)]
async fn registry_outage_fails_the_run_with_a_report() {
    let h = Harness::new();
    h.mem.registry.faults().fail_always("fetch_entries");

    let err = h
        .client
        .start_vsync(&full_sync())
        .await
        .unwrap()
        .result()
        .await
        .unwrap_err();
    assert!(err.is_activity_failure());

    let reports = h.mem.reports.list(10).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, SyncStatus::Failed);
    assert!(reports[0].error_message.is_some());
}

#[tokio::test(start_paused = true)]
async fn pages_are_accumulated() {
    let h = Harness::new();
    for i in 0..1001 {
        h.mem
            .registry
            .put_entry(remote_entry(&format!("user{i:04}@example.com"), "1"));
    }
    let result = h
        .client
        .start_vsync(&full_sync())
        .await
        .unwrap()
        .result()
        .await
        .unwrap();
    assert_eq!(result.counts.entries_fetched, 1001);
    assert_eq!(result.counts.created, 1001);
    assert_eq!(h.mem.registry.faults().calls("fetch_entries"), 2);
}

#[tokio::test(start_paused = true)]
async fn incremental_sync_requires_a_start_date() {
    let h = Harness::new();
    let input = VSyncInput {
        participant_ispb: None,
        sync_type: "INCREMENTAL".to_string(),
        last_sync_date: None,
    };
    let outcome = h.client.start_vsync(&input).await.unwrap().result().await;
    assert!(matches!(outcome, Err(WorkflowError::Validation(_))));
}

#[tokio::test(start_paused = true)]
async fn scheduler_runs_daily_and_continues_as_new() {
    let h = Harness::new();
    h.mem.registry.put_entry(remote_entry("a@example.com", "1"));
    h.client
        .start_scheduler(&VSyncSchedulerInput::default())
        .await
        .unwrap();

    tokio::time::sleep(DAY + std::time::Duration::from_secs(60)).await;

    let engine = h.client.engine();
    let first_day = engine.describe(&vsync_workflow_id(START.date())).await.unwrap();
    assert_eq!(first_day.status, RunStatus::Completed);
    let next_day = START + DAY;
    let second_day = engine.describe(&vsync_workflow_id(next_day.date())).await.unwrap();
    assert_eq!(second_day.status, RunStatus::Completed);

    let scheduler = engine.describe(VSYNC_SCHEDULER_WORKFLOW_ID).await.unwrap();
    assert_eq!(scheduler.status, RunStatus::Running);
    assert!(scheduler.continued_from.is_some());

    assert!(h.mem.entries.get_by_key("a@example.com").await.unwrap().is_some());
    h.worker.shutdown();
}
