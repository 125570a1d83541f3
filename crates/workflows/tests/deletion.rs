mod common;

use dict_domain::memory::Notification;
use dict_domain::{DeletionReason, EntryStatus};
use dict_durable::WorkflowError;
use dict_workflows::{CancelDeletion, DeletionOutcome, EntryDeletionInput, VSyncInput};

use common::{local_entry, remote_entry, Harness, DAY, OUR_ISPB};

fn deletion(entry_id: &str) -> EntryDeletionInput {
    EntryDeletionInput {
        entry_id: entry_id.to_string(),
        deletion_reason: "USER_REQUEST".to_string(),
        requested_by: "mobile-app".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn cancelling_within_grace_period_restores_the_entry() {
    let h = Harness::new();
    h.seed_entry(local_entry("E1", "maria@example.com", "1001")).await;
    let handle = h.client.start_entry_deletion(&deletion("E1")).await.unwrap();

    tokio::time::sleep(10 * DAY).await;
    assert_eq!(h.entry("E1").await.status, EntryStatus::Inactive);

    let cancel = CancelDeletion {
        reason: "changed my mind".to_string(),
        cancelled_by: "maria".to_string(),
    };
    assert!(h.client.cancel_entry_deletion("E1", &cancel).await.unwrap());

    let result = handle.result().await.unwrap();
    assert_eq!(result.status, DeletionOutcome::Cancelled);
    assert_eq!(result.message, "Deletion cancelled by maria: changed my mind");
    assert!(result.deleted_at.is_none());

    let entry = h.entry("E1").await;
    assert_eq!(entry.status, EntryStatus::Active);
    assert!(!entry.is_deleted());
    assert!(h.mem.registry.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn entry_is_deleted_and_reported_after_thirty_days() {
    let h = Harness::new();
    h.seed_entry(local_entry("E2", "joao@example.com", "1002")).await;
    let handle = h.client.start_entry_deletion(&deletion("E2")).await.unwrap();

    let result = handle.result().await.unwrap();
    assert_eq!(result.status, DeletionOutcome::Deleted);
    assert!(result.bacen_notified);
    assert_eq!(
        result.message,
        "Entry deleted successfully after 30-day waiting period and Bacen notified"
    );
    assert_eq!(h.elapsed_since_start(result.deleted_at.unwrap()), 30 * DAY);

    assert!(h.entry("E2").await.is_deleted());
    assert_eq!(
        h.mem.registry.notifications(),
        vec![Notification::EntryDeletion {
            entry_id: "E2".to_string(),
            reason: DeletionReason::UserRequest
        }]
    );
    assert_eq!(h.mem.publisher.of_type("entry_deletion_completed").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_after_deletion_changes_nothing() {
    let h = Harness::new();
    h.seed_entry(local_entry("E6", "rita@example.com", "1006")).await;
    let handle = h.client.start_entry_deletion(&deletion("E6")).await.unwrap();
    assert_eq!(handle.result().await.unwrap().status, DeletionOutcome::Deleted);

    let cancel = CancelDeletion {
        reason: "too late".to_string(),
        cancelled_by: "rita".to_string(),
    };
    assert!(!h.client.cancel_entry_deletion("E6", &cancel).await.unwrap());

    let entry = h.entry("E6").await;
    assert!(entry.is_deleted());
    assert_eq!(entry.status, EntryStatus::Inactive);
}

#[tokio::test(start_paused = true)]
async fn entry_reactivated_by_reconciliation_is_not_deleted() {
    let h = Harness::new();
    h.mem.registry.put_entry(remote_entry("paulo@example.com", "1005"));
    h.seed_entry(local_entry("E5", "paulo@example.com", "1005")).await;
    let handle = h.client.start_entry_deletion(&deletion("E5")).await.unwrap();

    tokio::time::sleep(DAY).await;
    assert_eq!(h.entry("E5").await.status, EntryStatus::Inactive);

    // The registry still lists the key as active, so a full sync restores it.
    let sync = VSyncInput {
        participant_ispb: Some(OUR_ISPB.to_string()),
        sync_type: "FULL".to_string(),
        last_sync_date: None,
    };
    let synced = h.client.start_vsync(&sync).await.unwrap().result().await.unwrap();
    assert_eq!(synced.counts.updated, 1);
    assert_eq!(h.entry("E5").await.status, EntryStatus::Active);

    let result = handle.result().await.unwrap();
    assert_eq!(result.status, DeletionOutcome::Cancelled);
    assert_eq!(
        result.message,
        "Deletion skipped - entry is ACTIVE at the end of the waiting period"
    );
    assert!(result.deleted_at.is_none());
    assert!(!result.bacen_notified);

    let entry = h.entry("E5").await;
    assert!(!entry.is_deleted());
    assert_eq!(entry.status, EntryStatus::Active);
    assert!(h.mem.registry.notifications().is_empty());
    assert!(h.mem.publisher.of_type("entry_deletion_completed").is_empty());
}

#[tokio::test(start_paused = true)]
async fn registry_outage_leaves_entry_deleted_with_pending_notice() {
    let h = Harness::new();
    h.mem.registry.faults().fail_always("report_entry_deletion");
    h.seed_entry(local_entry("E3", "ana@example.com", "1003")).await;
    let handle = h.client.start_entry_deletion(&deletion("E3")).await.unwrap();

    let result = handle.result().await.unwrap();
    assert_eq!(result.status, DeletionOutcome::Deleted);
    assert!(!result.bacen_notified);
    assert_eq!(
        result.message,
        "Entry deleted but Bacen notification pending - will retry"
    );
    assert!(result
        .error_reason
        .as_deref()
        .unwrap()
        .starts_with("Bacen notification failed: "));
    assert!(h.entry("E3").await.is_deleted());
}

#[tokio::test(start_paused = true)]
async fn unknown_reason_is_rejected() {
    let h = Harness::new();
    let mut input = deletion("E4");
    input.deletion_reason = "BORED".to_string();
    let handle = h.client.start_entry_deletion(&input).await.unwrap();
    assert!(matches!(handle.result().await, Err(WorkflowError::Validation(_))));
}
