//! Typed start and signal helpers over the engine.

use dict_durable::{Engine, WorkflowError, WorkflowHandle, WorkflowOptions};

use crate::claim::{
    CancelClaim, ClaimInput, ClaimResult, ClaimWorkflow, ConfirmClaim, CANCEL_SIGNAL,
    CLAIM_EXECUTION_TIMEOUT, CONFIRM_SIGNAL,
};
use crate::deletion::{
    CancelDeletion, EntryDeletionInput, EntryDeletionResult, EntryDeletionWorkflow,
    CANCEL_DELETION_SIGNAL, DELETION_EXECUTION_TIMEOUT,
};
use crate::ids::{
    claim_workflow_id, entry_deletion_workflow_id, infraction_workflow_id, vsync_workflow_id,
    VSYNC_SCHEDULER_WORKFLOW_ID,
};
use crate::infraction::{
    EvidenceAdded, InfractionInput, InfractionResult, InfractionWorkflow, InvestigationComplete,
    EVIDENCE_ADDED_SIGNAL, INFRACTION_EXECUTION_TIMEOUT, INVESTIGATION_COMPLETE_SIGNAL,
};
use crate::vsync::{
    VSyncInput, VSyncResult, VSyncSchedulerInput, VSyncSchedulerWorkflow, VSyncWorkflow,
    VSYNC_EXECUTION_TIMEOUT,
};

/// What request handlers use to drive DICT workflows.
///
/// Signal helpers return `Ok(false)` when the workflow has already
/// finished and the signal was dropped.
#[derive(Clone)]
pub struct DictClient {
    engine: Engine,
}

impl DictClient {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    // ── Claims ───────────────────────────────────────────────────────────────

    pub async fn start_claim(&self, input: &ClaimInput) -> Result<WorkflowHandle<ClaimResult>, WorkflowError> {
        self.engine
            .start::<ClaimWorkflow>(
                &claim_workflow_id(&input.claim_id),
                input,
                WorkflowOptions::with_execution_timeout(CLAIM_EXECUTION_TIMEOUT),
            )
            .await
    }

    pub async fn confirm_claim(&self, claim_id: &str, confirm: &ConfirmClaim) -> Result<bool, WorkflowError> {
        self.engine
            .signal(&claim_workflow_id(claim_id), CONFIRM_SIGNAL, confirm)
            .await
    }

    pub async fn cancel_claim(&self, claim_id: &str, cancel: &CancelClaim) -> Result<bool, WorkflowError> {
        self.engine
            .signal(&claim_workflow_id(claim_id), CANCEL_SIGNAL, cancel)
            .await
    }

    // ── Infractions ──────────────────────────────────────────────────────────

    pub async fn start_infraction(
        &self,
        input: &InfractionInput,
    ) -> Result<WorkflowHandle<InfractionResult>, WorkflowError> {
        self.engine
            .start::<InfractionWorkflow>(
                &infraction_workflow_id(&input.infraction_id),
                input,
                WorkflowOptions::with_execution_timeout(INFRACTION_EXECUTION_TIMEOUT),
            )
            .await
    }

    pub async fn add_evidence(&self, infraction_id: &str, evidence: &EvidenceAdded) -> Result<bool, WorkflowError> {
        self.engine
            .signal(&infraction_workflow_id(infraction_id), EVIDENCE_ADDED_SIGNAL, evidence)
            .await
    }

    pub async fn complete_investigation(
        &self,
        infraction_id: &str,
        complete: &InvestigationComplete,
    ) -> Result<bool, WorkflowError> {
        self.engine
            .signal(
                &infraction_workflow_id(infraction_id),
                INVESTIGATION_COMPLETE_SIGNAL,
                complete,
            )
            .await
    }

    // ── Entry deletion ───────────────────────────────────────────────────────

    pub async fn start_entry_deletion(
        &self,
        input: &EntryDeletionInput,
    ) -> Result<WorkflowHandle<EntryDeletionResult>, WorkflowError> {
        self.engine
            .start::<EntryDeletionWorkflow>(
                &entry_deletion_workflow_id(&input.entry_id),
                input,
                WorkflowOptions::with_execution_timeout(DELETION_EXECUTION_TIMEOUT),
            )
            .await
    }

    pub async fn cancel_entry_deletion(&self, entry_id: &str, cancel: &CancelDeletion) -> Result<bool, WorkflowError> {
        self.engine
            .signal(&entry_deletion_workflow_id(entry_id), CANCEL_DELETION_SIGNAL, cancel)
            .await
    }

    // ── VSYNC ────────────────────────────────────────────────────────────────

    /// Start a reconciliation keyed by today's date.
    pub async fn start_vsync(&self, input: &VSyncInput) -> Result<WorkflowHandle<VSyncResult>, WorkflowError> {
        let today = self.engine.clock().now().date();
        self.engine
            .start::<VSyncWorkflow>(
                &vsync_workflow_id(today),
                input,
                WorkflowOptions::with_execution_timeout(VSYNC_EXECUTION_TIMEOUT),
            )
            .await
    }

    pub async fn start_scheduler(
        &self,
        input: &VSyncSchedulerInput,
    ) -> Result<WorkflowHandle<()>, WorkflowError> {
        self.engine
            .start::<VSyncSchedulerWorkflow>(VSYNC_SCHEDULER_WORKFLOW_ID, input, WorkflowOptions::default())
            .await
    }
}
