use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dict_durable::{Workflow, WorkflowContext, WorkflowError, WorkflowOptions};

use super::{VSyncInput, VSyncWorkflow, VSYNC_EXECUTION_TIMEOUT};
use crate::ids::vsync_workflow_id;

/// Gap between scheduled runs, and the look-back window of each.
pub const SCHEDULER_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VSyncSchedulerInput {
    #[serde(default)]
    pub participant_ispb: Option<String>,
}

/// Runs an incremental VSYNC once a day, forever.
///
/// Each run covers one day and then continues as new, so history stays
/// bounded no matter how long the scheduler lives.
pub struct VSyncSchedulerWorkflow;

#[async_trait]
impl Workflow for VSyncSchedulerWorkflow {
    const NAME: &'static str = "VSyncSchedulerWorkflow";
    type Input = VSyncSchedulerInput;
    type Output = ();

    async fn run(&self, ctx: WorkflowContext, input: VSyncSchedulerInput) -> Result<(), WorkflowError> {
        let now = ctx.now().await?;
        let child_id = vsync_workflow_id(now.date());
        let child_input = VSyncInput {
            participant_ispb: input.participant_ispb.clone(),
            sync_type: "INCREMENTAL".to_string(),
            last_sync_date: Some(now - SCHEDULER_INTERVAL),
        };

        match ctx
            .execute_child::<VSyncWorkflow>(
                &child_id,
                &child_input,
                WorkflowOptions::with_execution_timeout(VSYNC_EXECUTION_TIMEOUT),
            )
            .await
        {
            Ok(result) => tracing::info!(
                %child_id,
                status = %result.status,
                discrepancies = result.counts.discrepancies,
                "scheduled vsync finished"
            ),
            Err(WorkflowError::Shutdown) => return Err(WorkflowError::Shutdown),
            Err(err) => tracing::warn!(%child_id, error = %err, "scheduled vsync failed; will retry tomorrow"),
        }

        ctx.sleep(SCHEDULER_INTERVAL).await?;
        Err(ctx.continue_as_new(&input))
    }
}
