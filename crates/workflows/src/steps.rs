//! Step helpers shared by the workflows.

use serde::Serialize;
use serde_json::Value;

use dict_domain::EventMap;
use dict_durable::{ActivityProfile, WorkflowContext, WorkflowError};

use crate::activities::{PublishEvent, PublishEventActivity};

/// Absorb an InvalidTransition rejection from a status-change step.
///
/// Activities return `Ok` when the entity already sits at the step's
/// target, so `Ok(None)` here means it moved somewhere else first. Callers
/// reload the entity and report what is stored.
pub(crate) fn satisfied<T>(
    step: &str,
    result: Result<T, WorkflowError>,
) -> Result<Option<T>, WorkflowError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_invalid_transition() => {
            tracing::info!(step, error = %err, "step already satisfied");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Publish a completion event. Failure is logged and otherwise ignored.
pub(crate) async fn publish<P: Serialize>(
    ctx: &WorkflowContext,
    event_type: &str,
    partition_key: &str,
    payload: &P,
) -> Result<(), WorkflowError> {
    let mut event = match serde_json::to_value(payload)? {
        Value::Object(map) => map,
        other => {
            let mut map = EventMap::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    event.insert("event_type".to_string(), Value::String(event_type.to_string()));
    event.insert(
        "workflow_id".to_string(),
        Value::String(ctx.workflow_id().to_string()),
    );

    let input = PublishEvent {
        event,
        partition_key: partition_key.to_string(),
    };
    ctx.execute_non_critical::<PublishEventActivity>(&input, ActivityProfile::Messaging)
        .await?;
    Ok(())
}

/// Map a domain validation failure onto the workflow's input error.
pub(crate) fn invalid_input(err: impl std::fmt::Display) -> WorkflowError {
    WorkflowError::Validation(err.to_string())
}
