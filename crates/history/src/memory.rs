use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::HistoryError;
use crate::record::{HistoryEvent, RunOutcome, RunRecord, SignalRecord};
use crate::traits::HistoryStore;

/// In-process [`HistoryStore`].
///
/// Shared behind an `Arc`, it outlives any one engine, which is enough to
/// model a worker restart inside a single process.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    runs: HashMap<String, RunRecord>,
    /// Creation order of run ids, for `list_open_runs`.
    order: Vec<String>,
    by_workflow: HashMap<String, Vec<String>>,
    events: HashMap<String, BTreeMap<u64, HistoryEvent>>,
    signals: HashMap<String, Vec<SignalRecord>>,
    next_signal_id: u64,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, HistoryError> {
        self.state
            .lock()
            .map_err(|_| HistoryError::Backend("history state lock poisoned".to_string()))
    }
}

impl State {
    fn open_run(&self, run_id: &str) -> Result<&RunRecord, HistoryError> {
        let run = self
            .runs
            .get(run_id)
            .ok_or_else(|| HistoryError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        if !run.is_open() {
            return Err(HistoryError::RunClosed {
                run_id: run_id.to_string(),
            });
        }
        Ok(run)
    }

    fn ensure_run(&self, run_id: &str) -> Result<(), HistoryError> {
        if self.runs.contains_key(run_id) {
            Ok(())
        } else {
            Err(HistoryError::RunNotFound {
                run_id: run_id.to_string(),
            })
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn create_run(&self, run: RunRecord) -> Result<(), HistoryError> {
        let mut state = self.lock()?;
        if state.runs.contains_key(&run.run_id) {
            return Err(HistoryError::RunAlreadyExists { run_id: run.run_id });
        }
        let open = state
            .by_workflow
            .get(&run.workflow_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.runs.get(id))
            .find(|existing| existing.is_open());
        if let Some(existing) = open {
            return Err(HistoryError::WorkflowAlreadyOpen {
                workflow_id: run.workflow_id.clone(),
                run_id: existing.run_id.clone(),
            });
        }

        let run_id = run.run_id.clone();
        state
            .by_workflow
            .entry(run.workflow_id.clone())
            .or_default()
            .push(run_id.clone());
        state.order.push(run_id.clone());
        state.events.insert(run_id.clone(), BTreeMap::new());
        state.signals.insert(run_id.clone(), Vec::new());
        state.runs.insert(run_id, run);
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<RunRecord, HistoryError> {
        let state = self.lock()?;
        state
            .runs
            .get(run_id)
            .cloned()
            .ok_or_else(|| HistoryError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn latest_run(&self, workflow_id: &str) -> Result<RunRecord, HistoryError> {
        let state = self.lock()?;
        state
            .by_workflow
            .get(workflow_id)
            .and_then(|ids| ids.last())
            .and_then(|id| state.runs.get(id))
            .cloned()
            .ok_or_else(|| HistoryError::WorkflowNotFound {
                workflow_id: workflow_id.to_string(),
            })
    }

    async fn list_open_runs(&self) -> Result<Vec<RunRecord>, HistoryError> {
        let state = self.lock()?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.runs.get(id))
            .filter(|run| run.is_open())
            .cloned()
            .collect())
    }

    async fn close_run(&self, run_id: &str, outcome: RunOutcome) -> Result<(), HistoryError> {
        let mut state = self.lock()?;
        state.open_run(run_id)?;
        if let Some(run) = state.runs.get_mut(run_id) {
            run.status = outcome.status;
            run.result = outcome.result;
            run.error = outcome.error;
            run.closed_at = Some(outcome.closed_at);
        }
        Ok(())
    }

    async fn append_event(&self, run_id: &str, event: HistoryEvent) -> Result<(), HistoryError> {
        let mut state = self.lock()?;
        state.open_run(run_id)?;
        let events = state.events.entry(run_id.to_string()).or_default();
        let seq = event.seq();
        if events.contains_key(&seq) {
            return Err(HistoryError::SequenceConflict {
                run_id: run_id.to_string(),
                seq,
            });
        }
        events.insert(seq, event);
        Ok(())
    }

    async fn load_events(&self, run_id: &str) -> Result<Vec<HistoryEvent>, HistoryError> {
        let state = self.lock()?;
        state.ensure_run(run_id)?;
        Ok(state
            .events
            .get(run_id)
            .map(|events| events.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn append_signal(
        &self,
        run_id: &str,
        name: &str,
        payload: serde_json::Value,
        received_at: OffsetDateTime,
    ) -> Result<SignalRecord, HistoryError> {
        let mut state = self.lock()?;
        state.open_run(run_id)?;
        state.next_signal_id += 1;
        let record = SignalRecord {
            signal_id: state.next_signal_id,
            name: name.to_string(),
            payload,
            received_at,
        };
        state
            .signals
            .entry(run_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn load_signals(&self, run_id: &str) -> Result<Vec<SignalRecord>, HistoryError> {
        let state = self.lock()?;
        state.ensure_run(run_id)?;
        Ok(state.signals.get(run_id).cloned().unwrap_or_default())
    }
}
