use serde::de::DeserializeOwned;
use time::OffsetDateTime;

use dict_history::{HistoryEvent, SelectChoice, SignalRecord};

use crate::context::{Timer, WorkflowContext};
use crate::error::WorkflowError;

/// A signal delivered to a workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub name: String,
    pub payload: serde_json::Value,
    pub received_at: OffsetDateTime,
}

impl Signal {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, WorkflowError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Decode the payload, falling back to `T::default()` when the sender's
    /// payload does not match.
    pub fn decode_or_default<T: DeserializeOwned + Default>(&self) -> T {
        match serde_json::from_value(self.payload.clone()) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(signal = %self.name, error = %e, "malformed signal payload; using defaults");
                T::default()
            }
        }
    }
}

impl From<SignalRecord> for Signal {
    fn from(record: SignalRecord) -> Self {
        Signal {
            name: record.name,
            payload: record.payload,
            received_at: record.received_at,
        }
    }
}

/// The branch a [`Selector`] resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Selected {
    Signal(Signal),
    Timer(Timer),
}

/// Races signal channels against timers.
///
/// Each `select` resolves exactly one ready branch: whichever became ready
/// first, comparing signal arrival time with timer fire time. A signal that
/// arrived at the same instant a timer fired wins. The choice is recorded.
pub struct Selector<'a> {
    ctx: &'a WorkflowContext,
    channels: Vec<String>,
    timers: Vec<Timer>,
}

impl<'a> Selector<'a> {
    pub(crate) fn new(ctx: &'a WorkflowContext) -> Self {
        Self {
            ctx,
            channels: Vec::new(),
            timers: Vec::new(),
        }
    }

    pub fn on_signal(mut self, channel: &str) -> Self {
        self.channels.push(channel.to_string());
        self
    }

    pub fn on_timer(mut self, timer: Timer) -> Self {
        self.timers.push(timer);
        self
    }

    pub async fn select(&self) -> Result<Selected, WorkflowError> {
        let (seq, recorded) = self.ctx.claim_select()?;
        match recorded {
            Some(HistoryEvent::SelectResolved { choice, .. }) => self.replay(seq, choice),
            Some(other) => Err(WorkflowContext::mismatch(seq, "select_resolved", &other)),
            None => self.resolve_live(seq).await,
        }
    }

    fn replay(&self, seq: u64, choice: SelectChoice) -> Result<Selected, WorkflowError> {
        let core = self.ctx.core();
        match choice {
            SelectChoice::Signal { channel, signal_id } => {
                if !self.channels.contains(&channel) {
                    return Err(WorkflowError::NonDeterminism {
                        seq,
                        expected: format!("select over {:?}", self.channels),
                        recorded: format!("signal on {channel}"),
                    });
                }
                core.mailbox
                    .consume(signal_id)
                    .map(|record| Selected::Signal(record.into()))
                    .ok_or_else(|| {
                        WorkflowError::History(format!(
                            "signal {signal_id} selected in history is missing from the signal log"
                        ))
                    })
            }
            SelectChoice::Timer { timer_seq } => self
                .timers
                .iter()
                .find(|t| t.seq == timer_seq)
                .map(|t| Selected::Timer(*t))
                .ok_or_else(|| WorkflowError::NonDeterminism {
                    seq,
                    expected: "select over the current timers".to_string(),
                    recorded: format!("timer {timer_seq}"),
                }),
        }
    }

    async fn resolve_live(&self, seq: u64) -> Result<Selected, WorkflowError> {
        let core = self.ctx.core();
        let clock = &core.engine.clock;
        loop {
            // Subscribe before looking so a delivery in between still wakes us.
            let mut deliveries = core.mailbox.subscribe();
            let now = clock.now();
            let signal = core.mailbox.peek_first(&self.channels);
            let due = self
                .timers
                .iter()
                .filter(|t| t.fire_at <= now)
                .min_by_key(|t| (t.fire_at, t.seq))
                .copied();

            let take_signal = match (&signal, &due) {
                (Some(s), Some(t)) => s.received_at <= t.fire_at,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => {
                    let next_fire = self.timers.iter().map(|t| t.fire_at).min();
                    tokio::select! {
                        _ = deliveries.changed() => {}
                        _ = sleep_until_opt(clock, next_fire) => {}
                    }
                    continue;
                }
            };

            if take_signal {
                if let Some(record) = signal.and_then(|s| core.mailbox.consume(s.signal_id)) {
                    self.ctx
                        .record_select(
                            seq,
                            SelectChoice::Signal {
                                channel: record.name.clone(),
                                signal_id: record.signal_id,
                            },
                        )
                        .await?;
                    return Ok(Selected::Signal(record.into()));
                }
                continue;
            }
            if let Some(timer) = due {
                self.ctx
                    .record_select(seq, SelectChoice::Timer { timer_seq: timer.seq })
                    .await?;
                return Ok(Selected::Timer(timer));
            }
        }
    }
}

async fn sleep_until_opt(clock: &crate::clock::Clock, deadline: Option<OffsetDateTime>) {
    match deadline {
        Some(deadline) => clock.sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
