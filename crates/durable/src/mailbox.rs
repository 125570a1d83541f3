use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use tokio::sync::watch;

use dict_history::SignalRecord;

/// Per-run signal inbox.
///
/// Holds every persisted signal not yet consumed by a selector, ordered by
/// arrival id. Each new delivery bumps a version so a waiting selector wakes
/// up. A signal id is accepted once; later deliveries of the same id are
/// dropped, even after it has been consumed.
#[derive(Debug)]
pub(crate) struct Mailbox {
    inbox: Mutex<Inbox>,
    version: watch::Sender<u64>,
}

#[derive(Debug, Default)]
struct Inbox {
    pending: BTreeMap<u64, SignalRecord>,
    seen: BTreeSet<u64>,
}

impl Mailbox {
    pub(crate) fn new(signals: Vec<SignalRecord>) -> Self {
        let mut inbox = Inbox::default();
        for signal in signals {
            inbox.seen.insert(signal.signal_id);
            inbox.pending.insert(signal.signal_id, signal);
        }
        let (version, _) = watch::channel(0);
        Self {
            inbox: Mutex::new(inbox),
            version,
        }
    }

    /// Add `signal` unless its id was already delivered. Returns whether it
    /// was new.
    pub(crate) fn deliver(&self, signal: SignalRecord) -> bool {
        let fresh = match self.inbox.lock() {
            Ok(mut inbox) => {
                let fresh = inbox.seen.insert(signal.signal_id);
                if fresh {
                    inbox.pending.insert(signal.signal_id, signal);
                }
                fresh
            }
            Err(_) => false,
        };
        if fresh {
            self.version.send_modify(|v| *v += 1);
        }
        fresh
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Earliest pending signal on any of `channels`.
    pub(crate) fn peek_first(&self, channels: &[String]) -> Option<SignalRecord> {
        let inbox = self.inbox.lock().ok()?;
        inbox
            .pending
            .values()
            .find(|s| channels.iter().any(|c| c == &s.name))
            .cloned()
    }

    pub(crate) fn consume(&self, signal_id: u64) -> Option<SignalRecord> {
        self.inbox.lock().ok()?.pending.remove(&signal_id)
    }
}
