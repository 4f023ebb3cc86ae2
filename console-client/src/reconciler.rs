use serde_json::Value;
use shared::{ChatMessage, Delta, Topic};
use tracing::debug;

use crate::view::View;

/// Point-in-time read of a topic, fetched once per (re)subscribe.
#[derive(Debug)]
pub enum Snapshot {
    Orders(Vec<Value>),
    Specialists(Vec<Value>),
    /// Specialist detail: the row itself plus its order history.
    Feed {
        specialist: Value,
        orders: Vec<Value>,
    },
    Chat(Vec<ChatMessage>),
    /// Topics without a history read path start empty.
    Empty,
}

#[derive(Debug)]
enum Phase {
    /// Snapshot fetch in flight; deltas are queued for replay.
    Buffering(Vec<Delta>),
    Live,
}

/// Per-topic sequencer reconciling the snapshot with the live stream.
///
/// Subscribing happens before the snapshot fetch, so a delta can arrive
/// while the fetch is in flight; buffering it and replaying after the
/// snapshot lands closes the lost-update window between the two. Replayed
/// deltas may predate the snapshot, which is harmless: merges are
/// idempotent and field-wise.
#[derive(Debug)]
pub struct TopicReconciler {
    topic: Topic,
    phase: Phase,
    view: View,
}

impl TopicReconciler {
    pub fn new(topic: Topic) -> Self {
        TopicReconciler {
            topic,
            phase: Phase::Buffering(Vec::new()),
            view: View::new(),
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_live(&self) -> bool {
        matches!(self.phase, Phase::Live)
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn apply(&mut self, delta: Delta) {
        if delta.topic != self.topic {
            debug!("delta for {} handed to the {} reconciler", delta.topic, self.topic);
            return;
        }
        match &mut self.phase {
            Phase::Buffering(pending) => pending.push(delta),
            Phase::Live => self.view.apply(&delta),
        }
    }

    /// Installs the snapshot as the local view and replays every buffered
    /// delta in arrival order.
    pub fn snapshot_loaded(&mut self, snapshot: Snapshot) {
        let mut view = View::new();
        match snapshot {
            Snapshot::Orders(rows) => view.orders_mut().load(rows),
            Snapshot::Specialists(rows) => view.specialists_mut().load(rows),
            Snapshot::Feed { specialist, orders } => {
                view.specialists_mut().load(vec![specialist]);
                view.orders_mut().load(orders);
            }
            Snapshot::Chat(messages) => view.chat_mut().load(messages),
            Snapshot::Empty => {}
        }

        let pending = match std::mem::replace(&mut self.phase, Phase::Live) {
            Phase::Buffering(pending) => pending,
            Phase::Live => Vec::new(),
        };
        for delta in pending {
            view.apply(&delta);
        }
        self.view = view;
    }

    /// Discards the view and returns to buffering. Called when the
    /// connection is re-established: the fresh snapshot is the sole
    /// recovery mechanism after missed deltas.
    pub fn reset(&mut self) {
        self.phase = Phase::Buffering(Vec::new());
        self.view = View::new();
    }
}
