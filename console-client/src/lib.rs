//! Console-side reconciliation for the dispatch sync service.
//!
//! A console subscribes to the topics it renders, fetches one snapshot per
//! topic, and then keeps its view consistent by merging the live delta
//! stream. Reconnects are repaired by a fresh snapshot, never by replay.

pub mod reconciler;
pub mod transport;
pub mod view;

pub use reconciler::{Snapshot, TopicReconciler};
pub use transport::{
    ClientConfig, ConnectionState, HttpSnapshotSource, SnapshotSource, SyncClient, TransportError,
};
pub use view::{ChatLog, EntityList, View};
