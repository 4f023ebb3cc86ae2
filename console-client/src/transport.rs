use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use shared::{ChatMessage, Delta, Topic};
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::reconciler::{Snapshot, TopicReconciler};
use crate::view::View;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("snapshot request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("snapshot payload invalid: {0}")]
    Snapshot(String),
    #[error("connection closed by server")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
}

/// Read path for topic snapshots, separated from the socket so tests can
/// drive the client without a server.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, topic: Topic) -> Result<Snapshot, TransportError>;
}

/// Fetches snapshots from the service's REST surface.
pub struct HttpSnapshotSource {
    base: Url,
    client: reqwest::Client,
}

impl HttpSnapshotSource {
    pub fn new(base: Url) -> Self {
        HttpSnapshotSource {
            base,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, topic: Topic) -> Result<Snapshot, TransportError> {
        let Some(path) = snapshot_path(topic) else {
            return Ok(Snapshot::Empty);
        };
        let url = self
            .base
            .join(&path)
            .map_err(|err| TransportError::Snapshot(err.to_string()))?;
        let body: Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        snapshot_from_body(topic, body)
    }
}

/// Notification topics carry no history, so they have no read path.
fn snapshot_path(topic: Topic) -> Option<String> {
    match topic {
        Topic::Orders => Some("orders".into()),
        Topic::Specialists => Some("specialists".into()),
        Topic::SpecialistFeed(id) => Some(format!("specialists/{id}")),
        Topic::OrderChat(id) => Some(format!("chat/order/{id}")),
        Topic::SpecialistChat(id) => Some(format!("chat/specialist/{id}")),
        Topic::AdminNotifications => None,
    }
}

fn snapshot_from_body(topic: Topic, body: Value) -> Result<Snapshot, TransportError> {
    match topic {
        Topic::Orders => Ok(Snapshot::Orders(rows(body)?)),
        Topic::Specialists => Ok(Snapshot::Specialists(rows(body)?)),
        Topic::SpecialistFeed(_) => split_feed(body),
        Topic::OrderChat(_) | Topic::SpecialistChat(_) => {
            let messages: Vec<ChatMessage> = serde_json::from_value(body)
                .map_err(|err| TransportError::Snapshot(err.to_string()))?;
            Ok(Snapshot::Chat(messages))
        }
        Topic::AdminNotifications => Ok(Snapshot::Empty),
    }
}

fn rows(body: Value) -> Result<Vec<Value>, TransportError> {
    match body {
        Value::Array(rows) => Ok(rows),
        other => Err(TransportError::Snapshot(format!(
            "expected an array, got {other}"
        ))),
    }
}

/// The specialist detail response carries the row plus its order history in
/// one document; the feed view keeps them in separate lists.
fn split_feed(mut detail: Value) -> Result<Snapshot, TransportError> {
    let Some(map) = detail.as_object_mut() else {
        return Err(TransportError::Snapshot(
            "specialist detail is not an object".into(),
        ));
    };
    let orders = match map.remove("orders") {
        Some(Value::Array(rows)) => rows,
        _ => Vec::new(),
    };
    map.remove("activeOrder");
    Ok(Snapshot::Feed {
        specialist: detail,
        orders,
    })
}

fn subscribe_frame(topic: Topic) -> String {
    json!({ "action": "subscribe", "topic": topic }).to_string()
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ws_url: String,
    pub topics: Vec<Topic>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ClientConfig {
    pub fn new(ws_url: impl Into<String>, topics: Vec<Topic>) -> Self {
        ClientConfig {
            ws_url: ws_url.into(),
            topics,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Owns the socket, one reconciler per subscribed topic, and the
/// reconnect loop. Subscribe frames go out before any snapshot fetch
/// starts, so every delta from that point on is either applied or
/// buffered; nothing can fall between snapshot and stream.
pub struct SyncClient<S: SnapshotSource> {
    config: ClientConfig,
    snapshots: Arc<S>,
    reconcilers: HashMap<Topic, TopicReconciler>,
    state: ConnectionState,
}

impl<S: SnapshotSource> SyncClient<S> {
    pub fn new(config: ClientConfig, snapshots: S) -> Self {
        let reconcilers = config
            .topics
            .iter()
            .map(|&topic| (topic, TopicReconciler::new(topic)))
            .collect();
        SyncClient {
            config,
            snapshots: Arc::new(snapshots),
            reconcilers,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn view(&self, topic: Topic) -> Option<&View> {
        self.reconcilers.get(&topic).map(TopicReconciler::view)
    }

    /// Runs until the server goes away, reconnecting with exponential
    /// backoff. Backoff resets once a connection gets as far as
    /// subscribing.
    pub async fn run(&mut self) {
        let mut backoff = self.config.initial_backoff;
        loop {
            let err = match self.run_once().await {
                Err(err) => err,
                Ok(()) => TransportError::Closed,
            };
            if self.state == ConnectionState::Subscribed {
                backoff = self.config.initial_backoff;
            }
            self.state = ConnectionState::Disconnected;
            warn!("connection lost ({err}), retrying in {backoff:?}");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
    }

    /// One connection lifetime: connect, subscribe, snapshot each topic
    /// while draining the stream, then apply deltas until the socket dies.
    pub async fn run_once(&mut self) -> Result<(), TransportError> {
        self.state = ConnectionState::Connecting;
        for reconciler in self.reconcilers.values_mut() {
            reconciler.reset();
        }

        let (mut socket, _) = connect_async(self.config.ws_url.as_str()).await?;
        for &topic in &self.config.topics {
            socket.send(Message::Text(subscribe_frame(topic))).await?;
        }
        self.state = ConnectionState::Subscribed;
        info!("subscribed to {} topics", self.config.topics.len());

        for topic in self.config.topics.clone() {
            let snapshots = self.snapshots.clone();
            let fetch = snapshots.fetch(topic);
            tokio::pin!(fetch);
            let snapshot = loop {
                tokio::select! {
                    snapshot = &mut fetch => break snapshot?,
                    frame = socket.next() => match frame {
                        Some(frame) => self.handle_frame(frame?),
                        None => return Err(TransportError::Closed),
                    },
                }
            };
            if let Some(reconciler) = self.reconcilers.get_mut(&topic) {
                reconciler.snapshot_loaded(snapshot);
                debug!("{topic} is live");
            }
        }

        while let Some(frame) = socket.next().await {
            self.handle_frame(frame?);
        }
        Err(TransportError::Closed)
    }

    fn handle_frame(&mut self, frame: Message) {
        match frame {
            Message::Text(text) => match serde_json::from_str::<Delta>(&text) {
                Ok(delta) => match self.reconcilers.get_mut(&delta.topic) {
                    Some(reconciler) => reconciler.apply(delta),
                    None => debug!("delta for unsubscribed topic {}", delta.topic),
                },
                // Server error frames are JSON too, just not deltas.
                Err(err) => debug!("ignoring non-delta frame: {err}"),
            },
            Message::Close(_) => debug!("close frame received"),
            _ => {}
        }
    }
}
