//! Client for the Supabase Realtime change feed (Phoenix channel protocol
//! over a websocket). Only row-insert subscriptions are supported.

use std::time::Duration;

use anyhow::{Result, anyhow};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const JOIN_REF: &str = "1";
const EVENT_BUFFER: usize = 256;

/// One Phoenix protocol frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl RealtimeFrame {
    pub fn join(topic: &str, table: &str, filter: &str, access_token: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [{
                        "event": "INSERT",
                        "schema": "public",
                        "table": table,
                        "filter": filter,
                    }]
                },
                "access_token": access_token,
            }),
            reference: Some(JOIN_REF.to_string()),
        }
    }

    pub fn leave(topic: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    /// `Some(Ok)` / `Some(Err(reason))` when this frame answers our join.
    pub fn join_reply(&self) -> Option<std::result::Result<(), String>> {
        if self.event != "phx_reply" || self.reference.as_deref() != Some(JOIN_REF) {
            return None;
        }

        match self.payload.get("status").and_then(Value::as_str) {
            Some("ok") => Some(Ok(())),
            _ => Some(Err(self
                .payload
                .get("response")
                .map(Value::to_string)
                .unwrap_or_else(|| "join rejected".to_string()))),
        }
    }

    /// The inserted row carried by a `postgres_changes` INSERT event.
    pub fn inserted_record(&self) -> Option<Value> {
        if self.event != "postgres_changes" {
            return None;
        }

        let data = self.payload.get("data")?;
        let change_type = data
            .get("type")
            .or_else(|| data.get("eventType"))
            .and_then(Value::as_str)?;

        if change_type != "INSERT" {
            return None;
        }

        data.get("record").or_else(|| data.get("new")).cloned()
    }

    pub fn closes_channel(&self) -> bool {
        matches!(self.event.as_str(), "phx_error" | "phx_close")
    }
}

pub struct RealtimeClient {
    endpoint: String,
    api_key: String,
}

impl RealtimeClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            endpoint: config.realtime_url(),
            api_key: config.supabase_anon_key.clone(),
        }
    }

    fn socket_url(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint)?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.api_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }

    /// Open a standing subscription to rows inserted into `table` matching
    /// the PostgREST-style `filter` (e.g. `conversation_id=eq.42`).
    ///
    /// Resolves once the server has acknowledged the join.
    pub async fn subscribe_inserts(
        &self,
        topic: &str,
        table: &str,
        filter: &str,
        access_token: &str,
    ) -> Result<RealtimeSubscription> {
        let url = self.socket_url()?;
        debug!("Connecting to realtime endpoint {}", self.endpoint);

        let (socket, _) = connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();

        let topic = format!("realtime:{}", topic);
        let join = RealtimeFrame::join(&topic, table, filter, access_token);
        sink.send(WsMessage::Text(serde_json::to_string(&join)?)).await?;

        // Wait for the join acknowledgement before handing out the handle.
        loop {
            let frame = match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => serde_json::from_str::<RealtimeFrame>(&text)?,
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(anyhow!("realtime socket closed before join was acknowledged"));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };

            match frame.join_reply() {
                Some(Ok(())) => break,
                Some(Err(reason)) => return Err(anyhow!("realtime join rejected: {}", reason)),
                None => continue,
            }
        }

        info!("Realtime subscription established on {}", topic);

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task_topic = topic.clone();

        let task = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;
            let mut next_ref: u64 = 2;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let leave = RealtimeFrame::leave(&task_topic, next_ref);
                        if let Ok(text) = serde_json::to_string(&leave) {
                            let _ = sink.send(WsMessage::Text(text)).await;
                        }
                        let _ = sink.close().await;
                        debug!("Left realtime topic {}", task_topic);
                        break;
                    }
                    _ = heartbeat.tick() => {
                        let frame = RealtimeFrame::heartbeat(next_ref);
                        next_ref += 1;
                        let Ok(text) = serde_json::to_string(&frame) else { continue };
                        if let Err(e) = sink.send(WsMessage::Text(text)).await {
                            warn!("Realtime heartbeat failed on {}: {}", task_topic, e);
                            break;
                        }
                    }
                    incoming = stream.next() => {
                        let text = match incoming {
                            Some(Ok(WsMessage::Text(text))) => text,
                            Some(Ok(WsMessage::Close(_))) | None => {
                                warn!("Realtime socket closed for {}", task_topic);
                                break;
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                error!("Realtime socket error on {}: {}", task_topic, e);
                                break;
                            }
                        };

                        let frame = match serde_json::from_str::<RealtimeFrame>(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                debug!("Ignoring unparsable realtime frame: {}", e);
                                continue;
                            }
                        };

                        if frame.topic == task_topic && frame.closes_channel() {
                            warn!("Realtime channel {} closed by server", task_topic);
                            break;
                        }

                        if let Some(record) = frame.inserted_record() {
                            if events_tx.send(record).await.is_err() {
                                // Receiver gone: nobody is listening any more.
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(RealtimeSubscription {
            topic,
            events: events_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

/// Handle to a live insert subscription. Dropping it leaves the channel
/// and closes the socket.
pub struct RealtimeSubscription {
    topic: String,
    events: mpsc::Receiver<Value>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeSubscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next inserted row, or `None` once the feed has ended.
    pub async fn next_record(&mut self) -> Option<Value> {
        self.events.recv().await
    }

    /// Leave the channel and wait for the socket task to finish.
    pub async fn unsubscribe(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
