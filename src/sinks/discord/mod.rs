//! `PresenceSink` implementation speaking Discord RPC over IPC.
//!
//! The connection is lazy: nothing is opened until the relay probes or
//! publishes, and any transport error drops the connection so the next
//! probe starts from a clean handshake.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;

use crate::configs::DiscordConfig;
use crate::protocol::{Activity, PlaybackSample};
use crate::common::types::now_ms;

use super::{PresenceSink, SinkError};

pub mod ipc;

use self::ipc::{IpcConnection, OP_CLOSE, OP_FRAME, OP_HANDSHAKE, OP_PING, OP_PONG};

/// Bound on any single RPC exchange so a wedged socket cannot stall the
/// relay tick indefinitely.
const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DiscordSink {
    config: DiscordConfig,
    session: Mutex<Option<IpcConnection>>,
}

impl DiscordSink {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    /// Opens the socket and performs the RPC handshake, expecting a
    /// READY dispatch back.
    async fn open_session(&self) -> Result<IpcConnection, SinkError> {
        let mut conn = IpcConnection::connect(self.config.pipe)
            .await
            .map_err(|e| SinkError::Unreachable(e.to_string()))?;

        conn.send(
            OP_HANDSHAKE,
            &json!({ "v": 1, "client_id": self.config.client_id }),
        )
        .await
        .map_err(|e| SinkError::Unreachable(e.to_string()))?;

        let (op, payload) = conn
            .recv()
            .await
            .map_err(|e| SinkError::Unreachable(e.to_string()))?;

        match op {
            OP_FRAME if payload["evt"] == "READY" => {
                debug!(
                    "discord rpc handshake complete (user: {})",
                    payload["data"]["user"]["username"]
                        .as_str()
                        .unwrap_or("unknown")
                );
                Ok(conn)
            }
            OP_CLOSE => Err(SinkError::Rejected(
                payload["message"].as_str().unwrap_or("handshake closed").to_string(),
            )),
            _ => Err(SinkError::Unreachable(format!(
                "unexpected handshake reply (op {op})"
            ))),
        }
    }

    /// Sends one frame and returns the matching response, answering any
    /// interleaved PINGs along the way. Drops the session on failure so
    /// the next probe reconnects.
    async fn call(
        &self,
        session: &mut Option<IpcConnection>,
        op: u32,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, SinkError> {
        if session.is_none() {
            *session = Some(self.open_session().await?);
        }
        let conn = session.as_mut().unwrap();

        let exchange = async {
            conn.send(op, &payload).await?;
            loop {
                let (reply_op, reply) = conn.recv().await?;
                match reply_op {
                    OP_PING => conn.send(OP_PONG, &reply).await?,
                    OP_CLOSE => {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            reply["message"].as_str().unwrap_or("connection closed").to_string(),
                        ));
                    }
                    _ => return Ok(reply),
                }
            }
        };

        let outcome = tokio::time::timeout(RPC_CALL_TIMEOUT, exchange).await;
        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                *session = None;
                Err(SinkError::Unreachable(e.to_string()))
            }
            Err(_) => {
                *session = None;
                Err(SinkError::Unreachable("rpc call timed out".to_string()))
            }
        }
    }

    async fn set_activity(&self, activity: Option<Activity>) -> Result<(), SinkError> {
        let mut session = self.session.lock().await;

        let payload = json!({
            "cmd": "SET_ACTIVITY",
            "args": {
                "pid": std::process::id(),
                "activity": activity,
            },
            "nonce": uuid::Uuid::new_v4().to_string(),
        });

        let reply = self.call(&mut session, OP_FRAME, payload).await?;
        if reply["evt"] == "ERROR" {
            return Err(SinkError::Rejected(
                reply["data"]["message"]
                    .as_str()
                    .unwrap_or("activity rejected")
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PresenceSink for DiscordSink {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn probe(&self) -> Result<(), SinkError> {
        let mut session = self.session.lock().await;

        if session.is_none() {
            *session = Some(self.open_session().await?);
            return Ok(());
        }

        // Session already open: a PING round-trip is the cheapest
        // liveness signal the protocol offers.
        let nonce = uuid::Uuid::new_v4().to_string();
        self.call(&mut session, OP_PING, json!({ "nonce": nonce }))
            .await?;
        Ok(())
    }

    async fn publish(&self, sample: &PlaybackSample) -> Result<(), SinkError> {
        self.set_activity(Some(Activity::from_sample(sample, now_ms())))
            .await
    }

    async fn clear(&self) -> Result<(), SinkError> {
        self.set_activity(None).await
    }
}
