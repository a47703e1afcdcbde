//! Job queue plumbing
//!
//! Job submission publishes [`JobMessage`]s through a [`JobPublisher`]. The
//! in-process [`ChannelPublisher`] feeds a consumer task that drives the
//! worker; external transports deliver the same message wrapped in a
//! [`PushEnvelope`] to `POST /worker`. Redelivery and dead-lettering belong to
//! the transport, so the consumer only logs the delivery decision.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use btr_common::config::FailurePolicy;
use btr_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::worker::{Delivery, JobProcessor};

/// One diff job: compare blob `a` with blob `b`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: String,
    pub a: String,
    pub b: String,
}

impl JobMessage {
    pub fn new(job_id: impl Into<String>, a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            a: a.into(),
            b: b.into(),
        }
    }

    /// Decode a message from its JSON payload
    pub fn from_payload(payload: &Value) -> Result<Self> {
        Ok(Self::deserialize(payload)?)
    }
}

/// Push-delivery envelope: `{"message": {"data": "<base64 JSON>"}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    /// Base64-encoded JSON job message
    pub data: String,
}

impl PushEnvelope {
    /// Wrap a job message for push delivery
    pub fn wrap(message: &JobMessage) -> Result<Self> {
        let json = serde_json::to_vec(message)?;
        Ok(Self {
            message: PushMessage {
                data: STANDARD.encode(json),
            },
        })
    }

    /// Decode the base64 payload into JSON (not yet a [`JobMessage`])
    pub fn payload(&self) -> Result<Value> {
        let bytes = STANDARD
            .decode(self.message.data.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("Envelope data is not base64: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Publish side of the job queue
#[async_trait]
pub trait JobPublisher: Send + Sync {
    async fn publish(&self, message: JobMessage) -> Result<()>;
}

/// Publisher backed by a bounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<JobMessage>,
}

/// Create an in-process queue with the given capacity
pub fn channel(capacity: usize) -> (ChannelPublisher, mpsc::Receiver<JobMessage>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ChannelPublisher { sender }, receiver)
}

#[async_trait]
impl JobPublisher for ChannelPublisher {
    async fn publish(&self, message: JobMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|e| Error::Internal(format!("Job queue closed, dropped job {}", e.0.job_id)))
    }
}

/// Spawn the consumer loop; it ends when every publisher is dropped
pub fn spawn_consumer(
    mut receiver: mpsc::Receiver<JobMessage>,
    processor: Arc<JobProcessor>,
    policy: FailurePolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Job consumer started");
        while let Some(message) = receiver.recv().await {
            let outcome = processor.process(&message).await;
            match outcome.delivery(policy) {
                Delivery::Ack => {}
                Delivery::Redeliver => {
                    // No retry in process; the in-memory channel cannot redeliver
                    warn!(
                        job_id = %message.job_id,
                        "Job failed and policy requests redelivery; in-process queue drops it"
                    );
                }
            }
        }
        info!("Job consumer stopped");
    })
}
