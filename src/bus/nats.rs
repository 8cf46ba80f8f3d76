//! `BusClient` backed by `async-nats`.
//!
//! `async-nats`'s `Client` is adopted directly, wrapped behind the same
//! `BusClient` seam the in-memory double implements, preferring a thin
//! trait over the third-party client type rather than exposing it
//! directly to callers.

use std::time::Duration;

use async_nats::Client;
use futures::StreamExt;

use crate::actor::BoxFuture;
use crate::bus::{BusClient, BusMessage};
use crate::error::{CherryError, ErrorCode};

pub struct NatsBusClient {
    client: Client,
    reconnect_delay: Duration,
}

impl NatsBusClient {
    /// Connects to `address` (e.g. `nats://127.0.0.1:4222`).
    /// `reconnect_delay` only governs how discovery paces its own
    /// registration retries; the underlying client manages its own
    /// transport reconnects independently.
    pub async fn connect(address: &str, reconnect_delay: Duration) -> Result<Self, CherryError> {
        let client = async_nats::connect(address)
            .await
            .map_err(|e| CherryError::with_source(ErrorCode::BusUnavailable, e))?;
        Ok(Self { client, reconnect_delay })
    }
}

impl BusClient for NatsBusClient {
    fn publish<'a>(&'a self, subject: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<(), CherryError>> {
        Box::pin(async move {
            self.client
                .publish(subject.to_string(), payload.into())
                .await
                .map_err(|e| CherryError::with_source(ErrorCode::NetError, e))
        })
    }

    fn request<'a>(
        &'a self,
        subject: &'a str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<u8>, CherryError>> {
        Box::pin(async move {
            let attempt = self.client.request(subject.to_string(), payload.into());
            match tokio::time::timeout(timeout, attempt).await {
                Ok(Ok(message)) => Ok(message.payload.to_vec()),
                Ok(Err(e)) => Err(CherryError::with_source(ErrorCode::NetError, e)),
                Err(_) => Err(CherryError::new(ErrorCode::NetError)),
            }
        })
    }

    fn subscribe<'a>(&'a self, subject: &'a str) -> BoxFuture<'a, Result<tokio::sync::mpsc::Receiver<BusMessage>, CherryError>> {
        Box::pin(async move {
            let mut subscriber = self
                .client
                .subscribe(subject.to_string())
                .await
                .map_err(|e| CherryError::with_source(ErrorCode::BusUnavailable, e))?;

            let (tx, rx) = tokio::sync::mpsc::channel(256);
            tokio::spawn(async move {
                while let Some(message) = subscriber.next().await {
                    let reply_to = message.reply.map(|s| s.to_string());
                    let forwarded = BusMessage {
                        subject: message.subject.to_string(),
                        payload: message.payload.to_vec(),
                        reply_to,
                    };
                    if tx.send(forwarded).await.is_err() {
                        break;
                    }
                }
            });
            Ok(rx)
        })
    }

    fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.client.drain().await {
                log::warn!("nats bus client: error draining on shutdown: {e}");
            }
        })
    }
}
