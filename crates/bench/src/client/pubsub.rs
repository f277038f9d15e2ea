//! WebSocket log subscriptions (`logsSubscribe`).
//!
//! The pubsub client hands out streams that borrow it, so each subscription
//! runs on its own forwarder task that owns the client and relays
//! notifications through a channel. Unsubscribing signals the task, which
//! cancels the subscription on the node and closes the socket.

use crate::transport::{LogEvent, LogStream, LogSubscriber, TransportError};
use async_trait::async_trait;
use futures::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type EventSender = mpsc::UnboundedSender<Result<LogEvent, TransportError>>;

/// Opens log subscriptions against a node's pubsub endpoint.
pub struct LogsPubsub {
    url: String,
}

impl LogsPubsub {
    /// Create a client for a `ws://` or `wss://` endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LogSubscriber for LogsPubsub {
    type Stream = PubsubLogStream;

    async fn subscribe_mentions(
        &self,
        account: &Pubkey,
        commitment: CommitmentConfig,
    ) -> Result<Self::Stream, TransportError> {
        let client = PubsubClient::new(&self.url).await?;
        debug!(url = %self.url, "WebSocket connected");

        let filter = RpcTransactionLogsFilter::Mentions(vec![account.to_string()]);
        let config = RpcTransactionLogsConfig {
            commitment: Some(commitment),
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(forward_logs(
            client, filter, config, events_tx, ready_tx, stop_rx,
        ));

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(TransportError::Closed),
        }

        debug!(%account, "Log subscription active");
        Ok(PubsubLogStream {
            events: events_rx,
            stop: Some(stop_tx),
            task: Some(task),
        })
    }
}

/// Owns the pubsub client for the lifetime of one subscription.
///
/// Runs until `stop` fires (or its sender is dropped), the node closes the
/// subscription, or the receiving side goes away.
async fn forward_logs(
    client: PubsubClient,
    filter: RpcTransactionLogsFilter,
    config: RpcTransactionLogsConfig,
    events: EventSender,
    ready: oneshot::Sender<Result<(), TransportError>>,
    mut stop: oneshot::Receiver<()>,
) {
    let (mut notifications, unsubscribe) = match client.logs_subscribe(filter, config).await {
        Ok(subscription) => subscription,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        unsubscribe().await;
        return;
    }

    loop {
        tokio::select! {
            _ = &mut stop => break,
            notification = notifications.next() => match notification {
                Some(response) => {
                    if events.send(LogEvent::try_from(response)).is_err() {
                        break;
                    }
                }
                None => {
                    debug!("Node closed the log subscription");
                    break;
                }
            },
        }
    }

    drop(notifications);
    unsubscribe().await;
    if let Err(e) = client.shutdown().await {
        warn!(error = %e, "Failed to close WebSocket cleanly");
    }
}

/// An active `logsSubscribe` subscription.
pub struct PubsubLogStream {
    events: mpsc::UnboundedReceiver<Result<LogEvent, TransportError>>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl LogStream for PubsubLogStream {
    async fn next_event(&mut self) -> Option<Result<LogEvent, TransportError>> {
        self.events.recv().await
    }

    async fn unsubscribe(&mut self) -> Result<(), TransportError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.events.close();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Log forwarder task failed");
            }
        }
        Ok(())
    }
}
