//! Loopback notifier for test mode
//!
//! Stands in for the chain: every `ConfirmOrder` is answered with a
//! successful confirm callback and every `CancelOrder` with a successful
//! cancel callback. Answers travel through a channel to a settler task, so
//! they are applied after the command that triggered them has returned.

use async_trait::async_trait;
use shared::order::ChainResult;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ChainRequest, NotifyError, SettlementNotifier};
use crate::orders::OrderCoordinator;

/// Callback the loopback chain will deliver
#[derive(Debug, Clone, PartialEq)]
pub enum SyntheticCallback {
    Confirm(String),
    Cancel(String),
}

#[derive(Debug, Clone)]
pub struct LoopbackNotifier {
    tx: mpsc::UnboundedSender<SyntheticCallback>,
}

impl LoopbackNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyntheticCallback>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SettlementNotifier for LoopbackNotifier {
    async fn notify(&self, request: ChainRequest) -> Result<(), NotifyError> {
        let callback = match request {
            ChainRequest::ConfirmOrder { chain_id } => SyntheticCallback::Confirm(chain_id),
            ChainRequest::CancelOrder { chain_id } => SyntheticCallback::Cancel(chain_id),
            other => {
                tracing::debug!(
                    chain_id = %other.chain_id(),
                    action = other.action(),
                    "Loopback chain: nothing to answer"
                );
                return Ok(());
            }
        };
        self.tx
            .send(callback)
            .map_err(|_| NotifyError::ChannelClosed)
    }
}

/// Spawn the task that applies loopback callbacks to the coordinator
pub fn spawn_settler(
    mut rx: mpsc::UnboundedReceiver<SyntheticCallback>,
    coordinator: Arc<OrderCoordinator>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Loopback settler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                callback = rx.recv() => {
                    let Some(callback) = callback else { break };
                    let result = match &callback {
                        SyntheticCallback::Confirm(chain_id) => {
                            coordinator
                                .apply_confirm_from_chain(chain_id, ChainResult::Success)
                                .await
                        }
                        SyntheticCallback::Cancel(chain_id) => {
                            coordinator
                                .apply_cancel_from_chain(chain_id, ChainResult::Success)
                                .await
                        }
                    };
                    match result {
                        Ok(resp) => tracing::info!(
                            order_id = %resp.order_id,
                            status = %resp.status,
                            "Loopback settlement applied"
                        ),
                        Err(e) => tracing::error!(?callback, "Loopback settlement failed: {e}"),
                    }
                }
            }
        }
        tracing::info!("Loopback settler stopped");
    })
}
