//! HTTP chain notifier

use async_trait::async_trait;
use std::time::Duration;

use super::{ChainRequest, NotifyError, SettlementNotifier};

/// Upper bound for a single backoff sleep
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// POSTs each request as JSON to `{endpoint}/{action}`
#[derive(Debug, Clone)]
pub struct HttpChainNotifier {
    client: reqwest::Client,
    endpoint: String,
    max_attempts: u32,
    retry_base: Duration,
}

impl HttpChainNotifier {
    /// `timeout` bounds each attempt, not the whole retry sequence
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        max_attempts: u32,
        retry_base: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            max_attempts: max_attempts.max(1),
            retry_base,
        })
    }

    async fn send_once(&self, request: &ChainRequest) -> Result<(), NotifyError> {
        let url = format!("{}/{}", self.endpoint, request.action());
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout
                } else {
                    NotifyError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                action: request.action(),
                status: status.as_u16(),
            })
        }
    }
}

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_RETRY_DELAY)
}

#[async_trait]
impl SettlementNotifier for HttpChainNotifier {
    /// Send with exponential backoff retry
    async fn notify(&self, request: ChainRequest) -> Result<(), NotifyError> {
        let mut delay = self.retry_base;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.send_once(&request).await {
                Ok(()) => {
                    tracing::debug!(
                        chain_id = %request.chain_id(),
                        action = request.action(),
                        attempt,
                        "Chain notified"
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    tracing::warn!(
                        chain_id = %request.chain_id(),
                        action = request.action(),
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Chain notify failed, retrying: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let mut delay = Duration::from_millis(200);
        let mut seen = Vec::new();
        for _ in 0..7 {
            delay = next_delay(delay);
            seen.push(delay.as_millis());
        }
        assert_eq!(seen, vec![400, 800, 1600, 3200, 5000, 5000, 5000]);
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let notifier = HttpChainNotifier::new(
            "http://chain.local/api/",
            Duration::from_millis(100),
            0,
            Duration::from_millis(10),
        )
        .unwrap();
        assert_eq!(notifier.endpoint, "http://chain.local/api");
        assert_eq!(notifier.max_attempts, 1);
    }

    #[tokio::test]
    async fn test_unreachable_chain_gives_up_after_max_attempts() {
        // Port 9 (discard) on localhost refuses connections
        let notifier = HttpChainNotifier::new(
            "http://127.0.0.1:9",
            Duration::from_millis(200),
            2,
            Duration::from_millis(1),
        )
        .unwrap();
        let err = notifier
            .notify(ChainRequest::ConfirmOrder {
                chain_id: "c-1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotifyError::Transport(_) | NotifyError::Timeout
        ));
    }
}
