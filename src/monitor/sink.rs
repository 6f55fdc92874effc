//! Telemetry sinks for process reports.
//!
//! # Responsibilities
//! - Deliver each tick's `ProcessReport` somewhere: logs, an in-process
//!   aggregator, or a remote aggregator over HTTP
//!
//! # Design Decisions
//! - Reports are pushed; no sink ever reads breaker state itself
//! - A failing sink is logged by the monitor and never stops the loop

use futures_util::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::monitor::types::ProcessReport;
use crate::resilience::circuit_breaker::CircuitState;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink channel closed")]
    Closed,

    #[error("http push failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("aggregator rejected report with status {0}")]
    Rejected(u16),
}

/// Destination for process reports.
pub trait TelemetrySink: Send + Sync {
    fn name(&self) -> &str;

    fn publish<'a>(&'a self, report: &'a ProcessReport) -> BoxFuture<'a, Result<(), SinkError>>;
}

/// Writes a one-line summary per report through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn publish<'a>(&'a self, report: &'a ProcessReport) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let snapshot = &report.snapshot;
            tracing::info!(
                instance_id = %report.instance_id,
                sequence = report.sequence,
                breakers = snapshot.breakers.len(),
                open = snapshot.count_in(CircuitState::Open),
                half_open = snapshot.count_in(CircuitState::HalfOpen),
                "Breaker status snapshot"
            );
            Ok(())
        })
    }
}

/// Forwards reports over an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ProcessReport>,
}

impl ChannelSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProcessReport>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl TelemetrySink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    fn publish<'a>(&'a self, report: &'a ProcessReport) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.tx
                .send(report.clone())
                .await
                .map_err(|_| SinkError::Closed)
        })
    }
}

/// POSTs reports as JSON to a remote aggregator.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TelemetrySink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    fn publish<'a>(&'a self, report: &'a ProcessReport) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let mut request = self.client.post(&self.url).json(report);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(SinkError::Rejected(status.as_u16()));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::StatusSnapshot;
    use uuid::Uuid;

    fn report() -> ProcessReport {
        ProcessReport {
            instance_id: Uuid::new_v4(),
            instance_name: Some("worker-1".into()),
            sequence: 3,
            snapshot: StatusSnapshot::default(),
        }
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelSink::channel(4);
        let r = report();
        sink.publish(&r).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), r);
    }

    #[tokio::test]
    async fn test_channel_sink_closed() {
        let (sink, rx) = ChannelSink::channel(1);
        drop(rx);
        assert!(matches!(sink.publish(&report()).await, Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn test_log_sink_never_fails() {
        assert!(LogSink.publish(&report()).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_sink_unreachable() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let sink = HttpSink::new("http://127.0.0.1:9/v1/reports", None, Duration::from_millis(500)).unwrap();
        assert!(sink.publish(&report()).await.is_err());
    }
}
