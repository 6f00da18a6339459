//! Issues individual HTTP requests against the target and classifies results.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::{Body, StatusCode};
use tokio_util::io::ReaderStream;

use crate::workload::{OpKind, Operation, Payload};

/// Failure modes of a single request.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    /// Connection, DNS, or timeout failure before a full response was
    /// obtained.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// A well-formed response with a non-success status.
    #[error("{}", .0.as_u16())]
    Status(StatusCode),
}

/// The recorded result of attempting one operation.
#[derive(Debug)]
pub struct Outcome {
    /// Name of the workload the operation belonged to.
    pub workload: Arc<str>,
    /// The kind of operation.
    pub kind: OpKind,
    /// Index of the worker that issued the request.
    pub worker: usize,
    /// Wall-clock time from dispatch to response-body closure or error.
    pub duration: Duration,
    /// Payload bytes transferred. Zero for failures and list operations.
    pub bytes: u64,
    /// The failure, if the request did not succeed.
    pub error: Option<IssueError>,
}

impl Outcome {
    /// Whether the request completed with a success status.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Sends one HTTP request per [`Operation`] against the configured target.
///
/// The issuer is stateless and shared by all workers; it never retries, so a
/// failed outcome is final for that operation instance. The per-request
/// timeout is configured on the underlying client and is independent of the
/// run's global time budget.
#[derive(Debug, Clone)]
pub struct Issuer {
    client: reqwest::Client,
    base_url: Arc<str>,
}

impl Issuer {
    /// Creates an issuer for the given base URL.
    ///
    /// `request_timeout` bounds every request from dispatch to the end of
    /// the response body.
    pub fn new(base_url: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').into(),
        })
    }

    /// Performs the operation and records its outcome.
    ///
    /// The measured duration spans from dispatch until the response body is
    /// fully consumed, or until a definite transport error. A non-2xx status
    /// is a failure outcome carrying the status code, not a transport error.
    pub async fn issue(&self, op: Operation) -> Outcome {
        let Operation {
            kind,
            bucket,
            key,
            payload,
            workload,
            worker,
        } = op;

        let start = Instant::now();
        let result = self.dispatch(kind, &bucket, &key, payload).await;
        let duration = start.elapsed();

        let (bytes, error) = match result {
            Ok(bytes) => (bytes, None),
            Err(err) => (0, Some(err)),
        };

        Outcome {
            workload,
            kind,
            worker,
            duration,
            bytes,
            error,
        }
    }

    async fn dispatch(
        &self,
        kind: OpKind,
        bucket: &str,
        key: &str,
        payload: Option<Payload>,
    ) -> Result<u64, IssueError> {
        let response = match kind {
            OpKind::Write => {
                // A write without a payload uploads an empty object.
                let payload = payload.unwrap_or_else(|| Payload::new(0, 0));
                let len = payload.len;
                let body = Body::wrap_stream(ReaderStream::new(payload));

                let response = self
                    .client
                    .put(format!("{}/{bucket}/{key}", self.base_url))
                    .body(body)
                    .send()
                    .await?;
                return Self::check(response).await.map(|_| len);
            }
            OpKind::Read => {
                self.client
                    .get(format!("{}/{bucket}/{key}", self.base_url))
                    .send()
                    .await?
            }
            OpKind::List => {
                self.client
                    .get(format!("{}/{bucket}", self.base_url))
                    .send()
                    .await?
            }
        };

        let bytes = Self::check(response).await?;
        Ok(match kind {
            OpKind::Read => bytes,
            _ => 0,
        })
    }

    /// Classifies the response status and drains the body.
    ///
    /// The body is consumed to completion so the recorded duration covers
    /// the full transfer, not just the response headers.
    async fn check(response: reqwest::Response) -> Result<u64, IssueError> {
        let status = response.status();
        if !status.is_success() {
            return Err(IssueError::Status(status));
        }

        let mut body = response.bytes_stream();
        let mut total = 0u64;
        while let Some(chunk) = body.next().await {
            total += chunk?.len() as u64;
        }

        Ok(total)
    }

    /// Probes the target's health endpoint.
    ///
    /// Used to verify the target is reachable before starting a run.
    pub async fn health(&self) -> anyhow::Result<()> {
        let url = format!("{}/health", self.base_url);
        tracing::debug!("sending healthcheck request to {url}");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("bad status: {}", response.status());
        }

        Ok(())
    }
}
