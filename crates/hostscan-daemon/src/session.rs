//! Per-connection protocol handling
//!
//! A session serves exactly one request: read the CIDR line, validate it,
//! acknowledge, run the scan, write the report and close. The scan runs in
//! its own task so a panic inside a probe is contained, and is aborted if
//! the client goes away before the report is ready.
//!
//! End of input from the client counts as going away. A client that
//! half-closes its write side after the request receives the acknowledgement
//! and then EOF, never the report; it must keep its side open until the
//! server closes.

use hostscan_core::report::{format_error, format_report, SCAN_STARTED};
use hostscan_core::{HostRecord, TargetRange};
use hostscan_discovery::ScanPipeline;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, trace};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("connection I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("scan task failed: {0}")]
    ScanFailed(#[from] JoinError),
}

/// Protocol states, in the order a successful session walks through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingRequest,
    Validating,
    Scanning,
    Streaming,
    Closed,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Client closed or timed out without sending anything
    NoRequest,
    /// Request failed validation; the error line was sent
    Rejected(String),
    /// Client went away while the scan was running
    Abandoned,
    /// Report sent
    Completed { hosts: usize },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum wait for the request after connecting
    pub request_timeout: Duration,
    /// Request bytes read; anything beyond is ignored
    pub max_request_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_request_bytes: 1024,
        }
    }
}

pub struct Session<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    pipeline: ScanPipeline,
    config: SessionConfig,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, pipeline: ScanPipeline, config: SessionConfig) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader,
            writer,
            pipeline,
            config,
            state: SessionState::Idle,
        }
    }

    /// Serve the connection to completion. The stream is shut down on
    /// every path that still has a writable connection.
    pub async fn run(mut self) -> Result<SessionOutcome, SessionError> {
        let result = self.serve().await;
        if !matches!(result, Ok(SessionOutcome::Abandoned)) {
            let _ = self.writer.shutdown().await;
        }
        self.transition(SessionState::Closed);
        result
    }

    async fn serve(&mut self) -> Result<SessionOutcome, SessionError> {
        self.transition(SessionState::AwaitingRequest);
        let Some(request) = self.read_request().await? else {
            return Ok(SessionOutcome::NoRequest);
        };

        self.transition(SessionState::Validating);
        info!(request = %request, "Request received");
        let range = match TargetRange::parse(&request) {
            Ok(range) => range,
            Err(e) => {
                let message = e.to_string();
                info!(request = %request, reason = %message, "Request rejected");
                self.writer.write_all(format_error(&message).as_bytes()).await?;
                return Ok(SessionOutcome::Rejected(message));
            }
        };

        self.writer.write_all(SCAN_STARTED.as_bytes()).await?;
        self.writer.flush().await?;

        self.transition(SessionState::Scanning);
        let Some(hosts) = self.scan(range).await? else {
            info!(range = %range, "Client disconnected, scan abandoned");
            return Ok(SessionOutcome::Abandoned);
        };

        self.transition(SessionState::Streaming);
        self.writer.write_all(format_report(&hosts).as_bytes()).await?;
        self.writer.flush().await?;
        Ok(SessionOutcome::Completed { hosts: hosts.len() })
    }

    /// First chunk from the client, cut at the first line break and trimmed.
    /// `None` if the client sent nothing before closing or timing out.
    async fn read_request(&mut self) -> Result<Option<String>, SessionError> {
        let mut buf = vec![0u8; self.config.max_request_bytes.max(1)];
        let read = tokio::time::timeout(self.config.request_timeout, self.reader.read(&mut buf)).await;

        let n = match read {
            Ok(result) => result?,
            Err(_) => {
                debug!("Timed out waiting for request");
                return Ok(None);
            }
        };
        if n == 0 {
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&buf[..n]);
        let line = text.split(['\r', '\n']).next().unwrap_or_default();
        Ok(Some(line.trim().to_string()))
    }

    /// Run the scan in its own task while watching the connection.
    /// `None` when the client closed first; dropping the task set aborts the scan.
    async fn scan(&mut self, range: TargetRange) -> Result<Option<Vec<HostRecord>>, SessionError> {
        let mut task = JoinSet::new();
        let pipeline = self.pipeline.clone();
        task.spawn(async move { pipeline.run(&range).await });

        tokio::select! {
            joined = task.join_next() => match joined {
                Some(result) => Ok(Some(result?)),
                None => Ok(Some(Vec::new())),
            },
            _ = wait_for_disconnect(&mut self.reader) => Ok(None),
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }
}

/// Resolve once the peer closes or the connection fails. Input after the
/// request is discarded.
async fn wait_for_disconnect<R: AsyncRead + Unpin>(reader: &mut R) {
    let mut scratch = [0u8; 256];
    loop {
        match reader.read(&mut scratch).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}
