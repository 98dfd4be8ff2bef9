//! Control channel for out-of-process cache administration.
//!
//! Newline-delimited JSON over a unix domain socket. Each request maps 1:1
//! to a public operation on the object store / quota manager, so an
//! administrative tool can query statistics, pin or unpin objects, and
//! trigger a manual cleanup sweep without going through the filesystem
//! front end.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::digest::Digest;
use crate::quota::QuotaStats;
use crate::store::ObjectStore;

/// Requests understood by the control server.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CtrlRequest {
    /// Liveness check.
    Ping,
    /// Current quota ledger snapshot.
    Stats,
    /// Pin an object against eviction.
    Pin { digest: Digest },
    /// Release one pin on an object.
    Unpin { digest: Digest },
    /// Sweep the store down to `target_bytes`.
    Cleanup { target_bytes: u64 },
}

/// Responses produced by the control server.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CtrlResponse {
    Pong,
    Stats { data: QuotaStats },
    /// Operation completed; `freed_bytes` is set for cleanup requests.
    Done { freed_bytes: Option<u64> },
    Error { message: String },
}

/// Dispatches one request against the store.
pub async fn handle_request(request: CtrlRequest, store: &ObjectStore) -> CtrlResponse {
    match request {
        CtrlRequest::Ping => CtrlResponse::Pong,
        CtrlRequest::Stats => CtrlResponse::Stats {
            data: store.stats(),
        },
        CtrlRequest::Pin { digest } => {
            if store.pin(&digest) {
                CtrlResponse::Done { freed_bytes: None }
            } else {
                CtrlResponse::Error {
                    message: format!("object not cached: {digest}"),
                }
            }
        }
        CtrlRequest::Unpin { digest } => match store.unpin(&digest) {
            Ok(()) => CtrlResponse::Done { freed_bytes: None },
            Err(err) => CtrlResponse::Error {
                message: err.to_string(),
            },
        },
        CtrlRequest::Cleanup { target_bytes } => {
            let freed = store.cleanup(target_bytes).await;
            CtrlResponse::Done {
                freed_bytes: Some(freed),
            }
        }
    }
}

/// Listening side of the control channel.
///
/// Accepts connections until dropped; dropping aborts the accept loop and
/// removes the socket file.
pub struct ControlServer {
    socket_path: PathBuf,
    accept_task: JoinHandle<()>,
}

impl ControlServer {
    /// Binds the control socket and spawns the accept loop.
    ///
    /// A stale socket file from a previous run is removed first.
    pub fn bind(socket_path: &Path, store: Arc<ObjectStore>) -> Result<Self, std::io::Error> {
        let _ = std::fs::remove_file(socket_path);
        let listener = UnixListener::bind(socket_path)?;
        debug!(path = %socket_path.display(), "control channel listening");
        let accept_task = tokio::spawn(accept_loop(listener, store));
        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            accept_task,
        })
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn accept_loop(listener: UnixListener, store: Arc<ObjectStore>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let store = Arc::clone(&store);
                tokio::spawn(serve_connection(stream, store));
            }
            Err(err) => {
                // Accept errors tend to persist (e.g. the socket file was
                // unlinked); back off instead of spinning on the listener.
                warn!(%err, "control channel accept failed");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

/// Serves one connection until EOF. A malformed line yields an `Error`
/// response; it never tears down the connection.
async fn serve_connection(stream: UnixStream, store: Arc<ObjectStore>) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let response = match serde_json::from_str::<CtrlRequest>(&line) {
            Ok(request) => handle_request(request, &store).await,
            Err(err) => CtrlResponse::Error {
                message: format!("malformed request: {err}"),
            },
        };
        if write_response(&mut write, &response).await.is_err() {
            break;
        }
    }
}

async fn write_response(
    write: &mut OwnedWriteHalf,
    response: &CtrlResponse,
) -> Result<(), std::io::Error> {
    let mut payload = serde_json::to_string(response).map_err(std::io::Error::other)?;
    payload.push('\n');
    write.write_all(payload.as_bytes()).await
}

/// Failures on the client side of the control channel.
#[derive(Debug, Error)]
pub enum CtrlClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("server closed the connection")]
    Closed,

    #[error("server error: {0}")]
    Server(String),
}

/// Client half of the control channel, for administrative tools and tests.
pub struct ControlClient {
    read: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl ControlClient {
    /// Connects to a running control server.
    pub async fn connect(socket_path: &Path) -> Result<Self, CtrlClientError> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read, write) = stream.into_split();
        Ok(Self {
            read: BufReader::new(read).lines(),
            write,
        })
    }

    /// Sends one request and waits for its response.
    pub async fn request(&mut self, request: &CtrlRequest) -> Result<CtrlResponse, CtrlClientError> {
        let mut payload = serde_json::to_string(request)?;
        payload.push('\n');
        self.write.write_all(payload.as_bytes()).await?;
        let line = self
            .read
            .next_line()
            .await?
            .ok_or(CtrlClientError::Closed)?;
        Ok(serde_json::from_str(&line)?)
    }

    /// Liveness check.
    pub async fn ping(&mut self) -> Result<bool, CtrlClientError> {
        Ok(matches!(
            self.request(&CtrlRequest::Ping).await?,
            CtrlResponse::Pong
        ))
    }

    /// Fetches the quota ledger snapshot.
    pub async fn stats(&mut self) -> Result<QuotaStats, CtrlClientError> {
        match self.request(&CtrlRequest::Stats).await? {
            CtrlResponse::Stats { data } => Ok(data),
            CtrlResponse::Error { message } => Err(CtrlClientError::Server(message)),
            other => Err(CtrlClientError::Server(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    /// Pins an object against eviction.
    pub async fn pin(&mut self, digest: Digest) -> Result<(), CtrlClientError> {
        match self.request(&CtrlRequest::Pin { digest }).await? {
            CtrlResponse::Done { .. } => Ok(()),
            CtrlResponse::Error { message } => Err(CtrlClientError::Server(message)),
            other => Err(CtrlClientError::Server(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    /// Releases one pin on an object.
    pub async fn unpin(&mut self, digest: Digest) -> Result<(), CtrlClientError> {
        match self.request(&CtrlRequest::Unpin { digest }).await? {
            CtrlResponse::Done { .. } => Ok(()),
            CtrlResponse::Error { message } => Err(CtrlClientError::Server(message)),
            other => Err(CtrlClientError::Server(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    /// Sweeps the store down to `target_bytes`, returning bytes freed.
    pub async fn cleanup(&mut self, target_bytes: u64) -> Result<u64, CtrlClientError> {
        match self.request(&CtrlRequest::Cleanup { target_bytes }).await? {
            CtrlResponse::Done { freed_bytes } => Ok(freed_bytes.unwrap_or(0)),
            CtrlResponse::Error { message } => Err(CtrlClientError::Server(message)),
            other => Err(CtrlClientError::Server(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }
}
