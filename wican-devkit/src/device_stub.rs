/*!
Fake WiCAN devices for development without hardware

`FakeDevice` serves the data endpoint over real HTTP on 127.0.0.1 and plays a
script of replies, one per request; the last reply repeats once the script
runs out. `SilentDevice` accepts TCP connections and never answers, which is
what a wedged adapter looks like to the prober.
*/

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One scripted answer of the fake device
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16),
    Garbage(String),
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Reply::Json(value)
    }

    pub fn status(code: u16) -> Self {
        Reply::Status(code)
    }

    pub fn garbage(body: impl Into<String>) -> Self {
        Reply::Garbage(body.into())
    }
}

#[derive(Clone)]
struct DeviceState {
    script: Arc<Vec<Reply>>,
    hits: Arc<AtomicUsize>,
}

/// HTTP device answering from a script
pub struct FakeDevice {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl FakeDevice {
    /// Start serving `script` on `path` at an ephemeral loopback port
    pub async fn start(path: &str, script: Vec<Reply>) -> Result<Self> {
        let hits = Arc::new(AtomicUsize::new(0));
        let state = DeviceState {
            script: Arc::new(script),
            hits: hits.clone(),
        };

        let app = Router::new().route(path, get(serve)).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::warn!("[fake-device] server stopped: {}", e);
            }
        });

        log::info!("🛰️ [FAKE] WiCAN device listening on {}", addr);
        Ok(Self { addr, hits, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of requests answered on the data endpoint
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(State(state): State<DeviceState>) -> Response {
    let index = state.hits.fetch_add(1, Ordering::SeqCst);
    let reply = state
        .script
        .get(index)
        .or_else(|| state.script.last())
        .cloned()
        .unwrap_or(Reply::Status(404));

    match reply {
        Reply::Json(value) => Json(value).into_response(),
        Reply::Status(code) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        Reply::Garbage(body) => body.into_response(),
    }
}

/// TCP endpoint that accepts and then stays silent
pub struct SilentDevice {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl SilentDevice {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, peer)) = listener.accept().await {
                log::debug!("[silent-device] holding connection from {}", peer);
                held.push(stream);
            }
        });

        Ok(Self { addr, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for SilentDevice {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Wait until `device` has answered at least `count` requests
pub async fn wait_for_hits(device: &FakeDevice, count: usize, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if device.hits() >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    device.hits() >= count
}
