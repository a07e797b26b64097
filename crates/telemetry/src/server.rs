//! HTTP responder for the live metrics body.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::render::render;
use voluspa_common::ProgressSnapshot;

/// Latest published snapshot. `None` before the first tick and after finalize.
pub type SnapshotReceiver = watch::Receiver<Option<ProgressSnapshot>>;

async fn metrics_handler(State(rx): State<SnapshotReceiver>) -> String {
    rx.borrow().as_ref().map(render).unwrap_or_default()
}

pub fn router(rx: SnapshotReceiver) -> Router {
    Router::new().fallback(metrics_handler).with_state(rx)
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))
}

/// Serve the metrics body on every path until the task is dropped.
pub async fn serve(listener: TcpListener, rx: SnapshotReceiver) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "metrics responder listening");
    }
    axum::serve(listener, router(rx))
        .await
        .context("metrics responder failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn get(addr: SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut buf = String::new();
        stream.read_to_string(&mut buf).await.unwrap();
        buf.split("\r\n\r\n").nth(1).unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn body_follows_published_snapshot() {
        let (tx, rx) = watch::channel(None);
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, rx));

        assert_eq!(get(addr).await, "");

        tx.send_replace(Some(ProgressSnapshot {
            completed: 1,
            total: 2,
            ..Default::default()
        }));
        assert!(get(addr).await.starts_with("voluspa_scraper_progress 50"));

        tx.send_replace(None);
        assert_eq!(get(addr).await, "");

        server.abort();
    }
}
