//! Worker side of the orchestrator channel.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::worker::Worker;
use voluspa_common::{Attempt, Message, MessageReader, MessageWriter, ScrapeError, ScrapeResult};

/// Read dispatches from `reader` until the orchestrator closes the channel,
/// writing handshakes, stats and results to `writer`.
pub async fn serve<R, W>(worker: Worker, reader: R, writer: W) -> ScrapeResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    tokio::spawn(async move {
        let mut writer = MessageWriter::new(writer);
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = writer.send(&message).await {
                error!(error = %e, "orchestrator channel write failed");
                break;
            }
        }
    });

    let queue = worker.start(outbound.clone());
    let mut reader = MessageReader::new(reader);

    loop {
        let message = match reader.next().await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(ScrapeError::Ipc(e)) => {
                warn!(error = %e, "skipping undecodable frame");
                continue;
            }
            Err(e) => return Err(e),
        };

        match message {
            Message::Members(jobs) => {
                let count = jobs.len();
                for job in jobs {
                    queue.enqueue(Attempt::first(job))?;
                }
                info!(count, "share received");
                outbound
                    .send(Message::Received { count })
                    .map_err(|_| ScrapeError::Ipc("outbound channel closed".to_string()))?;
            }
            other => debug!(tag = other.tag(), "ignoring message"),
        }
    }

    info!("orchestrator channel closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;
    use voluspa_common::{Job, Outcome, ProfileFetcher};
    use voluspa_storage::ErrorLog;

    struct NotFound;

    #[async_trait]
    impl ProfileFetcher for NotFound {
        async fn fetch_profile(&self, _job: &Job) -> ScrapeResult<String> {
            Ok(r#"{"ErrorCode":1601,"ErrorStatus":"DestinyAccountNotFound"}"#.to_string())
        }
    }

    #[tokio::test]
    async fn handshake_then_results() {
        let dir = tempfile::tempdir().unwrap();
        let worker = Worker::new(Arc::new(NotFound), None, ErrorLog::new(dir.path()), WorkerConfig::new());

        let (orch_side, worker_side) = tokio::io::duplex(4096);
        let (worker_read, worker_write) = tokio::io::split(worker_side);
        let server = tokio::spawn(serve(worker, worker_read, worker_write));

        let (orch_read, orch_write) = tokio::io::split(orch_side);
        let mut writer = MessageWriter::new(orch_write);
        let mut reader = MessageReader::new(orch_read);

        writer
            .send(&Message::Members(vec![Job::new(1, 1), Job::new(2, 2)]))
            .await
            .unwrap();

        assert_eq!(reader.next().await.unwrap(), Some(Message::Received { count: 2 }));

        let mut members = Vec::new();
        for _ in 0..2 {
            match reader.next().await.unwrap() {
                Some(Message::Results(result)) => {
                    assert!(matches!(result.outcome, Outcome::ApiError { code: 1601, .. }));
                    members.push(result.member.membership_id);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        members.sort_unstable();
        assert_eq!(members, vec![1, 2]);

        drop(reader);
        drop(writer);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_tags_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let worker = Worker::new(Arc::new(NotFound), None, ErrorLog::new(dir.path()), WorkerConfig::new());

        let (orch_side, worker_side) = tokio::io::duplex(4096);
        let (worker_read, worker_write) = tokio::io::split(worker_side);
        let server = tokio::spawn(serve(worker, worker_read, worker_write));

        let (_orch_read, mut orch_write) = tokio::io::split(orch_side);
        orch_write
            .write_all(b"{\"tag\":\"Shutdown\",\"payload\":null}\nnot json\n")
            .await
            .unwrap();
        orch_write.shutdown().await.unwrap();

        server.await.unwrap().unwrap();
    }
}
