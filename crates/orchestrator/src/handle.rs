//! Orchestrator side of a worker channel.

use std::ffi::OsStr;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::OrchestratorError;
use voluspa_common::{Message, MessageReader, MessageWriter, ScrapeError, ScrapeResult};

#[derive(Debug)]
pub enum WorkerEvent {
    Message(Message),
    /// The channel produced an error; the worker may still be alive.
    TransportError(String),
    /// The worker closed its side of the channel.
    Closed,
    /// The worker process exited. `None` when killed by a signal.
    Exited(Option<i32>),
}

/// Events from every worker, tagged with the worker index.
pub type EventSender = mpsc::UnboundedSender<(usize, WorkerEvent)>;

pub struct WorkerHandle {
    index: usize,
    outbound: mpsc::UnboundedSender<Message>,
}

impl WorkerHandle {
    /// Wrap an established channel. Inbound frames are forwarded to `events`.
    pub fn attach<R, W>(index: usize, reader: R, writer: W, events: EventSender) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let write_events = events.clone();
        tokio::spawn(async move {
            let mut writer = MessageWriter::new(writer);
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = writer.send(&message).await {
                    let _ = write_events.send((index, WorkerEvent::TransportError(e.to_string())));
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut reader = MessageReader::new(reader);
            loop {
                let event = match reader.next().await {
                    Ok(Some(message)) => WorkerEvent::Message(message),
                    Ok(None) => {
                        let _ = events.send((index, WorkerEvent::Closed));
                        break;
                    }
                    Err(e @ ScrapeError::Ipc(_)) => WorkerEvent::TransportError(e.to_string()),
                    Err(e) => {
                        let _ = events.send((index, WorkerEvent::TransportError(e.to_string())));
                        break;
                    }
                };
                if events.send((index, event)).is_err() {
                    break;
                }
            }
            debug!(worker = index, "worker reader stopped");
        });

        Self { index, outbound }
    }

    /// Start `program` as a child process speaking the line protocol on its
    /// stdin/stdout. The child is killed if the orchestrator goes away.
    pub fn spawn_process<I, S>(
        index: usize,
        program: impl AsRef<OsStr>,
        args: I,
        envs: &[(String, String)],
        events: EventSender,
    ) -> Result<Self, OrchestratorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let spawn_error = |reason: String| OrchestratorError::Spawn { index, reason };

        let mut child = Command::new(program)
            .args(args)
            .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout not captured".to_string()))?;

        let handle = Self::attach(index, stdout, stdin, events.clone());

        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(worker = index, error = %e, "failed to wait on worker");
                    None
                }
            };
            let _ = events.send((index, WorkerEvent::Exited(code)));
        });

        Ok(handle)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn send(&self, message: Message) -> ScrapeResult<()> {
        self.outbound
            .send(message)
            .map_err(|_| ScrapeError::Ipc(format!("worker {} channel closed", self.index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voluspa_common::Job;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (ours, theirs) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(ours);
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let handle = WorkerHandle::attach(7, read, write, events_tx);

        let (their_read, their_write) = tokio::io::split(theirs);
        let mut peer_reader = MessageReader::new(their_read);
        let mut peer_writer = MessageWriter::new(their_write);

        handle.send(Message::Members(vec![Job::new(1, 1)])).unwrap();
        assert_eq!(
            peer_reader.next().await.unwrap(),
            Some(Message::Members(vec![Job::new(1, 1)]))
        );

        peer_writer.send(&Message::Received { count: 1 }).await.unwrap();
        match events.recv().await.unwrap() {
            (7, WorkerEvent::Message(Message::Received { count: 1 })) => {}
            other => panic!("unexpected {other:?}"),
        }

        drop(peer_reader);
        drop(peer_writer);
        assert!(matches!(events.recv().await.unwrap(), (7, WorkerEvent::Closed)));
        assert_eq!(handle.index(), 7);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let (events_tx, _events) = mpsc::unbounded_channel();
        let result = WorkerHandle::spawn_process(
            0,
            "/nonexistent/voluspa-worker",
            ["worker"],
            &[],
            events_tx,
        );
        assert!(matches!(result, Err(OrchestratorError::Spawn { index: 0, .. })));
    }
}
