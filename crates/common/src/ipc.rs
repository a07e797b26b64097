//! Newline-delimited JSON framing for `Message` over any async byte stream.
//!
//! Used over child-process stdin/stdout in production and over
//! `tokio::io::duplex` pipes in tests.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

use crate::error::{ScrapeError, ScrapeResult};
use crate::message::Message;

pub struct MessageReader<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            lines: BufReader::new(inner).lines(),
        }
    }

    /// Next message, or `None` once the peer closes the stream.
    /// Blank lines are skipped.
    pub async fn next(&mut self) -> ScrapeResult<Option<Message>> {
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let message = Message::decode(line)
                .map_err(|e| ScrapeError::Ipc(format!("undecodable frame: {e}")))?;
            return Ok(Some(message));
        }
        Ok(None)
    }
}

pub struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, message: &Message) -> ScrapeResult<()> {
        let mut frame = serde_json::to_vec(message)?;
        frame.push(b'\n');
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Job;

    #[tokio::test]
    async fn frames_survive_a_pipe() {
        let (a, b) = tokio::io::duplex(1024);
        let mut writer = MessageWriter::new(a);
        let mut reader = MessageReader::new(b);

        writer
            .send(&Message::Members(vec![Job::new(1, 10), Job::new(3, 11)]))
            .await
            .unwrap();
        writer.send(&Message::StatsCollections(7)).await.unwrap();
        drop(writer);

        match reader.next().await.unwrap() {
            Some(Message::Members(jobs)) => assert_eq!(jobs.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            reader.next().await.unwrap(),
            Some(Message::StatsCollections(7))
        );
        assert_eq!(reader.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn garbage_line_is_ipc_error() {
        let (mut a, b) = tokio::io::duplex(64);
        a.write_all(b"{oops\n").await.unwrap();
        drop(a);
        let mut reader = MessageReader::new(b);
        assert!(matches!(reader.next().await, Err(ScrapeError::Ipc(_))));
    }
}
