//! Line-delimited JSON transport over TCP.
//!
//! Every connection is one client. Its lines go to the event loop as
//! [`Event::Message`]; the event loop answers through a per-connection
//! outbox that a writer task drains onto the socket. Lines longer than
//! `server.max_line_bytes` are skipped and answered without being buffered.

use std::io;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use crate::logging::{log_line, Direction};
use crate::manager::{Event, JobManager};
use crate::protocol::{ClientId, ServerMessage};
use crate::settings::Settings;

#[cfg(test)]
mod tests {
    use super::*;

    async fn frames(input: &[u8], limit: usize) -> Vec<Frame> {
        let mut reader = BufReader::new(input);
        let mut buf = Vec::new();
        let mut frames = Vec::new();
        loop {
            match next_frame(&mut reader, &mut buf, limit).await.unwrap() {
                Frame::Closed => return frames,
                frame => frames.push(frame),
            }
        }
    }

    #[tokio::test]
    async fn splits_lines_and_strips_terminators() {
        let frames = frames(b"{\"a\":1}\r\nsecond\nlast", 64).await;
        assert_eq!(
            frames,
            vec![
                Frame::Line("{\"a\":1}".to_string()),
                Frame::Line("second".to_string()),
                Frame::Line("last".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn oversized_line_is_skipped_whole() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\nok\n");
        input.extend_from_slice(&[b'y'; 9]);
        input.extend_from_slice(b"\n");
        assert_eq!(
            frames(&input, 8).await,
            vec![
                Frame::TooLarge,
                Frame::Line("ok".to_string()),
                Frame::TooLarge,
            ]
        );
    }

    #[tokio::test]
    async fn line_at_the_limit_is_kept() {
        assert_eq!(
            frames(b"12345678\n12345678", 8).await,
            vec![
                Frame::Line("12345678".to_string()),
                Frame::Line("12345678".to_string()),
            ]
        );
    }
}

/// One unit read from a client.
#[derive(Debug, PartialEq)]
enum Frame {
    Line(String),
    TooLarge,
    Closed,
}

/// Reads the next newline-terminated line, holding at most `limit + 1`
/// bytes. The rest of a longer line is discarded.
async fn next_frame<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let read = (&mut *reader).take(cap).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Frame::Closed);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > limit {
        loop {
            buf.clear();
            let skipped = (&mut *reader).take(cap).read_until(b'\n', buf).await?;
            if skipped == 0 || buf.last() == Some(&b'\n') {
                break;
            }
        }
        buf.clear();
        return Ok(Frame::TooLarge);
    }
    Ok(Frame::Line(String::from_utf8_lossy(buf).into_owned()))
}

/// Binds the configured address and serves until the listener fails.
pub async fn serve(settings: &Settings) -> Result<()> {
    let address = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!(%address, "listening");
    serve_on(listener, settings).await
}

/// Serves clients accepted from an already bound listener.
pub async fn serve_on(listener: TcpListener, settings: &Settings) -> Result<()> {
    let (events, receiver) = mpsc::unbounded_channel();
    let manager = JobManager::new(settings.job.clone(), &events);
    tokio::spawn(manager.run(receiver));

    let mut next_client: ClientId = 1;
    loop {
        let (stream, peer) = listener.accept().await.context("accepting connection")?;
        let client = next_client;
        next_client += 1;
        tokio::spawn(handle_connection(
            stream,
            peer,
            client,
            events.clone(),
            settings.server.max_line_bytes,
        ));
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    client: ClientId,
    events: UnboundedSender<Event>,
    max_line_bytes: usize,
) {
    let (reader, mut writer) = stream.into_split();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let replies = outbox.clone();

    if events
        .send(Event::Connected {
            client,
            peer: peer.to_string(),
            outbox,
        })
        .is_err()
    {
        warn!(client, "event loop gone, refusing connection");
        return;
    }

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbox_rx.recv().await {
            let line = match message.to_line() {
                Ok(line) => line,
                Err(e) => {
                    warn!(client, error = %e, "could not encode message");
                    continue;
                }
            };
            log_line(client, Direction::Tx, &line);
            if let Err(e) = write_line(&mut writer, &line).await {
                debug!(client, error = %e, "write failed");
                break;
            }
        }
    });

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        match next_frame(&mut reader, &mut buf, max_line_bytes).await {
            Ok(Frame::Line(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if events.send(Event::Message { client, line }).is_err() {
                    break;
                }
            }
            Ok(Frame::TooLarge) => {
                warn!(client, max_line_bytes, "oversized message skipped");
                if replies.send(ServerMessage::answer("message too large")).is_err() {
                    break;
                }
            }
            Ok(Frame::Closed) => break,
            Err(e) => {
                debug!(client, error = %e, "read failed");
                break;
            }
        }
    }

    // dropping the client entry closes the outbox and ends the writer
    drop(replies);
    let _ = events.send(Event::Disconnected { client });
    if let Err(e) = writer_task.await {
        debug!(client, error = %e, "writer task ended abnormally");
    }
}

async fn write_line(writer: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
