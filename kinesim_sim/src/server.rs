//! Newline-delimited JSON message server.
//!
//! Each connection sends one inbound message per line and gets one
//! `{"success":bool,"text":string}` line back per message. Notifications from
//! the runtime are interleaved as `{"Notification":{...}}` lines. Message
//! handling touches the registry's blocking locks, so it runs on the blocking
//! pool rather than on the connection task. Lines over `MAX_LINE_BYTES` or not
//! valid UTF-8 get a failure line and the session carries on.

use kinesim_core::{CommandResponse, RuntimeContext};
use kinesim_env::{BroadcastSink, Notification, SessionId};
use serde::Serialize;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct Outbound<'a> {
    #[serde(rename = "Notification")]
    notification: &'a Notification,
}

/// Accepts message connections for one runtime.
pub struct MessageServer {
    listener: TcpListener,
    rt: Arc<RuntimeContext>,
    sink: BroadcastSink,
}

impl MessageServer {
    /// Binds the listening socket.
    ///
    /// # Arguments
    /// * `addr` - Address to bind, e.g. `127.0.0.1:7400` (port 0 picks one)
    /// * `rt` - Runtime messages are applied to
    /// * `sink` - The runtime's notification sink, subscribed once per connection
    pub async fn bind(addr: &str, rt: Arc<RuntimeContext>, sink: BroadcastSink) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, rt, sink })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves connections until accepting fails.
    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
            }
            let session = SessionId::new();
            let rt = Arc::clone(&self.rt);
            let notifications = self.sink.subscribe();
            info!("Client {} connected from {}", session, peer);

            tokio::spawn(async move {
                match serve_connection(stream, rt, notifications).await {
                    Ok(()) => info!("Client {} disconnected", session),
                    Err(e) => warn!("Client {} dropped: {}", session, e),
                }
            });
        }
    }
}

async fn write_line<W, T>(writer: &mut W, value: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}

/// Longest accepted message line, newline excluded.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

async fn respond<W>(writer: &mut W, rt: &Arc<RuntimeContext>, mut raw: Vec<u8>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while matches!(raw.last(), Some(b'\n' | b'\r')) {
        raw.pop();
    }
    let line = match String::from_utf8(raw) {
        Ok(line) => line,
        Err(e) => {
            debug!("Rejected non UTF-8 line: {}", e);
            let response = CommandResponse::fail(format!("Invalid UTF-8 in message line: {}", e.utf8_error()));
            return write_line(writer, &response).await;
        }
    };
    if line.trim().is_empty() {
        return Ok(());
    }
    let rt = Arc::clone(rt);
    let response = tokio::task::spawn_blocking(move || rt.handle_message(&line))
        .await
        .unwrap_or_else(|e| CommandResponse::fail(format!("Message task failed: {}", e)));
    write_line(writer, &response).await
}

async fn serve_connection(
    stream: TcpStream,
    rt: Arc<RuntimeContext>,
    mut notifications: broadcast::Receiver<Notification>,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    // Partial reads survive a cancelled read_until, so the buffer outlives each select
    let mut pending = Vec::new();
    let mut oversized = false;
    let mut forwarding = true;

    loop {
        let room = (MAX_LINE_BYTES + 1).saturating_sub(pending.len()).max(1) as u64;
        let mut limited = (&mut reader).take(room);
        tokio::select! {
            read = limited.read_until(b'\n', &mut pending) => {
                if read? == 0 {
                    if !pending.is_empty() && !oversized {
                        respond(&mut writer, &rt, std::mem::take(&mut pending)).await?;
                    }
                    break;
                }
                if pending.last() == Some(&b'\n') {
                    let line = std::mem::take(&mut pending);
                    if oversized {
                        oversized = false;
                        warn!("Dropped message line over {} bytes", MAX_LINE_BYTES);
                        let response = CommandResponse::fail(format!("Message line exceeds {} bytes", MAX_LINE_BYTES));
                        write_line(&mut writer, &response).await?;
                    } else {
                        respond(&mut writer, &rt, line).await?;
                    }
                } else if pending.len() > MAX_LINE_BYTES {
                    oversized = true;
                    pending.clear();
                }
            }
            received = notifications.recv(), if forwarding => match received {
                Ok(notification) => write_line(&mut writer, &Outbound { notification: &notification }).await?,
                Err(RecvError::Lagged(skipped)) => debug!("Connection lagged, {} notifications skipped", skipped),
                Err(RecvError::Closed) => forwarding = false,
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinesim_core::RuntimeConfig;
    use kinesim_env::WallClock;
    use serde_json::Value;

    async fn start() -> (Arc<RuntimeContext>, SocketAddr) {
        let (sink, _rx) = BroadcastSink::new(64);
        let rt = RuntimeContext::new(RuntimeConfig::default(), Arc::new(sink.clone()), WallClock::shared()).unwrap();
        let server = MessageServer::bind("127.0.0.1:0", Arc::clone(&rt), sink).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        (rt, addr)
    }

    #[tokio::test]
    async fn test_request_response_and_notification() {
        let (rt, addr) = start().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer
            .write_all(b"{\"EntityAdd\":{\"EntityName\":\"X\",\"EntityClass\":\"F16\",\"LatDegs\":1.0,\"LongDegs\":2.0}}\n")
            .await
            .unwrap();

        let mut received = Vec::new();
        for _ in 0..2 {
            let line = lines.next_line().await.unwrap().unwrap();
            received.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        assert!(received.contains(&serde_json::json!({"success": true, "text": "Added X"})));
        assert!(received.contains(&serde_json::json!({"Notification": {"EntityCreated": {"EntityName": "X"}}})));
        assert!(rt.registry().contains("X"));
    }

    #[tokio::test]
    async fn test_bad_message_gets_failure_line() {
        let (_rt, addr) = start().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(b"{\"Teleport\":{}}\n").await.unwrap();
        let line = lines.next_line().await.unwrap().unwrap();
        let response: CommandResponse = serde_json::from_str(&line).unwrap();
        assert!(!response.success);
        assert!(response.text.contains("Teleport"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_keeps_session_open() {
        let (rt, addr) = start().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(b"{\"EntityDelete\":{\"EntityName\":\"\xff\xfe\"}}\n").await.unwrap();
        let line = lines.next_line().await.unwrap().unwrap();
        let response: CommandResponse = serde_json::from_str(&line).unwrap();
        assert!(!response.success);
        assert!(response.text.contains("UTF-8"));

        writer
            .write_all(b"{\"EntityAdd\":{\"EntityName\":\"Y\",\"EntityClass\":\"F16\",\"LatDegs\":1.0,\"LongDegs\":2.0}}\n")
            .await
            .unwrap();
        let mut added = false;
        for _ in 0..2 {
            let line = lines.next_line().await.unwrap().unwrap();
            added |= serde_json::from_str::<Value>(&line).unwrap() == serde_json::json!({"success": true, "text": "Added Y"});
        }
        assert!(added);
        assert!(rt.registry().contains("Y"));
    }

    #[tokio::test]
    async fn test_oversized_line_rejected_and_session_continues() {
        let (_rt, addr) = start().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let mut huge = vec![b'x'; MAX_LINE_BYTES * 3];
        huge.push(b'\n');
        writer.write_all(&huge).await.unwrap();
        writer.write_all(b"{\"Teleport\":{}}\n").await.unwrap();

        let first: CommandResponse = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(!first.success);
        assert!(first.text.contains("exceeds"));
        let second: CommandResponse = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(second.text.contains("Teleport"));
    }
}
