use soundtab_proto::media::TabsSnapshot;
use soundtab_proto::protocol::{Broadcast, Message, Reply, Request, PROTOCOL_VERSION};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What the connection task reports to the UI loop.
#[derive(Debug)]
pub enum DaemonMessage {
    Hello(TabsSnapshot),
    TabsChanged(TabsSnapshot),
    Response { id: u64, reply: Reply },
    Log(String),
    Disconnected(String),
}

/// Accumulates socket reads and yields whole frames.
#[derive(Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete message, or `None` until more bytes arrive.
    pub fn next_message(&mut self) -> anyhow::Result<Option<Message>> {
        match Message::decode(&self.buf)? {
            Some((msg, consumed)) => {
                self.buf.drain(..consumed);
                Ok(Some(msg))
            }
            None => Ok(None),
        }
    }
}

fn to_daemon_message(broadcast: Broadcast) -> DaemonMessage {
    match broadcast {
        Broadcast::Hello {
            protocol_version,
            snapshot,
        } => {
            if protocol_version != PROTOCOL_VERSION {
                warn!(
                    "daemon speaks protocol {}, popup speaks {}",
                    protocol_version, PROTOCOL_VERSION
                );
            }
            DaemonMessage::Hello(snapshot)
        }
        Broadcast::TabsChanged { snapshot } => DaemonMessage::TabsChanged(snapshot),
        Broadcast::Response { id, reply } => DaemonMessage::Response { id, reply },
        Broadcast::Log { message } => DaemonMessage::Log(message),
    }
}

/// Keep a connection to the daemon open, reconnecting with backoff.  Requests
/// from `cmd_rx` are written as they come; everything the daemon sends is
/// forwarded to `tx`.  Returns when the UI side hangs up.
pub async fn connection_handler(
    daemon_addr: String,
    tx: mpsc::Sender<DaemonMessage>,
    mut cmd_rx: mpsc::Receiver<Request>,
) {
    let mut retry_delay = Duration::from_millis(100);
    let max_retry_delay = Duration::from_secs(5);

    loop {
        let stream = match TcpStream::connect(&daemon_addr).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!("daemon not reachable at {}: {}", daemon_addr, e);
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(max_retry_delay);
                if tx.is_closed() {
                    return;
                }
                continue;
            }
        };
        info!("Connected to daemon at {}", daemon_addr);
        retry_delay = Duration::from_millis(100);

        let reason = match run_session(stream, &tx, &mut cmd_rx).await {
            Ok(()) => return,
            Err(reason) => reason,
        };
        info!("Daemon connection lost: {}", reason);
        if tx.send(DaemonMessage::Disconnected(reason)).await.is_err() {
            return;
        }
    }
}

/// One connected session.  `Ok(())` means the UI is gone; `Err` carries why
/// the socket dropped.
async fn run_session(
    stream: TcpStream,
    tx: &mpsc::Sender<DaemonMessage>,
    cmd_rx: &mut mpsc::Receiver<Request>,
) -> Result<(), String> {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut frames = FrameBuffer::default();
    let mut buf = [0u8; 4096];

    loop {
        tokio::select! {
            result = read_half.read(&mut buf) => {
                let n = match result {
                    Ok(0) => return Err("connection closed".into()),
                    Ok(n) => n,
                    Err(e) => return Err(format!("read error: {}", e)),
                };
                frames.push(&buf[..n]);
                loop {
                    match frames.next_message() {
                        Ok(Some(Message::Broadcast(b))) => {
                            if tx.send(to_daemon_message(b)).await.is_err() {
                                return Ok(());
                            }
                        }
                        Ok(Some(Message::Request(_))) => {}
                        Ok(None) => break,
                        Err(e) => return Err(format!("bad frame: {}", e)),
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                let Some(request) = cmd else { return Ok(()) };
                let encoded = Message::Request(request)
                    .encode()
                    .map_err(|e| format!("encode error: {}", e))?;
                if let Err(e) = write_half.write_all(&encoded).await {
                    return Err(format!("write error: {}", e));
                }
            }
        }
    }
}
