use crate::core::DaemonEvent;
use crate::sync::{popup_channel, ListenerId, PopupFeed};
use soundtab_proto::protocol::{Broadcast, Message, Reply, Request};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

pub async fn bind(bind_address: &str, port: u16) -> anyhow::Result<TcpListener> {
    let addr = format!("{}:{}", bind_address, port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Popup socket listening at {}", listener.local_addr()?);
    Ok(listener)
}

pub fn start_server(
    listener: TcpListener,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut client_id: ListenerId = 0;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    info!("Popup {} connected from {}", id, peer);

                    let (link, feed) = popup_channel();
                    let replies = link.messages();
                    let registered = event_tx
                        .send(DaemonEvent::PopupConnected { id, link })
                        .await;
                    if registered.is_err() {
                        warn!("DaemonEvent channel closed, stopping popup server");
                        return;
                    }

                    let evt_tx = event_tx.clone();
                    tokio::spawn(async move {
                        handle_client(stream, id, evt_tx.clone(), replies, feed).await;
                        info!("Popup {} disconnected", id);
                        let _ = evt_tx.send(DaemonEvent::PopupDisconnected { id }).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

async fn handle_client(
    stream: TcpStream,
    client_id: ListenerId,
    event_tx: mpsc::Sender<DaemonEvent>,
    replies: mpsc::Sender<Broadcast>,
    mut feed: PopupFeed,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => {
                        debug!("Popup {} closed connection", client_id);
                        break;
                    }
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);

                        loop {
                            match Message::decode(&read_buf) {
                                Ok(Some((Message::Request(request), consumed))) => {
                                    read_buf.drain(..consumed);
                                    debug!("Popup {} sent {:?}", client_id, request);
                                    forward_request(request, event_tx.clone(), replies.clone());
                                }
                                Ok(Some((_, consumed))) => {
                                    read_buf.drain(..consumed);
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!("Popup {} sent a bad frame: {}", client_id, e);
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from popup {}: {}", client_id, e);
                        break;
                    }
                }
            }

            msg = feed.recv() => {
                let Some(broadcast) = msg else { break };
                match Message::Broadcast(broadcast).encode() {
                    Ok(encoded) => {
                        if write_half.write_all(&encoded).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Popup {}: failed to encode message: {}", client_id, e),
                }
            }
        }
    }
}

/// Hand the command to the core and queue its reply for this popup without
/// holding up the connection's read loop.
fn forward_request(
    request: Request,
    event_tx: mpsc::Sender<DaemonEvent>,
    out_tx: mpsc::Sender<Broadcast>,
) {
    tokio::spawn(async move {
        let Request { id, command } = request;
        let (reply_tx, reply_rx) = oneshot::channel();
        let fallback = Reply::failure(&command, "daemon is shutting down");

        let sent = event_tx
            .send(DaemonEvent::Request {
                command,
                reply: reply_tx,
            })
            .await;
        let reply = match sent {
            Ok(()) => reply_rx.await.unwrap_or(fallback),
            Err(_) => fallback,
        };
        let _ = out_tx.send(Broadcast::Response { id, reply }).await;
    });
}
