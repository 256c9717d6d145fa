//! Server network layer: WebSocket transport endpoints and the relay event loop

use crate::registry::Endpoint;
use crate::relay::{Relay, RelayConfig};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use shared::{PlayerId, ServerMessage, SWEEP_INTERVAL};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Frames buffered per connection before it counts as a slow consumer
pub const OUTGOING_QUEUE: usize = 256;
/// A single socket write taking longer than this drops the connection
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    /// Period of the liveness sweep
    pub sweep_interval: Duration,
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            sweep_interval: SWEEP_INTERVAL,
            relay: RelayConfig::default(),
        }
    }
}

/// Events sent from connection tasks to the relay loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        handle: ConnectionHandle,
        reply: oneshot::Sender<Option<PlayerId>>,
    },
    Message {
        id: PlayerId,
        text: String,
    },
    Disconnected {
        id: PlayerId,
        reason: String,
    },
}

/// Relay-side handle to one WebSocket connection
///
/// Text frames go through a bounded queue. Close requests use their own
/// single-slot channel so they still get through when that queue is full.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub addr: SocketAddr,
    tx: mpsc::Sender<String>,
    close_tx: mpsc::Sender<String>,
}

impl ConnectionHandle {
    pub fn new(
        addr: SocketAddr,
        tx: mpsc::Sender<String>,
        close_tx: mpsc::Sender<String>,
    ) -> Self {
        Self { addr, tx, close_tx }
    }
}

impl Endpoint for ConnectionHandle {
    fn send(&self, message: &ServerMessage) {
        let text = match shared::encode(message) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode message for {}: {}", self.addr, e);
                return;
            }
        };

        match self.tx.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("{} is not reading, dropping frame and closing", self.addr);
                self.close("slow consumer");
            }
            // The connection is already going away; its disconnect event
            // will clean up.
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn close(&self, reason: &str) {
        // Full means a close is already pending
        let _ = self.close_tx.try_send(reason.to_string());
    }
}

/// Relay server: accepts WebSocket connections and runs the single event
/// loop that owns all session state
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server { listener, config })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs until Ctrl+C.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs the relay loop until `shutdown` completes, then closes every
    /// connection.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let accept_task = Self::spawn_acceptor(self.listener, event_tx);

        let mut relay: Relay<ConnectionHandle> = Relay::new(self.config.relay.clone());

        let period = self.config.sweep_interval;
        let mut sweep = interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => Self::handle_event(&mut relay, event),
                        None => {
                            warn!("Acceptor stopped");
                            break;
                        }
                    }
                },

                _ = sweep.tick() => {
                    let evicted = relay.sweep(std::time::Instant::now());
                    if !evicted.is_empty() {
                        info!("Liveness sweep evicted {:?}", evicted);
                    }
                    debug!("{} players connected", relay.registry().len());
                },

                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        relay.shutdown("server shutdown");
        accept_task.abort();
        Ok(())
    }

    fn handle_event(relay: &mut Relay<ConnectionHandle>, event: ServerEvent) {
        let now = std::time::Instant::now();
        match event {
            ServerEvent::Connected { handle, reply } => {
                let addr = handle.addr;
                let id = relay.on_connect(handle, now);
                if let Some(id) = id {
                    info!("Client {} connected from {}", id, addr);
                }
                let _ = reply.send(id);
            }
            ServerEvent::Message { id, text } => {
                trace!("Player {}: {}", id, text);
                relay.on_message(id, &text, now);
            }
            ServerEvent::Disconnected { id, reason } => {
                relay.on_disconnect(id, &reason);
            }
        }
    }

    /// Spawns the task accepting TCP connections and upgrading them
    fn spawn_acceptor(
        listener: TcpListener,
        event_tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let event_tx = event_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, event_tx).await {
                                warn!("Connection from {} failed: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }
}

/// Drives one WebSocket connection: a writer task draining the outgoing
/// queue, and a reader forwarding text frames to the relay loop.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    debug!("WebSocket handshake completed with {}", addr);

    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTGOING_QUEUE);
    let (close_tx, mut close_rx) = mpsc::channel::<String>(1);

    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                Some(reason) = close_rx.recv() => {
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: reason.into(),
                    };
                    let _ = timeout(WRITE_TIMEOUT, sink.send(Message::Close(Some(frame)))).await;
                    break;
                },

                text = rx.recv() => {
                    let Some(text) = text else { break };
                    match timeout(WRITE_TIMEOUT, sink.send(Message::Text(text))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!("Write to {} failed: {}", addr, e);
                            break;
                        }
                        Err(_) => {
                            warn!("Write to {} timed out", addr);
                            break;
                        }
                    }
                },
            }
        }
        let _ = timeout(WRITE_TIMEOUT, sink.close()).await;
    });

    let (reply_tx, reply_rx) = oneshot::channel();
    event_tx.send(ServerEvent::Connected {
        handle: ConnectionHandle::new(addr, tx, close_tx),
        reply: reply_tx,
    })?;

    let id = match reply_rx.await {
        Ok(Some(id)) => id,
        _ => {
            // Rejected; the writer is flushing the close frame.
            let _ = writer.await;
            return Ok(());
        }
    };

    let reason = loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    event_tx.send(ServerEvent::Message { id, text })?;
                }
                Some(Ok(Message::Close(_))) | None => break "client closed".to_string(),
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("transport error: {}", e),
            },
            _ = &mut writer => break "closed by server".to_string(),
        }
    };

    writer.abort();
    // Fails only after the relay loop has shut down
    let _ = event_tx.send(ServerEvent::Disconnected { id, reason });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, "127.0.0.1:8080");
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.relay.session_timeout, Duration::from_secs(30));
        assert!(config.relay.session_timeout > config.sweep_interval * 2);
    }

    fn test_handle(
        capacity: usize,
    ) -> (ConnectionHandle, mpsc::Receiver<String>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (close_tx, close_rx) = mpsc::channel(1);
        (ConnectionHandle::new(test_addr(), tx, close_tx), rx, close_rx)
    }

    #[test]
    fn test_handle_encodes_messages() {
        let (handle, mut rx, mut close_rx) = test_handle(OUTGOING_QUEUE);

        handle.send(&ServerMessage::Init { id: 5 });
        handle.close("timeout");

        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"init","id":5}"#);
        assert_eq!(close_rx.try_recv().unwrap(), "timeout");
    }

    #[test]
    fn test_handle_survives_dropped_connection() {
        let (handle, rx, close_rx) = test_handle(OUTGOING_QUEUE);
        drop(rx);
        drop(close_rx);

        handle.send(&ServerMessage::PlayerLeft { id: 1 });
        handle.close("timeout");
    }

    #[test]
    fn test_full_queue_closes_slow_consumer() {
        let (handle, mut rx, mut close_rx) = test_handle(2);

        for id in 1..=5 {
            handle.send(&ServerMessage::PlayerLeft { id });
        }

        // Only what fit in the queue is kept
        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"player-left","id":1}"#);
        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"player-left","id":2}"#);
        assert!(rx.try_recv().is_err());

        // One close request, even though several frames overflowed
        assert_eq!(close_rx.try_recv().unwrap(), "slow consumer");
        assert!(close_rx.try_recv().is_err());
    }

    #[test]
    fn test_close_gets_through_full_queue() {
        let (handle, _rx, mut close_rx) = test_handle(1);
        handle.send(&ServerMessage::Init { id: 1 });

        handle.close("timeout");
        assert_eq!(close_rx.try_recv().unwrap(), "timeout");
    }

    #[test]
    fn test_events_routed_to_relay() {
        let mut relay: Relay<ConnectionHandle> = Relay::new(RelayConfig::default());

        let (handle, mut rx_a, _close_rx) = test_handle(OUTGOING_QUEUE);
        let (reply_tx, mut reply_rx) = oneshot::channel();
        Server::handle_event(
            &mut relay,
            ServerEvent::Connected {
                handle,
                reply: reply_tx,
            },
        );
        let id = reply_rx.try_recv().unwrap().unwrap();
        assert!(relay.registry().contains(id));
        assert_eq!(rx_a.try_recv().unwrap(), format!(r#"{{"type":"init","id":{}}}"#, id));

        Server::handle_event(
            &mut relay,
            ServerEvent::Disconnected {
                id,
                reason: "client closed".to_string(),
            },
        );
        assert!(relay.registry().is_empty());
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = Server::bind(ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        })
        .await
        .unwrap();

        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_run_until_immediate_shutdown() {
        let result = tokio_test::block_on(async {
            let server = Server::bind(ServerConfig {
                addr: "127.0.0.1:0".to_string(),
                ..ServerConfig::default()
            })
            .await
            .map_err(|e| e.to_string())?;
            server.run_until(async {}).await.map_err(|e| e.to_string())
        });

        tokio_test::assert_ok!(result);
    }
}
