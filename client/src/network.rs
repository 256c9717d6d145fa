use crate::connection::SyncClient;
use crate::input::PoseSource;
use crate::rendering::AvatarRenderer;
use crate::scheduler::UpdateScheduler;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::OUTBOUND_INTERVAL;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the relay server
    pub server_url: String,
    pub outbound_interval: Duration,
    pub frame_interval: Duration,
    /// Wait this long and reconnect after a dropped connection
    pub reconnect_delay: Option<Duration>,
    /// Drop peers locally after this much silence
    pub peer_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080".to_string(),
            outbound_interval: OUTBOUND_INTERVAL,
            frame_interval: Duration::from_millis(16),
            reconnect_delay: None,
            peer_timeout: None,
        }
    }
}

/// How one connection attempt ended
#[derive(Debug, PartialEq)]
enum SessionEnd {
    Shutdown,
    Dropped(String),
}

pub struct Client<R: AvatarRenderer, P: PoseSource> {
    config: ClientConfig,
    sync: SyncClient<R>,
    scheduler: UpdateScheduler,
    pose_source: P,
}

impl<R: AvatarRenderer, P: PoseSource> Client<R, P> {
    pub fn new(config: ClientConfig, renderer: R, pose_source: P) -> Self {
        let sync = SyncClient::new(renderer, config.outbound_interval, config.peer_timeout);
        let scheduler = UpdateScheduler::new(config.outbound_interval);

        Client {
            config,
            sync,
            scheduler,
            pose_source,
        }
    }

    pub fn sync(&self) -> &SyncClient<R> {
        &self.sync
    }

    /// Runs until Ctrl+C.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Connects and keeps the session going until `shutdown` completes.
    /// Without a reconnect delay, a dropped connection ends the run.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let result = self.run_session(shutdown.as_mut()).await;

            let reason = match result {
                Ok(SessionEnd::Shutdown) => {
                    self.sync.handle_disconnected("shutdown");
                    return Ok(());
                }
                Ok(SessionEnd::Dropped(reason)) => reason,
                Err(e) => {
                    if self.config.reconnect_delay.is_none() {
                        self.sync.handle_disconnected("connection failed");
                        return Err(e);
                    }
                    e.to_string()
                }
            };

            self.sync.handle_disconnected(&reason);
            self.scheduler.reset();

            let Some(delay) = self.config.reconnect_delay else {
                return Ok(());
            };

            info!("Reconnecting in {:?}", delay);
            tokio::select! {
                _ = sleep(delay) => {},
                _ = shutdown.as_mut() => return Ok(()),
            }
        }
    }

    async fn run_session<F>(
        &mut self,
        mut shutdown: Pin<&mut F>,
    ) -> Result<SessionEnd, Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        self.sync.begin_connect();
        info!("Connecting to {}...", self.config.server_url);

        let (ws, _) = tokio_tungstenite::connect_async(self.config.server_url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();

        let mut frames = interval(self.config.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.sync.handle_text(&text, Instant::now());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "closed by server".to_string());
                        return Ok(SessionEnd::Dropped(reason));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Ok(SessionEnd::Dropped(format!("transport error: {}", e))),
                    None => return Ok(SessionEnd::Dropped("connection closed".to_string())),
                },

                _ = frames.tick() => {
                    let now = Instant::now();
                    let connected = self.sync.is_connected();

                    if let Some(message) =
                        self.scheduler.poll_outbound(now, connected, &mut self.pose_source)
                    {
                        match shared::encode(&message) {
                            Ok(text) => {
                                if let Err(e) = sink.send(Message::Text(text)).await {
                                    warn!("Error sending update: {}", e);
                                    return Ok(SessionEnd::Dropped(e.to_string()));
                                }
                            }
                            Err(e) => error!("Error encoding update: {}", e),
                        }
                    }

                    self.sync.render_frame(now);
                },

                _ = shutdown.as_mut() => {
                    debug!("Closing connection");
                    let _ = sink.close().await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }
}
