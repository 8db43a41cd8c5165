use crate::chat::ChatRelay;
use crate::config::ClientConfig;
use crate::error::{CallError, Result};
use crate::media::MediaSource;
use crate::peer::{PeerEvent, PeerLink, RtcPeer};
use crate::session::{CallSession, SessionEvent, SessionOptions};
use crate::signaling::dispatch_signal;
use crate::stomp::{Inbound, Publisher, StompChannel, Topic};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Намерения пользователя, которые исполняет цикл событий
enum Command {
    StartCall(oneshot::Sender<Result<()>>),
    SendMessage(String, oneshot::Sender<Result<()>>),
    Teardown(oneshot::Sender<Result<()>>),
}

/// Ручка для кнопок "start call" / "send message"
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ChatHandle {
    pub async fn start_call(&self) -> Result<()> {
        self.request(Command::StartCall).await
    }

    pub async fn send_message(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| Command::SendMessage(text, reply)).await
    }

    pub async fn teardown(&self) -> Result<()> {
        self.request(Command::Teardown).await
    }

    async fn request(&self, build: impl FnOnce(oneshot::Sender<Result<()>>) -> Command) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| CallError::Terminated)?;
        rx.await.map_err(|_| CallError::Terminated)?
    }
}

/// Клиент видеочата: сигнальный канал, peer connection и цикл событий
pub struct VideoChat {
    handle: ChatHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<()>,
    channel: Option<Arc<StompChannel>>,
}

impl VideoChat {
    /// Подключается к серверу сигналинга и запускает сессию
    pub async fn connect(config: &ClientConfig, media: Arc<dyn MediaSource>) -> Result<Self> {
        let (channel, inbound) = StompChannel::connect(config).await?;
        let channel = Arc::new(channel);

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let peer = Arc::new(RtcPeer::new(config, peer_tx).await?);

        let mut chat = Self::start(peer, peer_rx, channel.clone(), inbound, media, config);
        chat.channel = Some(channel);
        Ok(chat)
    }

    /// Собирает сессию из готовых частей и запускает цикл событий
    pub fn start<P, S>(
        peer: Arc<P>,
        peer_events: mpsc::UnboundedReceiver<PeerEvent>,
        publisher: Arc<S>,
        inbound: mpsc::UnboundedReceiver<Inbound>,
        media: Arc<dyn MediaSource>,
        config: &ClientConfig,
    ) -> Self
    where
        P: PeerLink + 'static,
        S: Publisher + 'static,
    {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let session = CallSession::new(
            peer,
            publisher.clone(),
            media,
            SessionOptions {
                destination: config.send_destination.clone(),
                constraints: config.media.constraints(),
            },
            event_tx.clone(),
        );
        let chat = ChatRelay::new(publisher, config.send_destination.clone(), event_tx);

        let task = tokio::spawn(run_loop(session, chat, cmd_rx, inbound, peer_events));

        Self {
            handle: ChatHandle { commands: cmd_tx },
            events: event_rx,
            task,
            channel: None,
        }
    }

    pub fn handle(&self) -> ChatHandle {
        self.handle.clone()
    }

    /// Следующее событие для отображения; `None` после остановки цикла
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Закрывает сессию и сокет, дожидается остановки цикла
    pub async fn shutdown(self) -> Result<()> {
        let result = match self.handle.teardown().await {
            Err(CallError::Terminated) => Ok(()),
            other => other,
        };
        if let Some(channel) = &self.channel {
            channel.close().await;
        }
        if let Err(e) = self.task.await {
            warn!("Session loop ended abnormally: {e}");
        }
        result
    }
}

async fn run_loop<P, S>(
    mut session: CallSession<P, S>,
    mut chat: ChatRelay<S>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    mut peer_events: mpsc::UnboundedReceiver<PeerEvent>,
) where
    P: PeerLink + 'static,
    S: Publisher + 'static,
{
    let mut inbound_open = true;
    let mut peer_open = true;

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::StartCall(reply)) => {
                    let result = session.start_call().await;
                    if let Err(e) = &result {
                        warn!("start_call failed: {e}");
                    }
                    let _ = reply.send(result);
                }
                Some(Command::SendMessage(text, reply)) => {
                    let _ = reply.send(chat.send(&text).await);
                }
                Some(Command::Teardown(reply)) => {
                    let _ = reply.send(session.teardown().await);
                    break;
                }
                None => {
                    debug!("All handles dropped, tearing down");
                    if let Err(e) = session.teardown().await {
                        warn!("Teardown failed: {e}");
                    }
                    break;
                }
            },
            msg = inbound.recv(), if inbound_open => match msg {
                Some(Inbound { topic: Topic::Chat, body }) => chat.receive(body),
                Some(Inbound { topic: Topic::Signal, body }) => {
                    let outcome = dispatch_signal(&mut session, &body).await;
                    debug!("Signal dispatch: {:?}", outcome);
                }
                None => {
                    warn!("Signaling channel closed; outbound messages will be dropped");
                    inbound_open = false;
                }
            },
            event = peer_events.recv(), if peer_open => match event {
                Some(event) => {
                    if let Err(e) = session.handle_peer_event(event).await {
                        warn!("Failed to handle peer event: {e}");
                    }
                }
                None => peer_open = false,
            },
        }
    }
    info!("Session loop stopped");
}
