//! Mailbox in front of the engine
//!
//! Commands, alarm fires, idle checks and observer attachments all go through
//! one queue and are applied one at a time in the order they were received.

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use super::TimerEngine;
use crate::{
    error::{EngineError, EngineResult},
    protocol::{Attachment, Command, CommandOutcome, Event, LifecycleSignal},
    state::TimerState,
};

const MAILBOX_CAPACITY: usize = 256;

type Reply<T> = oneshot::Sender<EngineResult<T>>;

enum EngineMessage {
    Command {
        command: Command,
        sender: Option<String>,
        reply: Reply<CommandOutcome>,
    },
    Attach {
        attachment: Attachment,
        reply: Reply<Option<mpsc::UnboundedReceiver<Event>>>,
    },
    Lifecycle {
        signal: LifecycleSignal,
        reply: Reply<bool>,
    },
    AlarmFired {
        tag: String,
        reply: Reply<Option<TimerState>>,
    },
    IdleCheck {
        reply: Reply<bool>,
    },
}

/// Cloneable handle used by the API and background tasks to reach the engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMessage>,
}

impl std::fmt::Debug for EngineMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineMessage::Command { command, .. } => write!(f, "Command({})", command.action()),
            EngineMessage::Attach { attachment, .. } => {
                write!(f, "Attach({})", attachment.observer_id)
            }
            EngineMessage::Lifecycle { signal, .. } => {
                write!(f, "Lifecycle({}, {:?})", signal.observer_id, signal.event)
            }
            EngineMessage::AlarmFired { tag, .. } => write!(f, "AlarmFired({})", tag),
            EngineMessage::IdleCheck { .. } => write!(f, "IdleCheck"),
        }
    }
}

impl EngineHandle {
    pub async fn command(
        &self,
        command: Command,
        sender: Option<String>,
    ) -> EngineResult<CommandOutcome> {
        self.request(|reply| EngineMessage::Command { command, sender, reply })
            .await
    }

    pub async fn attach(
        &self,
        attachment: Attachment,
    ) -> EngineResult<Option<mpsc::UnboundedReceiver<Event>>> {
        self.request(|reply| EngineMessage::Attach { attachment, reply })
            .await
    }

    pub async fn lifecycle(&self, signal: LifecycleSignal) -> EngineResult<bool> {
        self.request(|reply| EngineMessage::Lifecycle { signal, reply })
            .await
    }

    pub async fn alarm_fired(&self, tag: String) -> EngineResult<Option<TimerState>> {
        self.request(|reply| EngineMessage::AlarmFired { tag, reply })
            .await
    }

    pub async fn idle_check(&self) -> EngineResult<bool> {
        self.request(|reply| EngineMessage::IdleCheck { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EngineMessage,
    ) -> EngineResult<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| EngineError::Stopped)?;
        response.await.map_err(|_| EngineError::Stopped)?
    }
}

/// Run the engine on its own task and return a handle to it
pub fn spawn_engine(engine: TimerEngine) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let task = tokio::spawn(engine_loop(engine, rx));
    (EngineHandle { tx }, task)
}

async fn engine_loop(mut engine: TimerEngine, mut rx: mpsc::Receiver<EngineMessage>) {
    info!("Timer engine running");

    while let Some(message) = rx.recv().await {
        debug!("Engine processing {:?}", message);
        match message {
            EngineMessage::Command { command, sender, reply } => {
                let action = command.action();
                let result = engine.handle(command, sender.as_deref()).await;
                if let Err(e) = &result {
                    error!("Command {} failed: {}", action, e);
                }
                respond(reply, result);
            }
            EngineMessage::Attach { attachment, reply } => {
                respond(reply, engine.attach(attachment).await);
            }
            EngineMessage::Lifecycle { signal, reply } => {
                respond(reply, engine.lifecycle(signal).await);
            }
            EngineMessage::AlarmFired { tag, reply } => {
                respond(reply, engine.on_alarm(&tag).await);
            }
            EngineMessage::IdleCheck { reply } => {
                respond(reply, engine.idle_check().await);
            }
        }
    }

    info!("Timer engine stopped");
}

fn respond<T>(reply: Reply<T>, result: EngineResult<T>) {
    if reply.send(result).is_err() {
        warn!("Engine reply dropped, requester went away");
    }
}
