//! Multi-page viewer flipped through with reactions.
//!
//! Each widget runs as its own task that owns the page state and a subscription on the widget
//! message.  The registry only remembers which widget is active for an owner in a channel, so a
//! new widget from the same owner replaces the old one.

use crate::{
    error::{Error, Result},
    log_error, log_internal,
    logging::PrintId,
    reaction_hub::{MessageEvent, ReactionFilter, ReactionHub, Subscription},
    transport::{MessageRef, Payload, SharedTransport},
};
use serenity::all::{ChannelId, MessageId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const PREV_TOKEN: &str = "⏪";
pub const NEXT_TOKEN: &str = "⏩";
pub const STOP_TOKEN: &str = "⏹️";
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Debug)]
pub struct WidgetControls {
    pub prev: String,
    pub next: String,
    pub stop: String,
    /// Inactivity window, restarted by every navigation.
    pub idle_timeout: Duration,
}

impl Default for WidgetControls {
    fn default() -> Self {
        Self {
            prev: PREV_TOKEN.to_owned(),
            next: NEXT_TOKEN.to_owned(),
            stop: STOP_TOKEN.to_owned(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidgetStatus {
    Active,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WidgetView {
    pub current: usize,
    pub pages: usize,
    pub status: WidgetStatus,
}

/// Caller's view of a running widget.
#[derive(Debug)]
pub struct WidgetHandle {
    message: MessageRef,
    state: watch::Receiver<WidgetView>,
}

impl WidgetHandle {
    pub fn message(&self) -> MessageRef {
        self.message
    }

    pub fn current(&self) -> usize {
        self.state.borrow().current
    }

    pub fn pages(&self) -> usize {
        self.state.borrow().pages
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().status == WidgetStatus::Closed
    }

    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|view| view.status == WidgetStatus::Closed)
            .await;
    }
}

struct ActiveWidget {
    message: MessageId,
    close: CancellationToken,
}

#[derive(Clone)]
pub struct WidgetRegistry {
    transport: SharedTransport,
    hub: ReactionHub,
    controls: WidgetControls,
    active: Arc<Mutex<HashMap<(UserId, ChannelId), ActiveWidget>>>,
}

enum Step {
    Prev,
    Next,
    Stop,
}

/// Moves `current` by one page in the given direction without wrapping around.
fn clamp_step(current: usize, forward: bool, pages: usize) -> usize {
    if forward {
        (current + 1).min(pages.saturating_sub(1))
    } else {
        current.saturating_sub(1)
    }
}

impl WidgetRegistry {
    pub fn new(transport: SharedTransport, hub: ReactionHub, controls: WidgetControls) -> Self {
        Self {
            transport,
            hub,
            controls,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn active(&self) -> MutexGuard<'_, HashMap<(UserId, ChannelId), ActiveWidget>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub fn is_active(&self, message: MessageId) -> bool {
        self.active().values().any(|w| w.message == message)
    }

    /// Closes the widget `owner` has open in `channel`.  Returns whether there was one.
    pub fn close(&self, owner: UserId, channel: ChannelId) -> bool {
        match self.active().remove(&(owner, channel)) {
            Some(widget) => {
                widget.close.cancel();
                true
            }
            None => false,
        }
    }

    /// Shows `pages` in `channel`, navigable by `owner`.  A single page is sent as a plain
    /// message and the returned handle is already closed.
    pub async fn start(
        &self,
        owner: UserId,
        channel: ChannelId,
        pages: Vec<Payload>,
    ) -> Result<WidgetHandle> {
        let first = pages.first().ok_or(Error::NoPages)?;
        let message = self.transport.send_message(channel, first).await?;

        if pages.len() == 1 {
            let (_, state) = watch::channel(WidgetView {
                current: 0,
                pages: 1,
                status: WidgetStatus::Closed,
            });
            return Ok(WidgetHandle { message, state });
        }

        let close = CancellationToken::new();

        let subscription = self.hub.subscribe(
            message.message,
            ReactionFilter::any().from_user(owner).tokens([
                self.controls.prev.clone(),
                self.controls.next.clone(),
                self.controls.stop.clone(),
            ]),
        );

        let replaced = self.active().insert(
            (owner, channel),
            ActiveWidget {
                message: message.message,
                close: close.clone(),
            },
        );
        if let Some(replaced) = replaced {
            replaced.close.cancel();
        }

        for token in [&self.controls.prev, &self.controls.next, &self.controls.stop] {
            if let Err(e) = self.transport.add_reaction(message, token).await {
                log_error!("Could not add {} to widget {}: {}", token, message.color_id(), e);
            }
        }

        let (tx, state) = watch::channel(WidgetView {
            current: 0,
            pages: pages.len(),
            status: WidgetStatus::Active,
        });

        let registry = self.clone();
        tokio::spawn(async move {
            registry
                .run(owner, message, pages, subscription, tx, close)
                .await
        });

        Ok(WidgetHandle { message, state })
    }

    fn step_for(&self, token: &str) -> Option<Step> {
        if token == self.controls.prev {
            Some(Step::Prev)
        } else if token == self.controls.next {
            Some(Step::Next)
        } else if token == self.controls.stop {
            Some(Step::Stop)
        } else {
            None
        }
    }

    async fn run(
        self,
        owner: UserId,
        message: MessageRef,
        pages: Vec<Payload>,
        mut subscription: Subscription,
        state: watch::Sender<WidgetView>,
        close: CancellationToken,
    ) {
        let mut current = 0;
        let mut expires_at = Instant::now() + self.controls.idle_timeout;

        loop {
            let reaction = tokio::select! {
                biased;
                _ = close.cancelled() => break,
                _ = tokio::time::sleep_until(expires_at) => break,
                event = subscription.recv() => match event {
                    Some(MessageEvent::Reaction(reaction)) => reaction,
                    Some(MessageEvent::Deleted(_)) | None => break,
                },
            };

            let forward = match self.step_for(&reaction.token) {
                Some(Step::Next) => true,
                Some(Step::Prev) => false,
                Some(Step::Stop) => break,
                None => continue,
            };
            expires_at = Instant::now() + self.controls.idle_timeout;

            // Let the owner press the same button again.
            if let Err(e) = self
                .transport
                .remove_reaction(message, reaction.user, &reaction.token)
                .await
            {
                log_error!("Could not reset {} on widget {}: {}", reaction.token, message.color_id(), e);
            }

            let next = clamp_step(current, forward, pages.len());
            if next == current {
                continue;
            }
            match self.transport.edit_message(message, &pages[next]).await {
                Ok(()) => {
                    current = next;
                    state.send_modify(|view| view.current = current);
                }
                Err(e) => {
                    log_error!("Could not turn widget {} to page {}: {}", message.color_id(), next + 1, e)
                }
            }
        }

        drop(subscription);
        state.send_modify(|view| view.status = WidgetStatus::Closed);

        let mut active = self.active();
        if active
            .get(&(owner, message.channel))
            .is_some_and(|w| w.message == message.message)
        {
            active.remove(&(owner, message.channel));
        }
        drop(active);

        log_internal!("Closed widget {} of {}", message.color_id(), owner.color_id());
    }
}
