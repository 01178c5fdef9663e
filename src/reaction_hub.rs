//! In-process fan-in of gateway reaction and deletion events.
//!
//! Serenity pushes `reaction_add` and `message_delete` callbacks for every message the bot can
//! see.  Prompts and widgets only care about one message each, so they take a [`Subscription`]
//! on that message and read typed [`MessageEvent`]s from it.  Dropping the subscription
//! deregisters it, so a waiting task can never leak or double-release its registration.

use crate::transport::MessageRef;
use serenity::all::{MessageId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionEvent {
    pub message: MessageRef,
    pub user: UserId,
    pub token: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageEvent {
    Reaction(ReactionEvent),
    Deleted(MessageRef),
}

/// Which reactions a subscriber wants to see.  Deletions are always delivered.
#[derive(Clone, Debug, Default)]
pub struct ReactionFilter {
    user: Option<UserId>,
    tokens: Option<Vec<String>>,
}

impl ReactionFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn from_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    pub fn tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens = Some(tokens.into_iter().map(Into::into).collect());
        self
    }

    pub fn matches(&self, event: &ReactionEvent) -> bool {
        if let Some(user) = self.user {
            if user != event.user {
                return false;
            }
        }
        match &self.tokens {
            Some(tokens) => tokens.iter().any(|t| *t == event.token),
            None => true,
        }
    }
}

struct Entry {
    id: u64,
    filter: ReactionFilter,
    tx: mpsc::UnboundedSender<MessageEvent>,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    subscribers: HashMap<MessageId, Vec<Entry>>,
}

#[derive(Clone, Default)]
pub struct ReactionHub {
    inner: Arc<Mutex<HubInner>>,
}

/// A live registration on one message.
pub struct Subscription {
    hub: ReactionHub,
    message: MessageId,
    id: u64,
    rx: mpsc::UnboundedReceiver<MessageEvent>,
}

impl ReactionHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        // Nothing in the critical sections can panic halfway through an update.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, message: MessageId, filter: ReactionFilter) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .subscribers
            .entry(message)
            .or_default()
            .push(Entry { id, filter, tx });

        Subscription {
            hub: self.clone(),
            message,
            id,
            rx,
        }
    }

    fn unsubscribe(&self, message: MessageId, id: u64) {
        let mut inner = self.lock();
        if let Some(entries) = inner.subscribers.get_mut(&message) {
            entries.retain(|entry| entry.id != id);
            if entries.is_empty() {
                inner.subscribers.remove(&message);
            }
        }
    }

    /// Delivers a reaction to every matching subscriber of its message.  Returns how many
    /// subscribers received it.
    pub fn dispatch_reaction(&self, event: ReactionEvent) -> usize {
        let inner = self.lock();
        let Some(entries) = inner.subscribers.get(&event.message.message) else {
            return 0;
        };

        entries
            .iter()
            .filter(|entry| entry.filter.matches(&event))
            .filter(|entry| entry.tx.send(MessageEvent::Reaction(event.clone())).is_ok())
            .count()
    }

    pub fn dispatch_deletion(&self, message: MessageRef) -> usize {
        let inner = self.lock();
        let Some(entries) = inner.subscribers.get(&message.message) else {
            return 0;
        };

        entries
            .iter()
            .filter(|entry| entry.tx.send(MessageEvent::Deleted(message)).is_ok())
            .count()
    }

    #[cfg(test)]
    pub fn is_subscribed(&self, message: MessageId) -> bool {
        self.lock().subscribers.contains_key(&message)
    }

    #[cfg(test)]
    pub fn subscription_count(&self) -> usize {
        self.lock().subscribers.values().map(Vec::len).sum()
    }
}

impl Subscription {
    /// Next event for this message.  Never returns `None` while the subscription is alive,
    /// since the hub keeps the sending half until it is dropped.
    pub async fn recv(&mut self) -> Option<MessageEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.message, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::all::ChannelId;

    fn target(message: u64) -> MessageRef {
        MessageRef::new(ChannelId::new(1), MessageId::new(message))
    }

    fn reaction(message: u64, user: u64, token: &str) -> ReactionEvent {
        ReactionEvent {
            message: target(message),
            user: UserId::new(user),
            token: token.to_owned(),
        }
    }

    #[tokio::test]
    async fn delivers_only_matching_reactions() {
        let hub = ReactionHub::new();
        let mut sub = hub.subscribe(
            MessageId::new(10),
            ReactionFilter::any().from_user(UserId::new(7)).tokens(["👌"]),
        );

        assert_eq!(hub.dispatch_reaction(reaction(10, 8, "👌")), 0);
        assert_eq!(hub.dispatch_reaction(reaction(10, 7, "❌")), 0);
        assert_eq!(hub.dispatch_reaction(reaction(11, 7, "👌")), 0);
        assert_eq!(hub.dispatch_reaction(reaction(10, 7, "👌")), 1);

        assert_eq!(
            sub.recv().await,
            Some(MessageEvent::Reaction(reaction(10, 7, "👌")))
        );
    }

    #[tokio::test]
    async fn deletion_bypasses_the_reaction_filter() {
        let hub = ReactionHub::new();
        let mut sub = hub.subscribe(
            MessageId::new(10),
            ReactionFilter::any().from_user(UserId::new(8)),
        );

        assert_eq!(hub.dispatch_reaction(reaction(10, 7, "👌")), 0);
        assert_eq!(hub.dispatch_deletion(target(10)), 1);
        assert_eq!(sub.recv().await, Some(MessageEvent::Deleted(target(10))));
    }

    #[test]
    fn dropping_a_subscription_deregisters_it_once() {
        let hub = ReactionHub::new();
        let first = hub.subscribe(MessageId::new(10), ReactionFilter::any());
        let second = hub.subscribe(MessageId::new(10), ReactionFilter::any());
        assert_eq!(hub.subscription_count(), 2);

        drop(first);
        assert_eq!(hub.subscription_count(), 1);
        assert!(hub.is_subscribed(MessageId::new(10)));

        drop(second);
        assert_eq!(hub.subscription_count(), 0);
        assert!(!hub.is_subscribed(MessageId::new(10)));
        assert_eq!(hub.dispatch_reaction(reaction(10, 7, "👌")), 0);
    }
}
