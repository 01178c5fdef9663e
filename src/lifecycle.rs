//! Tracks which bot messages were produced for which user post, so the author can remove the
//! whole set with one reaction and deleting the post takes its companions with it.
//!
//! Every group lives behind its own async mutex.  The index from message id to group is a plain
//! mutex held only for lookups, so events for different posts never wait on each other while
//! events for the same post are applied one at a time.

use crate::{
    clock::SharedClock,
    error::{Error, Result},
    log_error, log_internal,
    logging::PrintId,
    ordered_set::OrderedSet,
    transport::{MessageRef, SharedTransport},
};
use serenity::all::{MessageId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_CASCADE_TOKEN: &str = "❌";

/// Identifies a tracked post by its root message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupHandle(MessageId);

impl GroupHandle {
    pub fn root(&self) -> MessageId {
        self.0
    }
}

struct PostGroup {
    root: MessageRef,
    author: UserId,
    /// Root first, then companions in the order they were sent.
    members: OrderedSet<MessageRef>,
    created_at: Instant,
    evicted: bool,
}

#[derive(Clone)]
struct Slot {
    root: MessageId,
    expires_at: Instant,
    group: Arc<tokio::sync::Mutex<PostGroup>>,
}

/// Read-only copy of a tracked group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupSnapshot {
    pub root: MessageRef,
    pub author: UserId,
    pub members: Vec<MessageRef>,
    pub created_at: Instant,
}

/// What an event did to the cache.
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleOutcome {
    /// Untracked message, wrong user or token, or the group was already gone.
    Ignored,
    /// A single companion was dropped from its group.
    MemberRemoved(MessageRef),
    /// The group was evicted; `deleted` lists the messages the transport removed.
    Cascaded {
        deleted: Vec<MessageRef>,
        failed: Vec<MessageRef>,
    },
}

pub struct LifecycleCache {
    transport: SharedTransport,
    clock: SharedClock,
    ttl: Duration,
    cascade_token: String,
    index: Mutex<HashMap<MessageId, Slot>>,
}

impl LifecycleCache {
    #[cfg(test)]
    pub fn new(transport: SharedTransport, clock: SharedClock) -> Self {
        Self::with_settings(transport, clock, DEFAULT_TTL, DEFAULT_CASCADE_TOKEN)
    }

    pub fn with_settings(
        transport: SharedTransport,
        clock: SharedClock,
        ttl: Duration,
        cascade_token: &str,
    ) -> Self {
        Self {
            transport,
            clock,
            ttl,
            cascade_token: cascade_token.to_owned(),
            index: Mutex::new(HashMap::new()),
        }
    }

    pub fn cascade_token(&self) -> &str {
        &self.cascade_token
    }

    fn index(&self) -> MutexGuard<'_, HashMap<MessageId, Slot>> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Looks up the group owning `message`, dropping it first if its TTL ran out.
    fn live_slot(&self, message: MessageId) -> Option<Slot> {
        let now = self.clock.now();
        let mut index = self.index();
        let slot = index.get(&message)?.clone();
        if now >= slot.expires_at {
            // Expired groups are assumed gone from Discord's side already; no cascade.
            index.retain(|_, s| s.root != slot.root);
            return None;
        }
        Some(slot)
    }

    /// Starts tracking a post.  `members` are the bot messages already sent for it.
    pub fn register(
        &self,
        root: MessageRef,
        author: UserId,
        members: impl IntoIterator<Item = MessageRef>,
    ) -> Result<GroupHandle> {
        let now = self.clock.now();
        let mut set = OrderedSet::new();
        set.insert(root);
        set.extend(members);

        let mut index = self.index();
        if let Some(existing) = index.get(&root.message) {
            if now < existing.expires_at {
                return Err(Error::DuplicateRoot(root.message));
            }
            let stale = existing.root;
            index.retain(|_, s| s.root != stale);
        }

        let ids: Vec<MessageId> = set.iter().map(|m| m.message).collect();
        let slot = Slot {
            root: root.message,
            expires_at: now + self.ttl,
            group: Arc::new(tokio::sync::Mutex::new(PostGroup {
                root,
                author,
                members: set,
                created_at: now,
                evicted: false,
            })),
        };
        for id in ids {
            index.insert(id, slot.clone());
        }

        Ok(GroupHandle(root.message))
    }

    /// Adds a companion message to a live group.  Does nothing if the group is gone.
    pub async fn extend(&self, handle: GroupHandle, member: MessageRef) {
        let Some(slot) = self.live_slot(handle.0) else {
            return;
        };
        if slot.root != handle.0 {
            return;
        }

        let mut group = slot.group.lock().await;
        if group.evicted || !group.members.insert(member) {
            return;
        }
        self.index().insert(member.message, slot.clone());
    }

    /// Reaction on any tracked message.  Only the cascade token from the post author acts: on
    /// the root it removes the whole group, on a companion only that companion.
    pub async fn on_reaction(
        &self,
        message: MessageId,
        user: UserId,
        token: &str,
    ) -> LifecycleOutcome {
        if token != self.cascade_token {
            return LifecycleOutcome::Ignored;
        }
        let Some(slot) = self.live_slot(message) else {
            return LifecycleOutcome::Ignored;
        };

        let mut group = slot.group.lock().await;
        if group.evicted || group.author != user {
            return LifecycleOutcome::Ignored;
        }

        if message == group.root.message {
            return self.cascade(&mut group, true).await;
        }

        let Some(member) = self.drop_member(&mut group, message) else {
            return LifecycleOutcome::Ignored;
        };
        if let Err(e) = self.transport.delete_message(member).await {
            log_error!("Could not delete {}: {}", member.color_id(), e);
        }
        LifecycleOutcome::MemberRemoved(member)
    }

    /// A tracked message disappeared without our doing.  Losing the root takes the rest of the
    /// group with it; losing a companion only shrinks the group.
    pub async fn on_external_deletion(&self, message: MessageId) -> LifecycleOutcome {
        let Some(slot) = self.live_slot(message) else {
            return LifecycleOutcome::Ignored;
        };

        let mut group = slot.group.lock().await;
        if group.evicted {
            return LifecycleOutcome::Ignored;
        }

        if message == group.root.message {
            return self.cascade(&mut group, false).await;
        }

        match self.drop_member(&mut group, message) {
            Some(member) => LifecycleOutcome::MemberRemoved(member),
            None => LifecycleOutcome::Ignored,
        }
    }

    fn drop_member(&self, group: &mut PostGroup, message: MessageId) -> Option<MessageRef> {
        let member = group.members.remove_by(|m| m.message == message)?;
        self.index().remove(&message);
        Some(member)
    }

    async fn cascade(&self, group: &mut PostGroup, include_root: bool) -> LifecycleOutcome {
        // Evict before talking to Discord: the deletions we cause come back as events, and
        // those must find nothing to act on.
        group.evicted = true;
        let root = group.root;
        self.index().retain(|_, s| s.root != root.message);

        let targets: Vec<MessageRef> = group
            .members
            .iter()
            .filter(|m| include_root || m.message != root.message)
            .copied()
            .collect();

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for target in targets {
            match self.transport.delete_message(target).await {
                Ok(()) => deleted.push(target),
                Err(e) => {
                    log_error!("Could not delete {}: {}", target.color_id(), e);
                    failed.push(target);
                }
            }
        }

        log_internal!(
            "Removed post {} by {} ({} deleted, {} failed)",
            root.color_id(),
            group.author.color_id(),
            deleted.len(),
            failed.len(),
        );

        LifecycleOutcome::Cascaded { deleted, failed }
    }

    pub async fn get(&self, message: MessageId) -> Option<GroupSnapshot> {
        let slot = self.live_slot(message)?;
        let group = slot.group.lock().await;
        if group.evicted {
            return None;
        }
        Some(GroupSnapshot {
            root: group.root,
            author: group.author,
            members: group.members.iter().copied().collect(),
            created_at: group.created_at,
        })
    }

    /// Number of live groups.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.index()
            .values()
            .filter(|s| now < s.expires_at)
            .map(|s| s.root)
            .collect::<HashSet<_>>()
            .len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired group.  Returns how many groups were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut index = self.index();
        let expired: HashSet<MessageId> = index
            .values()
            .filter(|s| now >= s.expires_at)
            .map(|s| s.root)
            .collect();
        index.retain(|_, s| !expired.contains(&s.root));
        expired.len()
    }

    /// Sweeps every `period` until `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = interval.tick() => {}
                }
                let swept = cache.sweep();
                if swept > 0 {
                    log_internal!(
                        "Expired {} tracked post(s), {} still tracked",
                        swept,
                        cache.len()
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::fake::FakeTransport;
    use serenity::all::ChannelId;

    const AUTHOR: u64 = 7;
    const CHANNEL: u64 = 100;

    fn msg(id: u64) -> MessageRef {
        MessageRef::new(ChannelId::new(CHANNEL), MessageId::new(id))
    }

    fn setup() -> (Arc<FakeTransport>, ManualClock, LifecycleCache) {
        let transport = FakeTransport::new();
        let clock = ManualClock::new();
        let cache = LifecycleCache::new(transport.clone(), Arc::new(clock.clone()));
        (transport, clock, cache)
    }

    fn author() -> UserId {
        UserId::new(AUTHOR)
    }

    #[tokio::test]
    async fn untracked_messages_are_no_ops() {
        let (transport, _clock, cache) = setup();

        assert!(cache.get(MessageId::new(1)).await.is_none());
        assert_eq!(
            cache.on_reaction(MessageId::new(1), author(), "❌").await,
            LifecycleOutcome::Ignored
        );
        assert_eq!(
            cache.on_external_deletion(MessageId::new(1)).await,
            LifecycleOutcome::Ignored
        );
        cache.extend(GroupHandle(MessageId::new(1)), msg(2)).await;
        assert!(cache.get(MessageId::new(2)).await.is_none());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn registering_the_same_root_twice_fails() {
        let (_transport, _clock, cache) = setup();
        cache.register(msg(1), author(), [msg(2)]).unwrap();

        let err = cache.register(msg(1), author(), []).unwrap_err();
        assert!(matches!(err, Error::DuplicateRoot(id) if id == MessageId::new(1)));
    }

    #[tokio::test]
    async fn root_and_members_are_tracked_once_in_order() {
        let (_transport, _clock, cache) = setup();
        let handle = cache
            .register(msg(1), author(), [msg(2), msg(1), msg(3)])
            .unwrap();
        cache.extend(handle, msg(4)).await;
        cache.extend(handle, msg(2)).await;

        let group = cache.get(MessageId::new(4)).await.unwrap();
        assert_eq!(group.root, msg(1));
        assert_eq!(group.members, vec![msg(1), msg(2), msg(3), msg(4)]);
    }

    #[tokio::test]
    async fn author_reaction_on_companion_removes_only_that_companion() {
        let (transport, _clock, cache) = setup();
        cache.register(msg(1), author(), [msg(2), msg(3)]).unwrap();

        let outcome = cache.on_reaction(MessageId::new(2), author(), "❌").await;
        assert_eq!(outcome, LifecycleOutcome::MemberRemoved(msg(2)));
        assert_eq!(transport.deleted(), vec![MessageId::new(2)]);

        let group = cache.get(MessageId::new(1)).await.unwrap();
        assert_eq!(group.members, vec![msg(1), msg(3)]);
        assert!(cache.get(MessageId::new(2)).await.is_none());
    }

    #[tokio::test]
    async fn author_reaction_on_root_cascades_exactly_once() {
        let (transport, _clock, cache) = setup();
        cache.register(msg(1), author(), [msg(2), msg(3)]).unwrap();

        let outcome = cache.on_reaction(MessageId::new(1), author(), "❌").await;
        assert_eq!(
            outcome,
            LifecycleOutcome::Cascaded {
                deleted: vec![msg(1), msg(2), msg(3)],
                failed: vec![],
            }
        );
        assert!(cache.is_empty());

        // Our own deletions echo back, and the author may react again.
        assert_eq!(
            cache.on_external_deletion(MessageId::new(2)).await,
            LifecycleOutcome::Ignored
        );
        assert_eq!(
            cache.on_reaction(MessageId::new(1), author(), "❌").await,
            LifecycleOutcome::Ignored
        );
        assert_eq!(transport.deleted().len(), 3);
    }

    #[tokio::test]
    async fn reactions_from_others_or_other_tokens_do_nothing() {
        let (transport, _clock, cache) = setup();
        cache.register(msg(1), author(), [msg(2)]).unwrap();

        assert_eq!(
            cache.on_reaction(MessageId::new(1), UserId::new(99), "❌").await,
            LifecycleOutcome::Ignored
        );
        assert_eq!(
            cache.on_reaction(MessageId::new(1), author(), "👌").await,
            LifecycleOutcome::Ignored
        );
        assert!(transport.calls().is_empty());
        assert!(cache.get(MessageId::new(1)).await.is_some());
    }

    #[tokio::test]
    async fn cascade_continues_past_failed_deletes() {
        let (transport, _clock, cache) = setup();
        transport.fail_delete(MessageId::new(2));
        cache.register(msg(1), author(), [msg(2), msg(3)]).unwrap();

        let outcome = cache.on_reaction(MessageId::new(1), author(), "❌").await;
        assert_eq!(
            outcome,
            LifecycleOutcome::Cascaded {
                deleted: vec![msg(1), msg(3)],
                failed: vec![msg(2)],
            }
        );
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn root_deletion_cascades_remaining_members() {
        let (transport, _clock, cache) = setup();
        cache.register(msg(1), author(), [msg(2), msg(3)]).unwrap();

        let outcome = cache.on_external_deletion(MessageId::new(1)).await;
        assert_eq!(
            outcome,
            LifecycleOutcome::Cascaded {
                deleted: vec![msg(2), msg(3)],
                failed: vec![],
            }
        );
        assert_eq!(transport.deleted(), vec![MessageId::new(2), MessageId::new(3)]);
        assert!(cache.get(MessageId::new(3)).await.is_none());
    }

    #[tokio::test]
    async fn member_deletion_keeps_the_group() {
        let (transport, _clock, cache) = setup();
        cache.register(msg(1), author(), [msg(2), msg(3)]).unwrap();

        let outcome = cache.on_external_deletion(MessageId::new(3)).await;
        assert_eq!(outcome, LifecycleOutcome::MemberRemoved(msg(3)));
        assert!(transport.calls().is_empty());

        let group = cache.get(MessageId::new(2)).await.unwrap();
        assert_eq!(group.members, vec![msg(1), msg(2)]);
    }

    #[tokio::test]
    async fn groups_expire_after_a_fixed_ttl() {
        let (transport, clock, cache) = setup();
        cache.register(msg(1), author(), [msg(2)]).unwrap();
        let epsilon = Duration::from_millis(1);

        clock.advance(DEFAULT_TTL - epsilon);
        // Access does not extend the lifetime.
        assert!(cache.get(MessageId::new(1)).await.is_some());

        clock.advance(epsilon * 2);
        assert!(cache.get(MessageId::new(1)).await.is_none());
        assert_eq!(
            cache.on_reaction(MessageId::new(2), author(), "❌").await,
            LifecycleOutcome::Ignored
        );
        assert!(transport.calls().is_empty());

        // The root may be tracked again once the old group expired.
        assert!(cache.register(msg(1), author(), []).is_ok());
    }

    #[tokio::test]
    async fn sweep_drops_only_expired_groups() {
        let (_transport, clock, cache) = setup();
        cache.register(msg(1), author(), [msg(2)]).unwrap();
        clock.advance(Duration::from_secs(10 * 60));
        cache.register(msg(3), author(), [msg(4)]).unwrap();
        clock.advance(Duration::from_secs(6 * 60));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(MessageId::new(4)).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_until_shutdown() {
        let (_transport, clock, cache) = setup();
        let cache = Arc::new(cache);
        cache.register(msg(1), author(), [msg(2)]).unwrap();
        let shutdown = CancellationToken::new();
        let sweeper = cache.spawn_sweeper(Duration::from_secs(60), shutdown.clone());

        clock.advance(DEFAULT_TTL);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.index().is_empty());

        shutdown.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn extend_after_expiry_is_a_no_op() {
        let (_transport, clock, cache) = setup();
        let handle = cache.register(msg(1), author(), []).unwrap();
        clock.advance(DEFAULT_TTL);

        cache.extend(handle, msg(2)).await;
        assert!(cache.get(MessageId::new(2)).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_cascades_on_one_group_delete_once() {
        let (transport, _clock, cache) = setup();
        let cache = Arc::new(cache);
        cache.register(msg(1), author(), [msg(2), msg(3)]).unwrap();

        let a = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.on_reaction(MessageId::new(1), author(), "❌").await })
        };
        let b = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.on_external_deletion(MessageId::new(1)).await })
        };
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        let cascades = outcomes
            .iter()
            .filter(|o| matches!(o, LifecycleOutcome::Cascaded { .. }))
            .count();
        assert_eq!(cascades, 1);
        let mut deleted = transport.deleted();
        deleted.sort();
        deleted.dedup();
        assert_eq!(deleted.len(), transport.deleted().len());
    }
}
