//! Posting art on behalf of a user: repost check, optional confirmation, primary delivery,
//! lifecycle tracking and crossposting, in that order.

use crate::{
    error::{Error, Result},
    fanout::{self, FanoutResult},
    identity::SharedNormalizer,
    lifecycle::{GroupHandle, LifecycleCache},
    log_error, log_internal,
    logging::PrintId,
    prompt::{ConfirmationPrompt, PromptRequest, DEFAULT_ACCEPT_TOKEN, DEFAULT_TIMEOUT},
    repost::{Classification, RepostMode, RepostPolicy, RepostRecord, RepostTable},
    transport::{Embed, MessageRef, Payload, SharedTransport},
};
use serenity::all::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const REPOST_PROMPT: &str = "Following posts are reposts, react 👌 to post them.";

#[derive(Clone, Debug)]
pub struct PromptSettings {
    pub accept: String,
    pub decline: String,
    pub timeout: Duration,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            accept: DEFAULT_ACCEPT_TOKEN.to_owned(),
            decline: "❌".to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// One piece of content to post.
#[derive(Clone, Debug)]
pub struct Post {
    /// Link the post was made from.  Normalized into the post's identity key.
    pub source: String,
    pub page: Payload,
}

pub struct PublishRequest {
    pub author: UserId,
    /// The user's message that asked for the post.  Becomes the root of the lifecycle group.
    pub trigger: MessageRef,
    pub guild: Option<GuildId>,
    pub policy: RepostPolicy,
    pub posts: Vec<Post>,
    pub crosspost_targets: Vec<ChannelId>,
}

#[derive(Debug, PartialEq)]
pub enum PublishOutcome {
    /// Strict mode found nothing but reposts; a warning was sent and the trigger removed.
    Blocked { reposts: Vec<RepostRecord> },
    /// The author did not confirm the repost.
    Declined,
    Posted {
        group: GroupHandle,
        primary: Vec<MessageRef>,
        fanout: FanoutResult,
        /// Reposts left out under strict mode.
        skipped: Vec<RepostRecord>,
    },
}

struct Candidate {
    post: Post,
    key: Option<String>,
    repost: bool,
}

#[derive(Clone)]
pub struct Publisher {
    transport: SharedTransport,
    lifecycle: Arc<LifecycleCache>,
    reposts: Arc<RepostTable>,
    normalizer: SharedNormalizer,
    prompt: ConfirmationPrompt,
    prompt_settings: PromptSettings,
}

impl Publisher {
    pub fn new(
        transport: SharedTransport,
        lifecycle: Arc<LifecycleCache>,
        reposts: Arc<RepostTable>,
        normalizer: SharedNormalizer,
        prompt: ConfirmationPrompt,
        prompt_settings: PromptSettings,
    ) -> Self {
        Self {
            transport,
            lifecycle,
            reposts,
            normalizer,
            prompt,
            prompt_settings,
        }
    }

    pub async fn publish(
        &self,
        request: PublishRequest,
        cancel: &CancellationToken,
    ) -> Result<PublishOutcome> {
        let PublishRequest {
            author,
            trigger,
            guild,
            policy,
            posts,
            crosspost_targets,
        } = request;

        if posts.is_empty() {
            return Err(Error::NoPages);
        }

        let origin = trigger.channel;
        let scope = policy.scope_for(guild, origin);

        let mut reposts = Vec::new();
        let mut candidates: Vec<Candidate> = posts
            .into_iter()
            .map(|post| {
                let key = self.normalizer.normalize(&post.source);
                let record = match (&key, policy.mode) {
                    (Some(key), RepostMode::Enabled | RepostMode::Strict) => {
                        match self.reposts.classify(scope, key) {
                            Classification::Repost(record) => Some(record),
                            Classification::New => None,
                        }
                    }
                    _ => None,
                };
                let repost = record.is_some();
                reposts.extend(record);
                Candidate { post, key, repost }
            })
            .collect();

        let mut skipped = Vec::new();
        if !reposts.is_empty() {
            match policy.mode {
                RepostMode::Strict => {
                    let warning = repost_embed("Repost detected", guild, &reposts);
                    if let Err(e) = self.transport.send_message(origin, &warning).await {
                        log_error!("Could not warn about repost in {}: {}", origin.color_id(), e);
                    }

                    candidates.retain(|c| !c.repost);
                    if candidates.is_empty() {
                        if let Err(e) = self.transport.delete_message(trigger).await {
                            log_error!("Could not delete {}: {}", trigger.color_id(), e);
                        }
                        return Ok(PublishOutcome::Blocked { reposts });
                    }
                    skipped = reposts;
                }
                RepostMode::Enabled => {
                    let question = repost_embed(REPOST_PROMPT, guild, &reposts);
                    let confirmed = self
                        .prompt
                        .ask(
                            PromptRequest::new(author, origin, question)
                                .accept([self.prompt_settings.accept.as_str()])
                                .decline([self.prompt_settings.decline.as_str()])
                                .timeout(self.prompt_settings.timeout),
                            cancel,
                        )
                        .await?;
                    if !confirmed {
                        return Ok(PublishOutcome::Declined);
                    }
                }
                RepostMode::Disabled => {}
            }
        }

        let mut primary = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            match self.transport.send_message(origin, &candidate.post.page).await {
                Ok(message) => primary.push(message),
                Err(e) => {
                    // Half a gallery is worse than none.
                    self.retract(&primary).await;
                    return Err(e);
                }
            }
        }

        let group = match self
            .lifecycle
            .register(trigger, author, primary.iter().copied())
        {
            Ok(group) => group,
            Err(e) => {
                self.retract(&primary).await;
                return Err(e);
            }
        };

        let pages: Vec<Payload> = candidates.iter().map(|c| c.post.page.clone()).collect();
        let fanout = fanout::send(self.transport.as_ref(), &pages, &crosspost_targets, &[origin]).await;
        for delivered in &fanout.delivered {
            self.lifecycle.extend(group, *delivered).await;
        }

        if policy.mode != RepostMode::Disabled {
            for (candidate, message) in candidates.iter().zip(&primary) {
                if let Some(key) = &candidate.key {
                    self.reposts
                        .commit(scope, key, author, origin, Some(message.message));
                }
            }
        }

        log_internal!(
            "Posted {} page(s) for {} in {} (+{} crossposted, {} failed, {} skipped)",
            primary.len(),
            author.color_id(),
            origin.color_id(),
            fanout.delivered.len(),
            fanout.failed.len(),
            skipped.len(),
        );

        Ok(PublishOutcome::Posted {
            group,
            primary,
            fanout,
            skipped,
        })
    }

    /// Best-effort removal of messages sent for a post that did not go through.
    async fn retract(&self, sent: &[MessageRef]) {
        for message in sent {
            if let Err(e) = self.transport.delete_message(*message).await {
                log_error!("Could not delete {}: {}", message.color_id(), e);
            }
        }
    }
}

fn repost_embed(title: &str, guild: Option<GuildId>, reposts: &[RepostRecord]) -> Payload {
    let mut embed = Embed::new().title(title);
    for record in reposts {
        let location = match (guild, record.message) {
            (Some(guild), Some(message)) => format!(
                "https://discord.com/channels/{}/{}/{}",
                guild, record.channel, message
            ),
            _ => format!("<#{}>", record.channel),
        };
        embed = embed.field(
            &record.identity_key,
            format!("Posted by <@{}> in {}", record.posted_by, location),
            false,
        );
    }
    Payload::embed(embed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::identity::LinkNormalizer;
    use crate::reaction_hub::{ReactionEvent, ReactionHub};
    use crate::repost::{DedupScope, Scope, DEFAULT_RETENTION};
    use crate::transport::fake::FakeTransport;
    use serenity::all::MessageId;

    const AUTHOR: u64 = 7;
    const OTHER: u64 = 8;
    const GUILD: u64 = 1;
    const ART: u64 = 100;
    const MIRROR_A: u64 = 200;
    const MIRROR_B: u64 = 300;

    struct Harness {
        transport: Arc<FakeTransport>,
        hub: ReactionHub,
        lifecycle: Arc<LifecycleCache>,
        reposts: Arc<RepostTable>,
        publisher: Publisher,
    }

    fn setup() -> Harness {
        let transport = FakeTransport::new();
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new());
        let hub = ReactionHub::new();
        let lifecycle = Arc::new(LifecycleCache::new(transport.clone(), clock.clone()));
        let reposts = Arc::new(RepostTable::new(clock, DEFAULT_RETENTION));
        let publisher = Publisher::new(
            transport.clone(),
            lifecycle.clone(),
            reposts.clone(),
            Arc::new(LinkNormalizer),
            ConfirmationPrompt::new(transport.clone(), hub.clone()),
            PromptSettings::default(),
        );
        Harness {
            transport,
            hub,
            lifecycle,
            reposts,
            publisher,
        }
    }

    fn art(id: u64) -> Post {
        Post {
            source: format!("https://www.pixiv.net/en/artworks/{}", id),
            page: Payload::text(format!("artwork {}", id)),
        }
    }

    fn request(trigger: u64, mode: RepostMode, targets: &[u64]) -> PublishRequest {
        PublishRequest {
            author: UserId::new(AUTHOR),
            trigger: MessageRef::new(ChannelId::new(ART), MessageId::new(trigger)),
            guild: Some(GuildId::new(GUILD)),
            policy: RepostPolicy {
                mode,
                scope: DedupScope::Guild,
            },
            posts: vec![art(1), art(2)],
            crosspost_targets: targets.iter().copied().map(ChannelId::new).collect(),
        }
    }

    async fn post(h: &Harness, trigger: u64, mode: RepostMode, targets: &[u64]) -> PublishOutcome {
        h.publisher
            .publish(request(trigger, mode, targets), &CancellationToken::new())
            .await
            .unwrap()
    }

    fn record(h: &Harness, key: &str) -> RepostRecord {
        match h.reposts.classify(Scope::Guild(GuildId::new(GUILD)), key) {
            Classification::Repost(record) => record,
            Classification::New => panic!("expected a record for {}", key),
        }
    }

    #[tokio::test]
    async fn crossposts_join_the_lifecycle_group() {
        let h = setup();
        h.transport.fail_channel(ChannelId::new(MIRROR_B));

        let outcome = post(&h, 1, RepostMode::Disabled, &[MIRROR_A, ART, MIRROR_B]).await;

        let PublishOutcome::Posted {
            group,
            primary,
            fanout,
            skipped,
        } = outcome
        else {
            panic!("expected a post");
        };
        assert_eq!(primary.len(), 2);
        assert!(primary.iter().all(|m| m.channel == ChannelId::new(ART)));
        assert!(skipped.is_empty());
        // The origin is never a crosspost target.
        assert!(fanout.delivered.iter().all(|m| m.channel == ChannelId::new(MIRROR_A)));
        assert_eq!(fanout.delivered.len(), 2);
        assert_eq!(fanout.failed.len(), 1);

        let snapshot = h.lifecycle.get(group.root()).await.unwrap();
        assert_eq!(snapshot.members.len(), 5);
        // Disabled mode never records anything.
        assert!(h.reposts.is_empty());
    }

    #[tokio::test]
    async fn each_key_is_committed_with_its_own_message() {
        let h = setup();
        post(&h, 1, RepostMode::Enabled, &[]).await;

        assert_eq!(record(&h, "pixiv:1").message, Some(MessageId::new(1000)));
        assert_eq!(record(&h, "pixiv:2").message, Some(MessageId::new(1001)));
    }

    #[tokio::test]
    async fn strict_mode_blocks_a_post_of_only_reposts() {
        let h = setup();
        assert!(matches!(
            post(&h, 1, RepostMode::Strict, &[]).await,
            PublishOutcome::Posted { .. }
        ));
        let sent_before = h.transport.sent().len();

        let mut again = request(2, RepostMode::Strict, &[MIRROR_A]);
        again.author = UserId::new(OTHER);
        let outcome = h
            .publisher
            .publish(again, &CancellationToken::new())
            .await
            .unwrap();

        let PublishOutcome::Blocked { reposts } = outcome else {
            panic!("expected a block");
        };
        assert_eq!(reposts.len(), 2);
        assert_eq!(reposts[0].message, Some(MessageId::new(1000)));

        let sent = h.transport.sent();
        assert_eq!(sent.len(), sent_before + 1);
        let warning = sent.last().unwrap().1.embed.clone().unwrap();
        assert_eq!(warning.title.as_deref(), Some("Repost detected"));
        // Nothing was left to post, so the user's message goes too.
        assert_eq!(h.transport.deleted(), vec![MessageId::new(2)]);
        assert!(h.lifecycle.get(MessageId::new(2)).await.is_none());

        // The original records stand.
        let first = record(&h, "pixiv:1");
        assert_eq!(first.posted_by, UserId::new(AUTHOR));
        assert_eq!(first.message, Some(MessageId::new(1000)));
    }

    #[tokio::test]
    async fn strict_mode_posts_the_new_links_of_a_mixed_post() {
        let h = setup();
        let mut first = request(1, RepostMode::Strict, &[]);
        first.posts = vec![art(1)];
        h.publisher
            .publish(first, &CancellationToken::new())
            .await
            .unwrap();

        let mut mixed = request(2, RepostMode::Strict, &[MIRROR_A]);
        mixed.author = UserId::new(OTHER);
        let outcome = h
            .publisher
            .publish(mixed, &CancellationToken::new())
            .await
            .unwrap();

        let PublishOutcome::Posted {
            primary,
            fanout,
            skipped,
            ..
        } = outcome
        else {
            panic!("expected a post");
        };
        // 1000 was the first post, 1001 the warning.
        assert_eq!(primary, vec![MessageRef::new(ChannelId::new(ART), MessageId::new(1002))]);
        assert_eq!(fanout.delivered.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].identity_key, "pixiv:1");

        let pages: Vec<Payload> = h
            .transport
            .sent()
            .into_iter()
            .filter(|(m, _)| primary.contains(m))
            .map(|(_, p)| p)
            .collect();
        assert_eq!(pages, vec![art(2).page]);
        assert!(h.transport.deleted().is_empty());

        assert_eq!(record(&h, "pixiv:1").posted_by, UserId::new(AUTHOR));
        assert_eq!(record(&h, "pixiv:2").posted_by, UserId::new(OTHER));
        assert_eq!(record(&h, "pixiv:2").message, Some(MessageId::new(1002)));
    }

    #[tokio::test]
    async fn channel_scope_only_sees_reposts_in_the_same_channel() {
        let h = setup();
        let mut first = request(1, RepostMode::Strict, &[]);
        first.policy.scope = DedupScope::Channel;
        h.publisher
            .publish(first, &CancellationToken::new())
            .await
            .unwrap();

        let mut elsewhere = request(2, RepostMode::Strict, &[]);
        elsewhere.policy.scope = DedupScope::Channel;
        elsewhere.trigger = MessageRef::new(ChannelId::new(MIRROR_A), MessageId::new(2));
        let outcome = h
            .publisher
            .publish(elsewhere, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, PublishOutcome::Posted { .. }));
    }

    #[tokio::test]
    async fn untracked_sources_are_posted_but_never_recorded() {
        let h = setup();
        let mut plain = request(1, RepostMode::Strict, &[]);
        plain.posts = vec![Post {
            source: "https://example.com/a.png".to_owned(),
            page: Payload::text("a"),
        }];

        let outcome = h
            .publisher
            .publish(plain, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, PublishOutcome::Posted { .. }));
        assert!(h.reposts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn enabled_mode_posts_a_repost_once_confirmed() {
        let h = setup();
        post(&h, 1, RepostMode::Enabled, &[]).await;

        let publisher = h.publisher.clone();
        let task = tokio::spawn(async move {
            publisher
                .publish(request(2, RepostMode::Enabled, &[]), &CancellationToken::new())
                .await
        });

        // Two primary pages were 1000 and 1001, so the prompt is 1002.
        let prompt = MessageId::new(1002);
        while !h.hub.is_subscribed(prompt) {
            tokio::task::yield_now().await;
        }
        h.hub.dispatch_reaction(ReactionEvent {
            message: MessageRef::new(ChannelId::new(ART), prompt),
            user: UserId::new(AUTHOR),
            token: "👌".to_owned(),
        });

        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, PublishOutcome::Posted { .. }));
        assert_eq!(record(&h, "pixiv:1").message, Some(MessageId::new(1003)));
    }

    #[tokio::test(start_paused = true)]
    async fn enabled_mode_drops_an_unconfirmed_repost() {
        let h = setup();
        post(&h, 1, RepostMode::Enabled, &[]).await;

        let outcome = post(&h, 2, RepostMode::Enabled, &[MIRROR_A]).await;

        assert_eq!(outcome, PublishOutcome::Declined);
        // Two pages plus the prompt; nothing went to the mirror.
        assert_eq!(h.transport.sent().len(), 3);
        assert!(h.lifecycle.get(MessageId::new(2)).await.is_none());
        assert_eq!(record(&h, "pixiv:1").message, Some(MessageId::new(1000)));
    }

    #[tokio::test]
    async fn failed_primary_delivery_commits_nothing() {
        let h = setup();
        h.transport.fail_channel(ChannelId::new(ART));

        let err = h
            .publisher
            .publish(request(1, RepostMode::Strict, &[MIRROR_A]), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert!(h.reposts.is_empty());
        assert!(h.lifecycle.is_empty());
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn an_already_tracked_trigger_takes_its_pages_back() {
        let h = setup();
        post(&h, 1, RepostMode::Disabled, &[]).await;

        let err = h
            .publisher
            .publish(request(1, RepostMode::Disabled, &[MIRROR_A]), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateRoot(id) if id == MessageId::new(1)));
        assert_eq!(h.transport.sent().len(), 4);
        assert_eq!(
            h.transport.deleted(),
            vec![MessageId::new(1002), MessageId::new(1003)]
        );
        // The first post is still tracked as it was.
        let group = h.lifecycle.get(MessageId::new(1)).await.unwrap();
        assert_eq!(group.members.len(), 3);
    }

    #[tokio::test]
    async fn nothing_to_post_is_an_error() {
        let h = setup();
        let mut empty = request(1, RepostMode::Disabled, &[]);
        empty.posts.clear();

        let err = h
            .publisher
            .publish(empty, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoPages));
    }
}
