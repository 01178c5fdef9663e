use crate::{
    event::*,
    helper::*,
    identity::{ArtLink, ArtSource},
    log_internal,
    logging::PrintId,
    plugin::*,
    publish::{Post, PublishOutcome, PublishRequest},
};
use anyhow::Result;
use serenity::all::{ChannelId, Message};

/// Reposts Pixiv and Twitter links found in ordinary messages, mirroring them to the author's
/// crosspost groups.
pub struct Art;

#[serenity::async_trait]
impl Plugin for Art {
    fn name(&self) -> &'static str {
        "art"
    }

    async fn usage(&self, _ctx: &Context) -> Option<String> {
        Some("<pixiv or twitter link> - post the art and mirror it to your groups".to_owned())
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        let normalizer = ctx.vstate.read().await.normalizer;
        let links = normalizer.extract(&msg.content);
        if links.is_empty() {
            return Ok(EventHandled::No);
        }

        let (links, targets) = {
            let pstate = ctx.pstate.read().await;
            let settings = msg
                .guild_id
                .map(|guild| pstate.guild(guild))
                .unwrap_or_default();

            let links: Vec<ArtLink> = links
                .into_iter()
                .filter(|link| match link.source {
                    ArtSource::Pixiv => settings.pixiv,
                    ArtSource::Twitter => settings.twitter,
                })
                .collect();
            let targets = if settings.crosspost {
                pstate.crosspost_targets(msg.author.id, msg.channel_id)
            } else {
                Vec::new()
            };
            (links, targets)
        };

        if links.is_empty() {
            return Ok(EventHandled::No);
        }

        publish(ctx, msg, &links, targets).await?;
        Ok(EventHandled::Yes)
    }
}

/// Posts `links` on behalf of the author of `msg` and mirrors them to `targets`.
pub(super) async fn publish(
    ctx: &Context<'_>,
    msg: &Message,
    links: &[ArtLink],
    targets: Vec<ChannelId>,
) -> Result<()> {
    let poster = msg.author.nick_in_guild(ctx, msg.guild_id).await;
    let policy = ctx.pstate.read().await.repost_policy(msg.guild_id);
    let (publisher, shutdown) = ctx.publisher().await;

    let request = PublishRequest {
        author: msg.author.id,
        trigger: msg.message_ref(),
        guild: msg.guild_id,
        policy,
        posts: links
            .iter()
            .map(|link| Post {
                source: link.canonical_url(),
                page: link.render(&poster),
            })
            .collect(),
        crosspost_targets: targets,
    };

    match publisher.publish(request, &shutdown).await? {
        PublishOutcome::Posted {
            group,
            primary,
            fanout,
            skipped,
        } => {
            log_internal!(
                "Tracking post {} with {} page(s), {} repost(s) left out",
                group.root().color_id(),
                primary.len(),
                skipped.len(),
            );
            if !fanout.is_complete() {
                let failed: Vec<String> = fanout
                    .failed
                    .iter()
                    .map(|f| format!("<#{}> ({})", f.channel, f.cause))
                    .collect();
                msg.reply(
                    ctx.cache_http,
                    format!("Could not crosspost to {}.", failed.join(", ")),
                )
                .await?;
            }
        }
        PublishOutcome::Blocked { reposts } => {
            log_internal!(
                "Blocked {} repost(s) by {}",
                reposts.len(),
                msg.author.id.color_id(),
            );
        }
        PublishOutcome::Declined => {
            log_internal!("{} did not confirm a repost", msg.author.id.color_id());
        }
    }

    Ok(())
}
