use crate::{event::*, helper::*, plugin::*};
use anyhow::Result;
use serenity::all::ChannelId;

/// Posts a link while leaving some of the author's crosspost channels out.
pub struct Crosspost;

#[serenity::async_trait]
impl Plugin for Crosspost {
    fn name(&self) -> &'static str {
        "crosspost"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = ctx.prefix().await;
        Some(format!(
            "{}{} <pixiv or twitter link> [excluded channels | all] - post without mirroring to \
             the given channels, or to any with `all`",
            prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, rest)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        let normalizer = ctx.vstate.read().await.normalizer;
        let links = normalizer.extract(rest);
        if links.is_empty() {
            msg.reply(ctx.cache_http, "Give me a Pixiv or Twitter link to post.")
                .await?;
            return Ok(EventHandled::Yes);
        }

        let targets = {
            let pstate = ctx.pstate.read().await;
            if pstate.groups(msg.author.id).is_empty() {
                drop(pstate);
                msg.reply(
                    ctx.cache_http,
                    "You have no crosspost groups.  Create one with `group create`.",
                )
                .await?;
                return Ok(EventHandled::Yes);
            }
            pstate.crosspost_targets(msg.author.id, msg.channel_id)
        };

        let targets = filter_targets(targets, &args(rest));
        super::art::publish(ctx, msg, &links, targets).await?;
        Ok(EventHandled::Yes)
    }
}

/// Drops the channels named in `words`, or every channel if `all` is among them.
fn filter_targets(targets: Vec<ChannelId>, words: &[&str]) -> Vec<ChannelId> {
    if words.contains(&"all") {
        return Vec::new();
    }
    let excluded: Vec<ChannelId> = words.iter().filter_map(|w| parse_channel(w)).collect();
    targets
        .into_iter()
        .filter(|c| !excluded.contains(c))
        .collect()
}
