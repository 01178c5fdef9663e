use crate::{event::*, helper::*, log_event, log_internal, logging::*, plugin::*};
use anyhow::Result;

/// Prints debug information about event to stdout
pub struct Debug;

#[serenity::async_trait]
impl Plugin for Debug {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        match event {
            Event::Ready(ready) => {
                log_event!(
                    "Connected to {} server(s) as {}",
                    ready.guilds.len(),
                    ctx.cache.current_user().color(),
                );
            }
            Event::Message(msg) => {
                log_event!(
                    "{}{}{}{}{}{} {}",
                    msg.guild_id.color(ctx.http).await,
                    Glue.color(),
                    msg.channel_id.color(ctx.http).await,
                    Glue.color(),
                    msg.author.color(),
                    Glue.color(),
                    msg.content,
                );
            }
            Event::ReactionAdd(reaction) => {
                let emoji = reaction
                    .emoji
                    .token()
                    .unwrap_or("<unknown-emoji>".to_owned());

                let user = match reaction.user_id {
                    Some(user_id) => user_id.color(ctx.http).await,
                    None => "<unknown-user>".to_owned(),
                };

                log_event!(
                    "{} reacted to message {} with \"{}\"",
                    user,
                    reaction.message_id.color_id(),
                    emoji
                );
            }
            Event::MessageDelete {
                channel_id,
                message_id,
                guild_id,
            } => {
                log_event!(
                    "Message {} deleted in {}{}{}",
                    message_id.color_id(),
                    guild_id.color(ctx.http).await,
                    Glue.color(),
                    channel_id.color(ctx.http).await,
                );

                let lifecycle = ctx.lifecycle().await;
                if let Some(group) = lifecycle.get(*message_id).await {
                    log_internal!(
                        "{} was part of post {} by {} ({} message(s), {}s old)",
                        message_id.color_id(),
                        group.root.color_id(),
                        group.author.color_id(),
                        group.members.len(),
                        group.created_at.elapsed().as_secs(),
                    );
                }
            }
            Event::GuildCreate(guild) => {
                log_event!("Available in {}{}{}", Color::Guild, guild.name, Color::Default);
            }
            Event::GuildDelete(guild) => {
                let what = if guild.unavailable { "Lost" } else { "Removed from" };
                log_event!("{} {}{}{}", what, Color::Guild, guild.id, Color::Default);
            }
        }

        Ok(EventHandled::No)
    }
}
