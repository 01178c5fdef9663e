use crate::{event::*, log_internal, plugin::*};
use anyhow::Result;

/// Seeds settings for every guild the bot is in and drops them for guilds it left.
pub struct Ready;

#[serenity::async_trait]
impl Plugin for Ready {
    fn name(&self) -> &'static str {
        "ready"
    }

    async fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        match event {
            // Connected to server
            Event::Ready(_) => Ok(EventHandled::Yes),
            Event::GuildCreate(guild) => {
                let mut pstate = ctx.pstate.write().await;
                let key = guild.id.to_string();
                if !pstate.guilds.contains_key(&key) {
                    pstate.guild_mut(guild.id);
                    pstate.save().await?;
                    log_internal!("Added default settings for \"{}\"", guild.name);
                }
                Ok(EventHandled::Yes)
            }
            // An outage, not a kick; the settings are still wanted.
            Event::GuildDelete(guild) if guild.unavailable => Ok(EventHandled::Yes),
            Event::GuildDelete(guild) => {
                let mut pstate = ctx.pstate.write().await;
                if pstate.forget_guild(guild.id) {
                    pstate.save().await?;
                    log_internal!("Removed settings for guild {}", guild.id);
                }
                Ok(EventHandled::Yes)
            }
            _ => Ok(EventHandled::No),
        }
    }
}
