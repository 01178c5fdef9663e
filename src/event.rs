//! The Serenity crate we're using for the Discord API is designed around callbacks to handle
//! events.  However, this does not mesh well with our plugin framework here.  To resolve this,
//! the handler translates the callbacks into a distinct Event enum.

use crate::{context::Context, log_error};
use serenity::all::{
    ChannelId, Guild, GuildId, Message, MessageId, Reaction, Ready, UnavailableGuild,
};

/// A Discord event
pub enum Event {
    Ready(Ready),
    Message(Message),
    ReactionAdd(Reaction),
    MessageDelete {
        channel_id: ChannelId,
        message_id: MessageId,
        guild_id: Option<GuildId>,
    },
    GuildCreate(Guild),
    /// Left a guild, or it went down if `unavailable` is set.
    GuildDelete(UnavailableGuild),
}

impl Event {
    // When an event occurs, iterate over all the plugins to see if any can/should handle it.
    pub async fn handle(self, ctx: Context<'_>) {
        for plugin in crate::plugin::plugins() {
            match plugin.handle(&ctx, &self).await {
                Ok(EventHandled::Yes) => return,
                Ok(EventHandled::No) => continue,
                Err(err) => log_error!("Error in plugin {}: {}", plugin.name(), err),
            }
        }
    }

    /// If this is the prefixed command `cmd`, e. g. `bt!crosspost foo bar`, returns the message
    /// and the text after the command word.
    pub async fn is_bot_cmd<'a>(
        &'a self,
        ctx: &Context<'_>,
        cmd: &str,
    ) -> Option<(&'a Message, &'a str)> {
        let Event::Message(msg) = self else {
            return None;
        };

        let prefix = ctx.prefix().await;
        let rest = msg.content.trim_start().strip_prefix(prefix.as_str())?;
        let (word, args) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));

        (word == cmd).then_some((msg, args.trim()))
    }
}

pub enum EventHandled {
    Yes,
    No,
}

/// Words of a command's arguments.
pub fn args(args: &str) -> Vec<&str> {
    args.split_whitespace().collect()
}
