//! Miscellaneous convenience methods

use crate::{context::Context, transport::MessageRef};
use serenity::all::{ChannelId, GuildId, Permissions, ReactionType};

#[serenity::async_trait]
pub trait UserHelper {
    async fn nick_in_guild(&self, ctx: &Context, guild_id: Option<GuildId>) -> String;
}

#[serenity::async_trait]
impl UserHelper for serenity::all::User {
    async fn nick_in_guild(&self, ctx: &Context, guild_id: Option<GuildId>) -> String {
        let nick_in_guild = match guild_id {
            Some(guild_id) => self.nick_in(ctx.cache_http, guild_id).await,
            None => None,
        };

        // May not be in a guild, e.g. DM.  Fall back to global username.
        match nick_in_guild {
            Some(nick_in_guild) => nick_in_guild,
            None => self.name.clone(),
        }
    }
}

#[serenity::async_trait]
pub trait MessageHelper {
    fn message_ref(&self) -> MessageRef;
    async fn is_from_owner(&self, ctx: &Context) -> bool;
    async fn is_from_admin(&self, ctx: &Context) -> bool;
}

#[serenity::async_trait]
impl MessageHelper for serenity::all::Message {
    fn message_ref(&self) -> MessageRef {
        MessageRef::new(self.channel_id, self.id)
    }

    async fn is_from_owner(&self, ctx: &Context) -> bool {
        let owners = &ctx.cfg.read().await.general.bot_owners;
        let author_global_name = &self.author.name;

        owners.contains(author_global_name)
    }

    /// Bot owners, the guild owner, and members allowed to manage the guild.
    async fn is_from_admin(&self, ctx: &Context) -> bool {
        if self.is_from_owner(ctx).await {
            return true;
        }

        let Ok(member) = self.member(ctx.cache_http).await else {
            return false;
        };

        // Cache references must not be held across an await.
        let Some(guild) = self.guild(ctx.cache) else {
            return false;
        };
        if guild.owner_id == self.author.id {
            return true;
        }
        match guild.channels.get(&self.channel_id) {
            Some(channel) => guild
                .user_permissions_in(channel, &member)
                .intersects(Permissions::ADMINISTRATOR | Permissions::MANAGE_GUILD),
            None => false,
        }
    }
}

pub trait ReactionTypeHelper {
    /// The emoji as a plain token: the character itself, or the name of a custom emoji.
    fn token(&self) -> Option<String>;
}

impl ReactionTypeHelper for ReactionType {
    fn token(&self) -> Option<String> {
        match self {
            ReactionType::Unicode(s) => Some(s.clone()),
            ReactionType::Custom { name, .. } => name.clone(),
            _ => None,
        }
    }
}

/// Accepts either a channel mention (`<#123>`) or a raw channel id.
pub fn parse_channel(word: &str) -> Option<ChannelId> {
    let id = word
        .strip_prefix("<#")
        .and_then(|w| w.strip_suffix('>'))
        .unwrap_or(word);

    match id.parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(ChannelId::new(id)),
    }
}
