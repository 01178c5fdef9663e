use crate::{
    event::*,
    helper::*,
    persistent_state::GuildSettings,
    plugin::*,
    repost::{DedupScope, RepostMode},
    transport::{Embed, Payload},
};
use anyhow::Result;

/// Per-guild settings, changeable by guild admins.
pub struct Settings;

#[serenity::async_trait]
impl Plugin for Settings {
    fn name(&self) -> &'static str {
        "set"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = ctx.prefix().await;
        Some(format!(
            "{0}{1} - show this server's settings\n\
             {0}{1} repost <disabled|enabled|strict> - how reposts are handled (admin only)\n\
             {0}{1} scope <guild|channel> - where a post counts as a repost (admin only)\n\
             {0}{1} <pixiv|twitter|crosspost> <on|off> - toggle a feature (admin only)",
            prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, rest)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        let Some(guild_id) = msg.guild_id else {
            msg.reply(ctx.cache_http, "Settings only exist inside a server.")
                .await?;
            return Ok(EventHandled::Yes);
        };

        let words = args(rest);
        let transport = ctx.transport().await;

        let [key, value] = words.as_slice() else {
            if !words.is_empty() {
                msg.reply(ctx.cache_http, "Expected a setting and a value.")
                    .await?;
                return Ok(EventHandled::Yes);
            }
            let settings = ctx.pstate.read().await.guild(guild_id);
            transport
                .send_message(msg.channel_id, &settings_embed(&settings))
                .await?;
            return Ok(EventHandled::Yes);
        };

        if !msg.is_from_admin(ctx).await {
            msg.reply(ctx.cache_http, "Only server admins can change settings.")
                .await?;
            return Ok(EventHandled::Yes);
        }

        let response = {
            let mut pstate = ctx.pstate.write().await;
            match apply(pstate.guild_mut(guild_id), key, value) {
                Ok(response) => {
                    pstate.save().await?;
                    response
                }
                Err(e) => e,
            }
        };

        msg.reply(ctx.cache_http, response).await?;
        Ok(EventHandled::Yes)
    }
}

fn parse_toggle(value: &str) -> std::result::Result<bool, String> {
    match value {
        "on" | "true" | "enabled" => Ok(true),
        "off" | "false" | "disabled" => Ok(false),
        other => Err(format!("Expected `on` or `off`, got `{}`.", other)),
    }
}

/// Changes one setting and describes the change.
fn apply(
    settings: &mut GuildSettings,
    key: &str,
    value: &str,
) -> std::result::Result<String, String> {
    match key {
        "repost" => {
            settings.repost = value.parse::<RepostMode>()?;
            Ok(format!("Repost checking is now `{}`.", settings.repost))
        }
        "scope" => {
            settings.dedup_scope = value.parse::<DedupScope>()?;
            Ok(format!(
                "Reposts are now detected per {}.",
                settings.dedup_scope
            ))
        }
        "pixiv" | "twitter" | "crosspost" => {
            let enabled = parse_toggle(value)?;
            let field = match key {
                "pixiv" => &mut settings.pixiv,
                "twitter" => &mut settings.twitter,
                _ => &mut settings.crosspost,
            };
            *field = enabled;
            Ok(format!(
                "`{}` is now {}.",
                key,
                if enabled { "on" } else { "off" }
            ))
        }
        other => Err(format!("Unknown setting `{}`.", other)),
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn settings_embed(settings: &GuildSettings) -> Payload {
    Payload::embed(
        Embed::new()
            .title("Server settings")
            .field("Pixiv", on_off(settings.pixiv), true)
            .field("Twitter", on_off(settings.twitter), true)
            .field("Crosspost", on_off(settings.crosspost), true)
            .field("Repost", settings.repost.to_string(), true)
            .field("Repost scope", settings.dedup_scope.to_string(), true),
    )
}
