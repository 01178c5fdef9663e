use crate::{
    event::*,
    plugin::*,
    transport::{Embed, Payload},
};
use anyhow::Result;

/// Lists every command in an embed, one field per plugin.
pub struct Help;

#[serenity::async_trait]
impl Plugin for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = ctx.prefix().await;
        Some(format!("{}{} - show this help message", prefix, self.name()))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, _)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        let mut entries = Vec::new();
        for plugin in crate::plugin::plugins() {
            if let Some(usage) = plugin.usage(ctx).await {
                entries.push((plugin.name(), usage));
            }
        }

        let cascade = ctx.lifecycle().await.cascade_token().to_owned();
        ctx.transport()
            .await
            .send_message(msg.channel_id, &help_embed(&entries, &cascade))
            .await?;
        Ok(EventHandled::Yes)
    }
}

fn help_embed(entries: &[(&str, String)], cascade: &str) -> Payload {
    let mut embed = Embed::new().title("Commands");
    for (name, usage) in entries {
        embed = embed.field(*name, usage, false);
    }
    Payload::embed(embed.footer(format!(
        "React {} on your post to remove it along with its crossposts",
        cascade
    )))
}
