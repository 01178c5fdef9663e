use crate::{event::*, helper::*, lifecycle::LifecycleOutcome, log_internal, logging::*, plugin::*};
use anyhow::Result;

/// Removes the bot's posts when their author reacts with the cascade emoji or deletes the post.
pub struct Lifecycle;

#[serenity::async_trait]
impl Plugin for Lifecycle {
    fn name(&self) -> &'static str {
        "lifecycle"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let token = ctx.cfg.read().await.lifecycle.cascade_emoji.clone();
        Some(format!(
            "react {} on your post - remove it together with every mirror of it",
            token
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let lifecycle = ctx.lifecycle().await;

        let outcome = match event {
            Event::ReactionAdd(reaction) => {
                let (Some(user), Some(token)) = (reaction.user_id, reaction.emoji.token()) else {
                    return Ok(EventHandled::No);
                };
                lifecycle
                    .on_reaction(reaction.message_id, user, &token)
                    .await
            }
            Event::MessageDelete { message_id, .. } => {
                lifecycle.on_external_deletion(*message_id).await
            }
            _ => return Ok(EventHandled::No),
        };

        if let LifecycleOutcome::MemberRemoved(member) = outcome {
            log_internal!("Dropped {} from its post", member.color_id());
        }

        // Prompts and widgets may be waiting on the same message.
        Ok(EventHandled::No)
    }
}
