use crate::{
    event::*,
    helper::*,
    plugin::*,
    reaction_hub::ReactionEvent,
    transport::MessageRef,
};
use anyhow::Result;

/// Hands reactions and deletions to whatever prompt or widget is waiting on the message.
pub struct Reactions;

#[serenity::async_trait]
impl Plugin for Reactions {
    fn name(&self) -> &'static str {
        "reactions"
    }

    async fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let hub = ctx.vstate.read().await.hub.clone();

        let delivered = match event {
            Event::ReactionAdd(reaction) => {
                let (Some(user), Some(token)) = (reaction.user_id, reaction.emoji.token()) else {
                    return Ok(EventHandled::No);
                };
                hub.dispatch_reaction(ReactionEvent {
                    message: MessageRef::new(reaction.channel_id, reaction.message_id),
                    user,
                    token,
                })
            }
            Event::MessageDelete {
                channel_id,
                message_id,
                ..
            } => hub.dispatch_deletion(MessageRef::new(*channel_id, *message_id)),
            _ => return Ok(EventHandled::No),
        };

        if delivered > 0 {
            Ok(EventHandled::Yes)
        } else {
            Ok(EventHandled::No)
        }
    }
}
