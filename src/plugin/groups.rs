use crate::{
    event::*,
    helper::*,
    log_internal,
    logging::PrintId,
    persistent_state::{CrosspostGroup, GroupError},
    plugin::*,
    transport::{Embed, Payload},
};
use anyhow::Result;
use serenity::all::ChannelId;

const GROUPS_PER_PAGE: usize = 5;

/// Management of a user's crosspost groups.
pub struct Groups;

#[serenity::async_trait]
impl Plugin for Groups {
    fn name(&self) -> &'static str {
        "group"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = ctx.prefix().await;
        Some(format!(
            "{0}{1} create <name> <parent channel> - posts in the parent get mirrored to the group\n\
             {0}{1} delete <name>\n\
             {0}{1} list - show your groups\n\
             {0}{1} push <name> <channels...> - add channels to a group\n\
             {0}{1} pop <name> <channels...> - remove channels from a group\n\
             {0}{1} copy <source> <destination> <new parent channel>",
            prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, rest)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        let words = args(rest);
        let user = msg.author.id;

        if let ["list"] = words.as_slice() {
            let groups = ctx.pstate.read().await.groups(user).to_vec();
            let pages = list_pages(&msg.author.name, &groups);
            let widgets = ctx.widgets().await;
            let widget = widgets.start(user, msg.channel_id, pages).await?;
            if !widget.is_closed() {
                tokio::spawn(async move {
                    widget.closed().await;
                    log_internal!(
                        "Group list {} closed on page {} of {}",
                        widget.message().color_id(),
                        widget.current() + 1,
                        widget.pages(),
                    );
                });
            }
            return Ok(EventHandled::Yes);
        }

        let response = {
            let mut pstate = ctx.pstate.write().await;
            let outcome = match words.as_slice() {
                ["create", name, parent] => match parse_channel(parent) {
                    Some(parent) => pstate
                        .create_group(user, name, parent)
                        .map(|()| format!("Created group `{}` posting from <#{}>.", name, parent)),
                    None => Ok(format!("`{}` is not a channel.", parent)),
                },
                ["delete", name] => pstate
                    .delete_group(user, name)
                    .map(|g| format!("Deleted group `{}`.", g.name)),
                ["push", name, channels @ ..] if !channels.is_empty() => {
                    let channels = parse_channels(channels);
                    pstate
                        .add_to_group(user, name, &channels)
                        .map(|added| changed("Added", &added, name))
                }
                ["pop", name, channels @ ..] if !channels.is_empty() => {
                    let channels = parse_channels(channels);
                    pstate
                        .remove_from_group(user, name, &channels)
                        .map(|removed| changed("Removed", &removed, name))
                }
                ["copy", src, dest, parent] => match parse_channel(parent) {
                    Some(parent) => pstate
                        .copy_group(user, src, dest, parent)
                        .map(|g| format!("Copied `{}` to `{}` posting from <#{}>.", src, g.name, g.parent)),
                    None => Ok(format!("`{}` is not a channel.", parent)),
                },
                _ => Ok("Invalid command.  See `help`.".to_owned()),
            };

            match outcome {
                Ok(response) => {
                    pstate.save().await?;
                    // An open listing no longer matches the saved groups.
                    ctx.widgets().await.close(user, msg.channel_id);
                    response
                }
                Err(e) => error_text(&e),
            }
        };

        msg.reply(ctx.cache_http, response).await?;
        Ok(EventHandled::Yes)
    }
}

fn parse_channels(words: &[&str]) -> Vec<ChannelId> {
    words.iter().filter_map(|w| parse_channel(w)).collect()
}

fn mentions(channels: &[ChannelId]) -> String {
    channels
        .iter()
        .map(|c| format!("<#{}>", c))
        .collect::<Vec<_>>()
        .join(" ")
}

fn changed(verb: &str, channels: &[ChannelId], name: &str) -> String {
    if channels.is_empty() {
        format!("No valid channels were found for `{}`.", name)
    } else {
        format!("{} {} in `{}`.", verb, mentions(channels), name)
    }
}

fn error_text(e: &GroupError) -> String {
    let mut text = e.to_string();
    if let Some(first) = text.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    text.push('.');
    text
}

/// One embed per `GROUPS_PER_PAGE` groups.
fn list_pages(owner: &str, groups: &[CrosspostGroup]) -> Vec<Payload> {
    let title = format!("{}'s crosspost groups", owner);
    if groups.is_empty() {
        return vec![Payload::embed(
            Embed::new()
                .title(title)
                .description("No groups yet.  Create one with `group create`."),
        )];
    }

    let pages = groups.chunks(GROUPS_PER_PAGE).len();
    groups
        .chunks(GROUPS_PER_PAGE)
        .enumerate()
        .map(|(i, chunk)| {
            let mut embed = Embed::new()
                .title(title.clone())
                .footer(format!("Page {} of {}", i + 1, pages));
            for group in chunk {
                let children = if group.children.is_empty() {
                    "-".to_owned()
                } else {
                    mentions(&group.children)
                };
                embed = embed.field(
                    &group.name,
                    format!("**Parent:** <#{}>\n**Children:** {}", group.parent, children),
                    false,
                );
            }
            Payload::embed(embed)
        })
        .collect()
}
