//! The chat transport as seen by the orchestration core.
//!
//! Everything the core needs from Discord is a handful of primitives on messages and reactions.
//! Keeping them behind a trait lets the core run against an in-memory fake in tests, while the
//! bot itself plugs in [`SerenityTransport`].

use crate::error::Result;
use serenity::all::{
    ChannelId, CreateEmbed, CreateEmbedFooter, CreateMessage, EditMessage, Http, MessageId,
    ReactionType, UserId,
};
use std::sync::Arc;

/// Location of a message the bot can act on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel: ChannelId,
    pub message: MessageId,
}

impl MessageRef {
    pub fn new(channel: ChannelId, message: MessageId) -> Self {
        Self { channel, message }
    }
}

/// Transport-independent rich message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Payload {
    pub content: Option<String>,
    pub embed: Option<Embed>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub image: Option<String>,
    pub thumbnail: Option<String>,
    pub footer: Option<String>,
    pub color: Option<u32>,
    pub fields: Vec<EmbedField>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

pub const EMBED_COLOR: u32 = 0x439ef1;

impl Payload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embed: None,
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embed: Some(embed),
        }
    }
}

impl Embed {
    pub fn new() -> Self {
        Self {
            color: Some(EMBED_COLOR),
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

#[serenity::async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, channel: ChannelId, payload: &Payload) -> Result<MessageRef>;
    async fn edit_message(&self, target: MessageRef, payload: &Payload) -> Result<()>;
    async fn delete_message(&self, target: MessageRef) -> Result<()>;
    async fn add_reaction(&self, target: MessageRef, token: &str) -> Result<()>;
    /// Removes one user's reaction, e.g. so a pagination button can be pressed again.
    async fn remove_reaction(&self, target: MessageRef, user: UserId, token: &str) -> Result<()>;
}

pub type SharedTransport = Arc<dyn Transport>;

/// [`Transport`] over serenity's HTTP client.
pub struct SerenityTransport {
    http: Arc<Http>,
}

impl SerenityTransport {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

impl From<&Embed> for CreateEmbed {
    fn from(embed: &Embed) -> Self {
        let mut builder = CreateEmbed::new();
        if let Some(title) = &embed.title {
            builder = builder.title(title);
        }
        if let Some(description) = &embed.description {
            builder = builder.description(description);
        }
        if let Some(url) = &embed.url {
            builder = builder.url(url);
        }
        if let Some(image) = &embed.image {
            builder = builder.image(image);
        }
        if let Some(thumbnail) = &embed.thumbnail {
            builder = builder.thumbnail(thumbnail);
        }
        if let Some(footer) = &embed.footer {
            builder = builder.footer(CreateEmbedFooter::new(footer));
        }
        if let Some(color) = embed.color {
            builder = builder.color(color);
        }
        for field in &embed.fields {
            builder = builder.field(&field.name, &field.value, field.inline);
        }
        builder
    }
}

fn reaction(token: &str) -> ReactionType {
    ReactionType::Unicode(token.to_owned())
}

#[serenity::async_trait]
impl Transport for SerenityTransport {
    async fn send_message(&self, channel: ChannelId, payload: &Payload) -> Result<MessageRef> {
        let mut builder = CreateMessage::new();
        if let Some(content) = &payload.content {
            builder = builder.content(content);
        }
        if let Some(embed) = &payload.embed {
            builder = builder.embed(embed.into());
        }

        let msg = channel.send_message(&self.http, builder).await?;
        Ok(MessageRef::new(msg.channel_id, msg.id))
    }

    async fn edit_message(&self, target: MessageRef, payload: &Payload) -> Result<()> {
        // Editing replaces the whole message, so an absent part has to be cleared explicitly.
        let mut builder = EditMessage::new().content(payload.content.clone().unwrap_or_default());
        builder = match &payload.embed {
            Some(embed) => builder.embed(embed.into()),
            None => builder.embeds(Vec::new()),
        };

        target
            .channel
            .edit_message(&self.http, target.message, builder)
            .await?;
        Ok(())
    }

    async fn delete_message(&self, target: MessageRef) -> Result<()> {
        target
            .channel
            .delete_message(&self.http, target.message)
            .await?;
        Ok(())
    }

    async fn add_reaction(&self, target: MessageRef, token: &str) -> Result<()> {
        target
            .channel
            .create_reaction(&self.http, target.message, reaction(token))
            .await?;
        Ok(())
    }

    async fn remove_reaction(&self, target: MessageRef, user: UserId, token: &str) -> Result<()> {
        target
            .channel
            .delete_reaction(&self.http, target.message, Some(user), reaction(token))
            .await?;
        Ok(())
    }
}

/// In-memory transport that records every call.
#[cfg(test)]
pub mod fake {
    use super::*;
    use crate::error::Error;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    pub enum Call {
        Send(MessageRef, Payload),
        Edit(MessageRef, Payload),
        Delete(MessageRef),
        React(MessageRef, String),
        Unreact(MessageRef, UserId, String),
    }

    pub struct FakeTransport {
        next_id: AtomicU64,
        calls: Mutex<Vec<Call>>,
        failing_channels: Mutex<HashSet<ChannelId>>,
        failing_deletes: Mutex<HashSet<MessageId>>,
    }

    impl FakeTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                next_id: AtomicU64::new(1000),
                calls: Mutex::new(Vec::new()),
                failing_channels: Mutex::new(HashSet::new()),
                failing_deletes: Mutex::new(HashSet::new()),
            })
        }

        /// Sends and edits in `channel` fail from now on.
        pub fn fail_channel(&self, channel: ChannelId) {
            self.failing_channels.lock().unwrap().insert(channel);
        }

        pub fn fail_delete(&self, message: MessageId) {
            self.failing_deletes.lock().unwrap().insert(message);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn sent(&self) -> Vec<(MessageRef, Payload)> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Send(target, payload) => Some((target, payload)),
                    _ => None,
                })
                .collect()
        }

        pub fn deleted(&self) -> Vec<MessageId> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Delete(target) => Some(target.message),
                    _ => None,
                })
                .collect()
        }

        pub fn edits(&self) -> Vec<(MessageRef, Payload)> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Edit(target, payload) => Some((target, payload)),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[serenity::async_trait]
    impl Transport for FakeTransport {
        async fn send_message(&self, channel: ChannelId, payload: &Payload) -> Result<MessageRef> {
            if self.failing_channels.lock().unwrap().contains(&channel) {
                return Err(Error::Transport("Missing Access".to_owned()));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let target = MessageRef::new(channel, MessageId::new(id));
            self.record(Call::Send(target, payload.clone()));
            Ok(target)
        }

        async fn edit_message(&self, target: MessageRef, payload: &Payload) -> Result<()> {
            if self.failing_channels.lock().unwrap().contains(&target.channel) {
                return Err(Error::Transport("Missing Access".to_owned()));
            }
            self.record(Call::Edit(target, payload.clone()));
            Ok(())
        }

        async fn delete_message(&self, target: MessageRef) -> Result<()> {
            self.record(Call::Delete(target));
            if self.failing_deletes.lock().unwrap().contains(&target.message) {
                return Err(Error::Transport("Unknown Message".to_owned()));
            }
            Ok(())
        }

        async fn add_reaction(&self, target: MessageRef, token: &str) -> Result<()> {
            self.record(Call::React(target, token.to_owned()));
            Ok(())
        }

        async fn remove_reaction(
            &self,
            target: MessageRef,
            user: UserId,
            token: &str,
        ) -> Result<()> {
            self.record(Call::Unreact(target, user, token.to_owned()));
            Ok(())
        }
    }
}
