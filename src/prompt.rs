//! Yes/no questions answered by reacting to the bot's message.

use crate::{
    error::{Error, Result},
    log_error, log_internal,
    logging::PrintId,
    reaction_hub::{MessageEvent, ReactionFilter, ReactionHub},
    transport::{Payload, SharedTransport},
};
use serenity::all::{ChannelId, UserId};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_ACCEPT_TOKEN: &str = "👌";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct PromptRequest {
    pub requester: UserId,
    pub channel: ChannelId,
    pub message: Payload,
    /// Reactions that answer "yes".
    pub accept: Vec<String>,
    /// Reactions that answer "no" right away instead of waiting for the deadline.
    pub decline: Vec<String>,
    pub timeout: Duration,
}

impl PromptRequest {
    pub fn new(requester: UserId, channel: ChannelId, message: Payload) -> Self {
        Self {
            requester,
            channel,
            message,
            accept: vec![DEFAULT_ACCEPT_TOKEN.to_owned()],
            decline: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn accept<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accept = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn decline<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decline = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How a prompt ended.  Only `Accepted` counts as a yes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptResolution {
    Accepted,
    Declined,
    TimedOut,
    Cancelled,
    /// The prompt message was deleted before anyone answered.
    Deleted,
}

impl PromptResolution {
    pub fn is_accepted(self) -> bool {
        self == PromptResolution::Accepted
    }
}

#[derive(Clone)]
pub struct ConfirmationPrompt {
    transport: SharedTransport,
    hub: ReactionHub,
}

impl ConfirmationPrompt {
    pub fn new(transport: SharedTransport, hub: ReactionHub) -> Self {
        Self { transport, hub }
    }

    /// Shows the prompt and waits for the requester's answer.
    pub async fn ask(&self, request: PromptRequest, cancel: &CancellationToken) -> Result<bool> {
        self.resolve(request, cancel)
            .await
            .map(PromptResolution::is_accepted)
    }

    pub async fn resolve(
        &self,
        request: PromptRequest,
        cancel: &CancellationToken,
    ) -> Result<PromptResolution> {
        let deadline = Instant::now() + request.timeout;

        let prompt = self
            .transport
            .send_message(request.channel, &request.message)
            .await
            .map_err(|e| Error::PromptDelivery(e.to_string()))?;

        // Subscribe before adding the affordances so an early click is not lost.
        let mut subscription = self.hub.subscribe(
            prompt.message,
            ReactionFilter::any()
                .from_user(request.requester)
                .tokens(request.accept.iter().chain(&request.decline).cloned()),
        );

        for token in request.accept.iter().chain(&request.decline) {
            if let Err(e) = self.transport.add_reaction(prompt, token).await {
                log_error!("Could not add {} to prompt {}: {}", token, prompt.color_id(), e);
            }
        }

        let resolution = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break PromptResolution::Cancelled,
                _ = tokio::time::sleep_until(deadline) => break PromptResolution::TimedOut,
                event = subscription.recv() => match event {
                    Some(MessageEvent::Reaction(r)) if request.accept.contains(&r.token) => {
                        break PromptResolution::Accepted
                    }
                    Some(MessageEvent::Reaction(r)) if request.decline.contains(&r.token) => {
                        break PromptResolution::Declined
                    }
                    Some(MessageEvent::Reaction(_)) => continue,
                    Some(MessageEvent::Deleted(_)) | None => break PromptResolution::Deleted,
                },
            }
        };
        drop(subscription);

        log_internal!(
            "Prompt {} for {}: {:?}",
            prompt.color_id(),
            request.requester.color_id(),
            resolution,
        );
        Ok(resolution)
    }
}
