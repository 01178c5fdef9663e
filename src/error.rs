use serenity::all::MessageId;

/// Failures of the post orchestration core.
///
/// Untracked messages and prompt timeouts have no variant: the former are silent no-ops and the
/// latter is a regular negative answer.  Per-channel crosspost failures are collected in
/// [`crate::fanout::FanoutResult`] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("message {0} already roots a tracked post")]
    DuplicateRoot(MessageId),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not show confirmation prompt: {0}")]
    PromptDelivery(String),

    #[error("nothing to show")]
    NoPages,
}

impl From<serenity::Error> for Error {
    fn from(err: serenity::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
