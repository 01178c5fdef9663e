//! Repost detection.
//!
//! The table only answers "was this seen here recently" and records deliveries.  What to do with
//! the answer depends on the guild's [`RepostMode`] and is decided by the publishing flow.

use crate::clock::SharedClock;
use serenity::all::{ChannelId, GuildId, MessageId, UserId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepostMode {
    /// Never look for reposts and never record posts.
    #[default]
    Disabled,
    /// Ask the poster to confirm before reposting.
    Enabled,
    /// Refuse reposts outright.
    Strict,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    #[default]
    Guild,
    Channel,
}

impl std::str::FromStr for RepostMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" | "off" => Ok(RepostMode::Disabled),
            "enabled" | "on" => Ok(RepostMode::Enabled),
            "strict" => Ok(RepostMode::Strict),
            other => Err(format!("unknown repost mode `{}`", other)),
        }
    }
}

impl std::str::FromStr for DedupScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guild" | "server" => Ok(DedupScope::Guild),
            "channel" => Ok(DedupScope::Channel),
            other => Err(format!("unknown repost scope `{}`", other)),
        }
    }
}

impl std::fmt::Display for RepostMode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RepostMode::Disabled => write!(f, "disabled"),
            RepostMode::Enabled => write!(f, "enabled"),
            RepostMode::Strict => write!(f, "strict"),
        }
    }
}

impl std::fmt::Display for DedupScope {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DedupScope::Guild => write!(f, "guild"),
            DedupScope::Channel => write!(f, "channel"),
        }
    }
}

/// Boundary within which an identity key must be unique.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Guild(GuildId),
    Channel(ChannelId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RepostPolicy {
    pub mode: RepostMode,
    pub scope: DedupScope,
}

impl RepostPolicy {
    /// Direct messages have no guild and always dedup per channel.
    pub fn scope_for(&self, guild: Option<GuildId>, channel: ChannelId) -> Scope {
        match (self.scope, guild) {
            (DedupScope::Guild, Some(guild)) => Scope::Guild(guild),
            _ => Scope::Channel(channel),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RepostRecord {
    pub identity_key: String,
    pub scope: Scope,
    pub posted_at: Instant,
    pub posted_by: UserId,
    pub channel: ChannelId,
    pub message: Option<MessageId>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Classification {
    New,
    Repost(RepostRecord),
}

pub struct RepostTable {
    clock: SharedClock,
    retention: Duration,
    records: Mutex<HashMap<(Scope, String), RepostRecord>>,
}

impl RepostTable {
    pub fn new(clock: SharedClock, retention: Duration) -> Self {
        Self {
            clock,
            retention,
            records: Mutex::new(HashMap::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<(Scope, String), RepostRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_live(&self, record: &RepostRecord, now: Instant) -> bool {
        now.duration_since(record.posted_at) < self.retention
    }

    /// Looks `identity_key` up in `scope`.  Has no side effects.
    pub fn classify(&self, scope: Scope, identity_key: &str) -> Classification {
        let now = self.clock.now();
        match self.records().get(&(scope, identity_key.to_owned())) {
            Some(record) if self.is_live(record, now) => Classification::Repost(record.clone()),
            _ => Classification::New,
        }
    }

    /// Records a delivered post, replacing any earlier record for the same key and scope.
    pub fn commit(
        &self,
        scope: Scope,
        identity_key: &str,
        posted_by: UserId,
        channel: ChannelId,
        message: Option<MessageId>,
    ) {
        let record = RepostRecord {
            identity_key: identity_key.to_owned(),
            scope,
            posted_at: self.clock.now(),
            posted_by,
            channel,
            message,
        };
        self.records()
            .insert((scope, identity_key.to_owned()), record);
    }

    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, record| now.duration_since(record.posted_at) < self.retention);
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
