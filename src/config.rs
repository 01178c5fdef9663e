use crate::{
    lifecycle::{DEFAULT_CASCADE_TOKEN, DEFAULT_TTL},
    publish::PromptSettings,
    repost::DEFAULT_RETENTION,
    widget::WidgetControls,
};
use anyhow::{anyhow, Result};
use std::{path::PathBuf, time::Duration};
use tokio::io::AsyncReadExt;

const CONFIG_PATH_REL_HOME: &str = ".config/artmirror/config.toml";

/// Bot configuration
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub general: General,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub prompt: Prompt,
    #[serde(default)]
    pub widget: Widget,
    #[serde(default)]
    pub repost: Repost,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct General {
    pub discord_token: String,
    pub bot_owners: Vec<String>,
    pub command_prefix: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Lifecycle {
    pub ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub cascade_emoji: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Prompt {
    pub timeout_seconds: u64,
    pub accept_emoji: String,
    pub decline_emoji: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Widget {
    pub idle_timeout_seconds: u64,
    pub prev_emoji: String,
    pub next_emoji: String,
    pub stop_emoji: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Repost {
    pub retention_hours: u64,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL.as_secs(),
            sweep_interval_seconds: 60,
            cascade_emoji: DEFAULT_CASCADE_TOKEN.to_owned(),
        }
    }
}

impl Default for Prompt {
    fn default() -> Self {
        let settings = PromptSettings::default();
        Self {
            timeout_seconds: settings.timeout.as_secs(),
            accept_emoji: settings.accept,
            decline_emoji: settings.decline,
        }
    }
}

impl Default for Widget {
    fn default() -> Self {
        let controls = WidgetControls::default();
        Self {
            idle_timeout_seconds: controls.idle_timeout.as_secs(),
            prev_emoji: controls.prev,
            next_emoji: controls.next,
            stop_emoji: controls.stop,
        }
    }
}

impl Default for Repost {
    fn default() -> Self {
        Self {
            retention_hours: DEFAULT_RETENTION.as_secs() / (60 * 60),
        }
    }
}

impl Lifecycle {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl Prompt {
    pub fn as_prompt_settings(&self) -> PromptSettings {
        PromptSettings {
            accept: self.accept_emoji.clone(),
            decline: self.decline_emoji.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }
}

impl Widget {
    pub fn as_controls(&self) -> WidgetControls {
        WidgetControls {
            prev: self.prev_emoji.clone(),
            next: self.next_emoji.clone(),
            stop: self.stop_emoji.clone(),
            idle_timeout: Duration::from_secs(self.idle_timeout_seconds),
        }
    }
}

impl Repost {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 60 * 60)
    }
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(CONFIG_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            anyhow!(
                "Could not open configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Self::parse(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })
    }

    fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub async fn reload(&mut self) -> Result<()> {
        let new = Self::load().await?;
        *self = new;
        Ok(())
    }
}
