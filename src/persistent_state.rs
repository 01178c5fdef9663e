use crate::{
    ordered_set::OrderedSet,
    repost::{DedupScope, RepostMode, RepostPolicy},
};
use anyhow::{anyhow, Result};
use serenity::all::{ChannelId, GuildId, UserId};
use std::{collections::HashMap, path::PathBuf};
use tokio::io::AsyncReadExt;

const PSTATE_PATH_REL_HOME: &str = ".config/artmirror/state.toml";

/// State which persists across sessions
#[derive(Default, serde::Serialize, serde::Deserialize)]
pub struct PersistentState {
    /// Keyed by guild id; TOML tables need string keys.
    #[serde(default)]
    pub guilds: HashMap<String, GuildSettings>,
    /// Keyed by user id.
    #[serde(default)]
    pub users: HashMap<String, UserSettings>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GuildSettings {
    pub pixiv: bool,
    pub twitter: bool,
    pub crosspost: bool,
    pub repost: RepostMode,
    pub dedup_scope: DedupScope,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            pixiv: true,
            twitter: false,
            crosspost: true,
            repost: RepostMode::Disabled,
            dedup_scope: DedupScope::Guild,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub groups: Vec<CrosspostGroup>,
}

/// Channels a user's posts in `parent` are mirrored to.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CrosspostGroup {
    pub name: String,
    pub parent: ChannelId,
    #[serde(default)]
    pub children: Vec<ChannelId>,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum GroupError {
    #[error("a group named `{0}` already exists")]
    NameTaken(String),
    #[error("no group named `{0}`")]
    NotFound(String),
    #[error("<#{0}> is already the parent of group `{1}`")]
    AlreadyParent(ChannelId, String),
}

impl PersistentState {
    fn config_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(PSTATE_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    /// Loads the saved state.  A missing file is a fresh install, not an error.
    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(anyhow!(
                    "Could not open state at `{}`: {}",
                    path.to_string_lossy(),
                    e
                ))
            }
        };

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read state at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let pstate: PersistentState = toml::from_str(&contents).map_err(|e| {
            anyhow!(
                "Could not parse state at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Ok(pstate)
    }

    pub async fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let pstate_str = toml::to_string_pretty(&self)
            .map_err(|e| anyhow!("Could not serialize state: {}", e))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                anyhow!(
                    "Could not create directory `{}`: {}",
                    parent.to_string_lossy(),
                    e
                )
            })?;
        }

        // Create a temporary file in the same directory.
        let tmp_path = path.with_extension("toml.new");

        tokio::fs::write(&tmp_path, pstate_str).await.map_err(|e| {
            anyhow!(
                "Could not write state to temporary file `{}`: {}",
                tmp_path.to_string_lossy(),
                e
            )
        })?;

        // Atomically rename the temporary file over the target file.
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            anyhow!(
                "Could not rename temporary file `{}` to `{}`: {}",
                tmp_path.to_string_lossy(),
                path.to_string_lossy(),
                e
            )
        })?;

        Ok(())
    }

    pub fn guild(&self, guild: GuildId) -> GuildSettings {
        self.guilds
            .get(&guild.to_string())
            .cloned()
            .unwrap_or_default()
    }

    pub fn guild_mut(&mut self, guild: GuildId) -> &mut GuildSettings {
        self.guilds.entry(guild.to_string()).or_default()
    }

    /// Drops a guild's settings.  Returns whether it had any.
    pub fn forget_guild(&mut self, guild: GuildId) -> bool {
        self.guilds.remove(&guild.to_string()).is_some()
    }

    /// Repost policy for messages in `guild`.  Direct messages never check for reposts.
    pub fn repost_policy(&self, guild: Option<GuildId>) -> RepostPolicy {
        match guild {
            Some(guild) => {
                let settings = self.guild(guild);
                RepostPolicy {
                    mode: settings.repost,
                    scope: settings.dedup_scope,
                }
            }
            None => RepostPolicy::default(),
        }
    }

    pub fn groups(&self, user: UserId) -> &[CrosspostGroup] {
        self.users
            .get(&user.to_string())
            .map(|u| u.groups.as_slice())
            .unwrap_or_default()
    }

    fn groups_mut(&mut self, user: UserId) -> &mut Vec<CrosspostGroup> {
        &mut self.users.entry(user.to_string()).or_default().groups
    }

    fn group_mut(
        &mut self,
        user: UserId,
        name: &str,
    ) -> std::result::Result<&mut CrosspostGroup, GroupError> {
        self.groups_mut(user)
            .iter_mut()
            .find(|g| g.name == name)
            .ok_or_else(|| GroupError::NotFound(name.to_owned()))
    }

    fn check_free(
        &self,
        user: UserId,
        name: &str,
        parent: ChannelId,
    ) -> std::result::Result<(), GroupError> {
        for group in self.groups(user) {
            if group.name == name {
                return Err(GroupError::NameTaken(name.to_owned()));
            }
            if group.parent == parent {
                return Err(GroupError::AlreadyParent(parent, group.name.clone()));
            }
        }
        Ok(())
    }

    pub fn create_group(
        &mut self,
        user: UserId,
        name: &str,
        parent: ChannelId,
    ) -> std::result::Result<(), GroupError> {
        self.check_free(user, name, parent)?;
        self.groups_mut(user).push(CrosspostGroup {
            name: name.to_owned(),
            parent,
            children: Vec::new(),
        });
        Ok(())
    }

    pub fn delete_group(
        &mut self,
        user: UserId,
        name: &str,
    ) -> std::result::Result<CrosspostGroup, GroupError> {
        let groups = self.groups_mut(user);
        let index = groups
            .iter()
            .position(|g| g.name == name)
            .ok_or_else(|| GroupError::NotFound(name.to_owned()))?;
        Ok(groups.remove(index))
    }

    /// Adds `channels` to the group and returns the ones that were not in it yet.  The group's
    /// own parent is never added as a child.
    pub fn add_to_group(
        &mut self,
        user: UserId,
        name: &str,
        channels: &[ChannelId],
    ) -> std::result::Result<Vec<ChannelId>, GroupError> {
        let group = self.group_mut(user, name)?;
        let mut added = Vec::new();
        for &channel in channels {
            if channel != group.parent && !group.children.contains(&channel) {
                group.children.push(channel);
                added.push(channel);
            }
        }
        Ok(added)
    }

    /// Removes `channels` from the group and returns the ones that were actually in it.
    pub fn remove_from_group(
        &mut self,
        user: UserId,
        name: &str,
        channels: &[ChannelId],
    ) -> std::result::Result<Vec<ChannelId>, GroupError> {
        let group = self.group_mut(user, name)?;
        let removed: Vec<ChannelId> = channels
            .iter()
            .copied()
            .filter(|c| group.children.contains(c))
            .collect::<OrderedSet<_>>()
            .into_iter()
            .collect();
        group.children.retain(|c| !removed.contains(c));
        Ok(removed)
    }

    /// Copies group `src` to a new group `dest` posting from `parent`.  If the new parent was
    /// one of the children, the old parent takes its place.
    pub fn copy_group(
        &mut self,
        user: UserId,
        src: &str,
        dest: &str,
        parent: ChannelId,
    ) -> std::result::Result<CrosspostGroup, GroupError> {
        let original = self
            .groups(user)
            .iter()
            .find(|g| g.name == src)
            .cloned()
            .ok_or_else(|| GroupError::NotFound(src.to_owned()))?;
        self.check_free(user, dest, parent)?;

        let children = original
            .children
            .iter()
            .map(|&c| if c == parent { original.parent } else { c })
            .collect();
        let copy = CrosspostGroup {
            name: dest.to_owned(),
            parent,
            children,
        };
        self.groups_mut(user).push(copy.clone());
        Ok(copy)
    }

    /// Where a post by `user` in `parent` should be mirrored to.
    pub fn crosspost_targets(&self, user: UserId, parent: ChannelId) -> Vec<ChannelId> {
        self.groups(user)
            .iter()
            .filter(|g| g.parent == parent)
            .flat_map(|g| g.children.iter().copied())
            .filter(|&c| c != parent)
            .collect::<OrderedSet<_>>()
            .into_iter()
            .collect()
    }
}
