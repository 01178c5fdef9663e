use crate::{
    config::Config, lifecycle::LifecycleCache, persistent_state::PersistentState,
    publish::Publisher, transport::SharedTransport, volatile_state::VolatileState,
    widget::WidgetRegistry,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Everything a plugin can reach while handling one event
pub struct Context<'a> {
    // Bot state
    pub cfg: &'a RwLock<Config>,
    pub pstate: &'a RwLock<PersistentState>,
    pub vstate: &'a RwLock<VolatileState>,
    // Serenity
    pub cache: &'a Arc<serenity::all::Cache>,
    pub http: &'a Arc<serenity::all::Http>,
    pub cache_http: &'a CacheHttp,
}

// The engines are cheap handles.  Plugins clone them out so no state lock is held while a post
// is published or a widget waits for reactions.
impl Context<'_> {
    pub async fn prefix(&self) -> String {
        self.cfg.read().await.general.command_prefix.clone()
    }

    pub async fn transport(&self) -> SharedTransport {
        self.vstate.read().await.transport.clone()
    }

    pub async fn lifecycle(&self) -> Arc<LifecycleCache> {
        self.vstate.read().await.lifecycle.clone()
    }

    pub async fn widgets(&self) -> WidgetRegistry {
        self.vstate.read().await.widgets.clone()
    }

    /// The publisher along with the token that aborts its pending prompts on shutdown.
    pub async fn publisher(&self) -> (Publisher, CancellationToken) {
        let vstate = self.vstate.read().await;
        (vstate.publisher.clone(), vstate.shutdown.clone())
    }
}

/// Serenity's `Context` is the handiest `impl CacheHttp` we get from a callback, but its name
/// clashes with ours.
pub type CacheHttp = serenity::all::Context;
