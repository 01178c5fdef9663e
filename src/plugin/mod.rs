pub use crate::context::Context;
use crate::event::{Event, EventHandled};
use anyhow::Result;

mod art;
mod crosspost;
mod debug;
mod groups;
mod help;
mod ignore_bots;
mod lifecycle;
mod reactions;
mod ready;
mod reload;
mod settings;

#[serenity::async_trait]
pub trait Plugin: Sync + Send {
    /// Plugin name.  Used for debug and as the command word for command plugins
    fn name(&self) -> &'static str;
    /// Help message line.  None if no help message
    async fn usage(&self, ctx: &Context) -> Option<String>;
    /// Potentially handle event.  Returns:
    /// - Ok(EventHandled::Yes) if the event has been handled and no other plugin should attempt to
    /// handle it
    /// - Ok(EventHandled::No) if another plugin should attempt to handle the event
    /// - Err if an error occurred
    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled>;
}

/// Ordered list of available plugins
pub fn plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        // Core bot operations
        Box::new(debug::Debug),
        Box::new(ready::Ready),
        Box::new(ignore_bots::IgnoreBots),
        // Message lifecycle.  Both see every reaction and deletion, so neither claims them.
        Box::new(lifecycle::Lifecycle),
        Box::new(reactions::Reactions),
        // Commands
        Box::new(help::Help),
        Box::new(reload::Reload),
        Box::new(settings::Settings),
        Box::new(groups::Groups),
        Box::new(crosspost::Crosspost),
        // Prefixless art links.  Keep last.
        Box::new(art::Art),
    ]
}
