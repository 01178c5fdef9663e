mod clock;
mod config;
mod context;
mod error;
mod event;
mod fanout;
mod handler;
mod helper;
mod identity;
mod lifecycle;
mod logging;
mod ordered_set;
mod persistent_state;
mod plugin;
mod prompt;
mod publish;
mod reaction_hub;
mod repost;
mod transport;
mod volatile_state;
mod widget;

use serenity::{
    all::{GatewayIntents, Http},
    Client,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = crate::config::Config::load().await?;
    let token = cfg.general.discord_token.clone();
    let pstate = crate::persistent_state::PersistentState::load().await?;

    let transport = Arc::new(crate::transport::SerenityTransport::new(Arc::new(Http::new(
        &token,
    ))));
    let vstate = crate::volatile_state::VolatileState::new(&cfg, transport);
    vstate.spawn_sweepers(cfg.lifecycle.sweep_interval());
    let shutdown = vstate.shutdown.clone();

    let handler = handler::Handler::new(cfg, pstate, vstate);

    // Things we want discord to tell us about.
    let intents = GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::DIRECT_MESSAGE_REACTIONS
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::MESSAGE_CONTENT;

    let result = Client::builder(&token, intents)
        .event_handler(handler)
        .await?
        .start()
        .await
        .map_err(Into::into);

    shutdown.cancel();
    result
}
