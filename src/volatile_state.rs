use crate::{
    clock::{SharedClock, TokioClock},
    config::Config,
    identity::LinkNormalizer,
    lifecycle::LifecycleCache,
    log_internal,
    prompt::ConfirmationPrompt,
    publish::Publisher,
    reaction_hub::ReactionHub,
    repost::RepostTable,
    transport::SharedTransport,
    widget::WidgetRegistry,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// State which is lost across sessions
pub struct VolatileState {
    pub transport: SharedTransport,
    pub hub: ReactionHub,
    pub lifecycle: Arc<LifecycleCache>,
    pub reposts: Arc<RepostTable>,
    pub widgets: WidgetRegistry,
    pub publisher: Publisher,
    pub normalizer: LinkNormalizer,
    /// Cancelled on shutdown so pending prompts give up instead of holding the process open.
    pub shutdown: CancellationToken,
}

impl VolatileState {
    pub fn new(cfg: &Config, transport: SharedTransport) -> Self {
        Self::with_clock(cfg, transport, Arc::new(TokioClock))
    }

    pub fn with_clock(cfg: &Config, transport: SharedTransport, clock: SharedClock) -> Self {
        let hub = ReactionHub::new();
        let lifecycle = Arc::new(LifecycleCache::with_settings(
            transport.clone(),
            clock.clone(),
            cfg.lifecycle.ttl(),
            &cfg.lifecycle.cascade_emoji,
        ));
        let reposts = Arc::new(RepostTable::new(clock, cfg.repost.retention()));
        let widgets = WidgetRegistry::new(transport.clone(), hub.clone(), cfg.widget.as_controls());
        let publisher = Publisher::new(
            transport.clone(),
            lifecycle.clone(),
            reposts.clone(),
            Arc::new(LinkNormalizer),
            ConfirmationPrompt::new(transport.clone(), hub.clone()),
            cfg.prompt.as_prompt_settings(),
        );

        Self {
            transport,
            hub,
            lifecycle,
            reposts,
            widgets,
            publisher,
            normalizer: LinkNormalizer,
            shutdown: CancellationToken::new(),
        }
    }

    /// Starts the background tasks that drop expired posts and repost records.
    pub fn spawn_sweepers(&self, period: Duration) {
        self.lifecycle.spawn_sweeper(period, self.shutdown.clone());

        let reposts = self.reposts.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = interval.tick() => {}
                }
                let swept = reposts.sweep();
                if swept > 0 {
                    log_internal!(
                        "Forgot {} repost record(s), {} kept",
                        swept,
                        reposts.len()
                    );
                }
            }
        });
    }
}
