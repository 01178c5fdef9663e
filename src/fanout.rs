//! Copies one rendered post into several channels.
//!
//! Channels are served one after another and every page of a gallery goes out in order before the
//! next channel starts, so galleries never interleave.  A channel that fails is reported and
//! skipped; the remaining channels still get the post.

use crate::{
    log_error,
    logging::PrintId,
    ordered_set::OrderedSet,
    transport::{MessageRef, Payload, Transport},
};
use serenity::all::ChannelId;

#[derive(Clone, Debug, PartialEq)]
pub struct DeliveryFailure {
    pub channel: ChannelId,
    pub cause: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FanoutResult {
    pub delivered: Vec<MessageRef>,
    pub failed: Vec<DeliveryFailure>,
}

impl FanoutResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends `pages` to every channel of `targets` not in `excluded`.
pub async fn send(
    transport: &dyn Transport,
    pages: &[Payload],
    targets: &[ChannelId],
    excluded: &[ChannelId],
) -> FanoutResult {
    let channels: OrderedSet<ChannelId> = targets
        .iter()
        .filter(|channel| !excluded.contains(channel))
        .copied()
        .collect();

    let mut result = FanoutResult::default();
    for channel in channels {
        for page in pages {
            match transport.send_message(channel, page).await {
                Ok(message) => result.delivered.push(message),
                Err(e) => {
                    log_error!("Could not crosspost to {}: {}", channel.color_id(), e);
                    result.failed.push(DeliveryFailure {
                        channel,
                        cause: e.to_string(),
                    });
                    break;
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeTransport;

    fn channels(ids: &[u64]) -> Vec<ChannelId> {
        ids.iter().copied().map(ChannelId::new).collect()
    }

    #[tokio::test]
    async fn failed_channel_does_not_stop_the_others() {
        let transport = FakeTransport::new();
        transport.fail_channel(ChannelId::new(2));

        let result = send(
            transport.as_ref(),
            &[Payload::text("art")],
            &channels(&[1, 2, 3]),
            &[],
        )
        .await;

        let delivered: Vec<ChannelId> = result.delivered.iter().map(|m| m.channel).collect();
        assert_eq!(delivered, channels(&[1, 3]));
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].channel, ChannelId::new(2));
        assert!(result.failed[0].cause.contains("Missing Access"));
        assert!(!result.is_complete());
    }

    #[tokio::test]
    async fn galleries_go_out_in_order_per_channel() {
        let transport = FakeTransport::new();
        let pages = [Payload::text("1/2"), Payload::text("2/2")];

        let result = send(transport.as_ref(), &pages, &channels(&[1, 2]), &[]).await;

        let sent: Vec<(ChannelId, Option<String>)> = transport
            .sent()
            .into_iter()
            .map(|(target, payload)| (target.channel, payload.content))
            .collect();
        assert_eq!(
            sent,
            vec![
                (ChannelId::new(1), Some("1/2".to_owned())),
                (ChannelId::new(1), Some("2/2".to_owned())),
                (ChannelId::new(2), Some("1/2".to_owned())),
                (ChannelId::new(2), Some("2/2".to_owned())),
            ]
        );
        assert_eq!(result.delivered.len(), 4);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn excluded_and_duplicate_targets_are_skipped() {
        let transport = FakeTransport::new();

        let result = send(
            transport.as_ref(),
            &[Payload::text("art")],
            &channels(&[1, 2, 1, 3]),
            &channels(&[3]),
        )
        .await;

        let delivered: Vec<ChannelId> = result.delivered.iter().map(|m| m.channel).collect();
        assert_eq!(delivered, channels(&[1, 2]));
    }

    #[tokio::test]
    async fn nothing_to_send_to() {
        let transport = FakeTransport::new();
        let result = send(transport.as_ref(), &[Payload::text("art")], &[], &[]).await;
        assert_eq!(result, FanoutResult::default());
        assert!(transport.calls().is_empty());
    }
}
