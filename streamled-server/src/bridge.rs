//! Event to panel command mapping.
//!
//! Subscribes to the global event topic and turns viewer interactions into
//! device commands: cheers, subscriptions and follows are celebrated, and
//! two configurable channel-points rewards drive the message scroller and
//! the room light.

use streamled_core::device::{CommandKind, DeviceQueue};
use streamled_core::events::{Event, RewardRedemptionEvent, Topic};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// Shown for cheers without a username.
const ANONYMOUS: &str = "ANONYMOUS";

/// Reward titles that trigger panel commands.
///
/// Titles compare trimmed and ASCII case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardTitles {
    panel: Option<String>,
    light: Option<String>,
}

impl RewardTitles {
    pub fn new(panel: Option<String>, light: Option<String>) -> Self {
        let normalize = |title: Option<String>| {
            title
                .map(|t| t.trim().to_owned())
                .filter(|t| !t.is_empty())
        };
        Self {
            panel: normalize(panel),
            light: normalize(light),
        }
    }

    fn is(expected: &Option<String>, title: &str) -> bool {
        expected
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case(title.trim()))
    }

    fn command_for(&self, redemption: &RewardRedemptionEvent) -> Option<CommandKind> {
        if Self::is(&self.panel, &redemption.reward_title) {
            let text = redemption.user_input.trim();
            if text.is_empty() {
                debug!(user = %redemption.user_login, "Panel reward redeemed without text");
                return None;
            }
            return Some(CommandKind::ShowMessage(text.to_owned()));
        }
        if Self::is(&self.light, &redemption.reward_title) {
            return Some(CommandKind::ToggleLight);
        }
        None
    }
}

/// The panel command for an event, if it warrants one.
pub fn command_for(event: &Event, rewards: &RewardTitles) -> Option<CommandKind> {
    match event {
        Event::Bits(bits) => Some(CommandKind::CelebrateBits {
            username: if bits.anonymous || bits.username.is_empty() {
                ANONYMOUS.to_owned()
            } else {
                bits.username.clone()
            },
            bits: bits.bits_used,
            message: bits.message.clone(),
        }),
        Event::Subscription(sub) => {
            let username = match (&sub.recipient, sub.display_name.is_empty()) {
                (Some(recipient), _) if sub.is_gift => recipient.clone(),
                (_, false) => sub.display_name.clone(),
                (_, true) => sub.username.clone(),
            };
            Some(CommandKind::CelebrateSubscription {
                username,
                months: sub.months,
            })
        }
        Event::Follow(follow) => Some(CommandKind::CelebrateFollow {
            username: follow.username.clone(),
        }),
        Event::RewardRedemption(redemption) => rewards.command_for(redemption),
        _ => None,
    }
}

/// Forward mapped events from `events` into `queue` until shutdown.
///
/// The subscription is taken before this returns, so nothing published
/// afterwards is missed.
pub fn spawn_bridge(
    events: &Topic<Event>,
    queue: DeviceQueue,
    rewards: RewardTitles,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let events = events.clone();
    let (subscription, rx) = events.subscribe_channel();
    let mut stream = UnboundedReceiverStream::new(rx);

    tokio::spawn(async move {
        info!("Device bridge started");
        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                next = stream.next() => {
                    let Some(event) = next else { break };
                    let Some(command) = command_for(&event, &rewards) else {
                        continue;
                    };
                    debug!(event = %event.kind(), command = command.name(), "Bridging event");
                    if let Err(e) = queue.enqueue(command) {
                        warn!(error = %e, "Device bridge stopping");
                        break;
                    }
                }
            }
        }
        events.unsubscribe(subscription);
        info!("Device bridge stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use streamled_core::config::DeviceConfig;
    use streamled_core::device::{DeviceTransport, TransportError, device_queue};
    use streamled_core::events::{BitsEvent, EventBus, FollowEvent, SubscriptionEvent};
    use time::OffsetDateTime;

    #[derive(Default)]
    struct RecordingTransport {
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl DeviceTransport for RecordingTransport {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_owned(), String::from_utf8(payload).unwrap()));
            Ok(())
        }
    }

    fn rewards() -> RewardTitles {
        RewardTitles::new(Some(" HUEPainel ".into()), Some("Lights!".into()))
    }

    fn redemption(title: &str, input: &str) -> Event {
        Event::RewardRedemption(RewardRedemptionEvent {
            channel_id: "1337".into(),
            redemption_id: "r1".into(),
            user_login: "viewer".into(),
            user_display_name: "Viewer".into(),
            reward_id: "w1".into(),
            reward_title: title.into(),
            cost: 100,
            user_input: input.into(),
            timestamp: OffsetDateTime::UNIX_EPOCH,
        })
    }

    fn subscription(is_gift: bool) -> SubscriptionEvent {
        SubscriptionEvent {
            channel_id: "1337".into(),
            username: "gifter".into(),
            display_name: "Gifter".into(),
            months: 7,
            streak_months: 3,
            plan: "1000".into(),
            context: if is_gift { "subgift" } else { "resub" }.into(),
            is_gift,
            recipient: is_gift.then(|| "Lucky".to_owned()),
            message: String::new(),
            timestamp: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn rewards_map_by_title() {
        let rewards = rewards();
        assert_eq!(
            command_for(&redemption("huepainel", "  hello  "), &rewards),
            Some(CommandKind::ShowMessage("hello".into()))
        );
        assert_eq!(command_for(&redemption("huepainel", " "), &rewards), None);
        assert_eq!(
            command_for(&redemption("LIGHTS!", ""), &rewards),
            Some(CommandKind::ToggleLight)
        );
        assert_eq!(command_for(&redemption("Hydrate", "x"), &rewards), None);
        assert_eq!(
            command_for(&redemption("Lights!", ""), &RewardTitles::default()),
            None
        );
    }

    #[test]
    fn celebrations_use_display_names() {
        let rewards = RewardTitles::default();
        assert_eq!(
            command_for(&Event::Subscription(subscription(false)), &rewards),
            Some(CommandKind::CelebrateSubscription {
                username: "Gifter".into(),
                months: 7
            })
        );
        assert_eq!(
            command_for(&Event::Subscription(subscription(true)), &rewards),
            Some(CommandKind::CelebrateSubscription {
                username: "Lucky".into(),
                months: 7
            })
        );

        let bits = BitsEvent {
            channel_id: "1337".into(),
            username: String::new(),
            bits_used: 100,
            total_bits_used: 1200,
            anonymous: true,
            message: "cheer100 nice".into(),
            timestamp: OffsetDateTime::UNIX_EPOCH,
        };
        assert_eq!(
            command_for(&Event::Bits(bits), &rewards),
            Some(CommandKind::CelebrateBits {
                username: ANONYMOUS.into(),
                bits: 100,
                message: "cheer100 nice".into()
            })
        );

        let login = Event::login("1337", true, "welcome");
        assert_eq!(command_for(&login, &rewards), None);
    }

    #[tokio::test(start_paused = true)]
    async fn bridged_events_reach_the_panel() {
        let bus = EventBus::new();
        let transport = Arc::new(RecordingTransport::default());
        let (queue, worker) = device_queue(
            DeviceConfig::new("panel", "room/light"),
            transport.clone(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let bridge = spawn_bridge(bus.global(), queue, rewards(), shutdown_rx);
        let worker = tokio::spawn(worker.run());

        bus.publish(Event::login("1337", true, "welcome"));
        bus.publish(redemption("Lights!", ""));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(
            *transport.published.lock().unwrap(),
            vec![
                ("room/light".to_owned(), "1".to_owned()),
                ("room/light".to_owned(), "0".to_owned()),
            ]
        );

        shutdown_tx.send(true).unwrap();
        bridge.await.unwrap();
        worker.await.unwrap();
        assert_eq!(bus.global().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn follow_is_celebrated() {
        let bus = EventBus::new();
        let transport = Arc::new(RecordingTransport::default());
        let (queue, worker) = device_queue(
            DeviceConfig::new("panel", "room/light"),
            transport.clone(),
        );
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let _bridge = spawn_bridge(bus.global(), queue, RewardTitles::default(), shutdown_rx);
        tokio::spawn(worker.run());

        bus.publish(Event::Follow(FollowEvent {
            channel_id: "1337".into(),
            user_id: "1234".into(),
            username: "Cool_User".into(),
            timestamp: OffsetDateTime::UNIX_EPOCH,
        }));
        tokio::time::sleep(Duration::from_secs(30)).await;

        let published = transport.published.lock().unwrap();
        assert!(published.iter().any(|(topic, payload)| topic == "panel_msg"
            && payload.contains("Cool_User THANKS FOR THE FOLLOW!")));
        assert_eq!(published.last().unwrap().0, "panel_textcolor");
    }
}
