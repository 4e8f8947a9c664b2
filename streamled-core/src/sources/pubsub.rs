//! Realtime push monitor.
//!
//! Keeps one websocket session to the push-notification service:
//!
//! - a keep-alive task sends `PING` every `ping_interval`;
//! - a reader task routes `RESPONSE` frames to the waiter registered for
//!   their nonce and decodes `MESSAGE` frames into domain events.
//!
//! Either task stops on shutdown. A failed read publishes an error event and
//! shuts both down; reconnecting is up to the owner.

use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use streamled_sdk::objects::pubsub::{
    self, BitsEventV2, ChannelPointsMessage, ChannelSubscribeMessage, ClientFrame, ListenData,
    MessageData, ResponseFrame, ServerFrame,
};
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::PubSubConfig;
use crate::context::Context;
use crate::events::{
    BitsEvent, Bus, Event, EventBus, RewardRedemptionEvent, SubscriptionEvent, Topic,
};

const ORIGIN: &str = "pubsub";

type WsSink = Box<dyn Sink<Message, Error = tungstenite::Error> + Send + Unpin>;

/// Errors produced by the push monitor.
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered the registration with an error code.
    #[error("registration rejected: {0}")]
    Rejected(String),

    #[error("timed out waiting for response")]
    Timeout,

    #[error("session closed")]
    Closed,
}

impl From<tungstenite::Error> for PubSubError {
    fn from(e: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

/// Why a MESSAGE payload could not become an event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed topic: {0}")]
    MalformedTopic(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A live push-notification session.
pub struct PushMonitor {
    sink: Arc<Mutex<WsSink>>,
    responses: Bus<ResponseFrame>,
    all_responses: Topic<ResponseFrame>,
    shutdown: Arc<watch::Sender<bool>>,
    response_timeout: std::time::Duration,
    reader: JoinHandle<()>,
    pinger: JoinHandle<()>,
}

impl PushMonitor {
    /// Connect to `config.url` and register the standard channel topics.
    pub async fn start(ctx: &Context, config: &PubSubConfig) -> Result<Self, PubSubError> {
        let monitor = Self::connect(ctx, config).await?;
        monitor
            .register_channel(&config.channel_id, &config.token)
            .await?;
        Ok(monitor)
    }

    /// Open the websocket session without registering any topic.
    pub async fn connect(ctx: &Context, config: &PubSubConfig) -> Result<Self, PubSubError> {
        info!(url = %config.url, "Connecting to push service");
        let (ws, _) = tokio_tungstenite::connect_async(config.url.as_str()).await?;
        Ok(Self::from_stream(ctx, config, ws))
    }

    /// Run the session over an already established websocket.
    pub fn from_stream<S>(ctx: &Context, config: &PubSubConfig, ws: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (sink, stream) = ws.split();
        let boxed: WsSink = Box::new(sink);
        let sink = Arc::new(Mutex::new(boxed));
        let shutdown = Arc::new(watch::channel(false).0);

        let responses = Bus::new();
        let all_responses = Topic::new();

        let reader = Reader {
            channel_id: config.channel_id.clone(),
            bus: ctx.bus.clone(),
            responses: responses.clone(),
            all_responses: all_responses.clone(),
            shutdown: Arc::clone(&shutdown),
        };
        let reader = tokio::spawn(reader.run(stream));
        let pinger = tokio::spawn(keep_alive(
            Arc::clone(&sink),
            shutdown.subscribe(),
            config.ping_interval,
        ));

        Self {
            sink,
            responses,
            all_responses,
            shutdown,
            response_timeout: config.response_timeout,
            reader,
            pinger,
        }
    }

    /// Send a LISTEN request and wait for its correlated RESPONSE.
    ///
    /// A response without error counts as success.
    pub async fn register(&self, topics: Vec<String>, auth_token: &str) -> Result<(), PubSubError> {
        let nonce = Uuid::new_v4().simple().to_string();
        let waiter = self.responses.subscribe_once(&nonce);

        let frame = ClientFrame::Listen {
            nonce: nonce.clone(),
            data: ListenData {
                topics,
                auth_token: auth_token.to_owned(),
            },
        };

        let result = match self.send_frame(&frame).await {
            Err(e) => Err(e),
            Ok(()) => match tokio::time::timeout(self.response_timeout, waiter).await {
                Ok(Ok(response)) => match response.error() {
                    Some(code) => Err(PubSubError::Rejected(code.to_owned())),
                    None => Ok(()),
                },
                Ok(Err(_)) => Err(PubSubError::Closed),
                Err(_) => Err(PubSubError::Timeout),
            },
        };
        self.responses.remove(&nonce);

        match &result {
            Ok(()) => info!(nonce = %nonce, "Topics registered"),
            Err(e) => warn!(nonce = %nonce, error = %e, "Topic registration failed"),
        }
        result
    }

    /// Register the bits, subscription and channel-points topics of a channel.
    pub async fn register_channel(&self, channel_id: &str, auth_token: &str) -> Result<(), PubSubError> {
        let topics = [
            pubsub::TOPIC_CHANNEL_POINTS,
            pubsub::TOPIC_SUBSCRIBE,
            pubsub::TOPIC_BITS_V2,
        ]
        .into_iter()
        .map(|event| pubsub::make_topic(event, channel_id))
        .collect();
        self.register(topics, auth_token).await
    }

    /// Every RESPONSE frame, with or without nonce.
    pub fn all_responses(&self) -> &Topic<ResponseFrame> {
        &self.all_responses
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }

    /// Stop both loops and close the socket.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.sink.lock().await.close().await {
            debug!(error = %e, "Websocket close failed");
        }
        self.reader.abort();
        self.pinger.abort();
        info!("Push monitor stopped");
    }

    async fn send_frame(&self, frame: &ClientFrame) -> Result<(), PubSubError> {
        if !self.is_running() {
            return Err(PubSubError::Closed);
        }
        let text = serde_json::to_string(frame)?;
        self.sink.lock().await.send(Message::Text(text)).await?;
        Ok(())
    }
}

impl Drop for PushMonitor {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        self.reader.abort();
        self.pinger.abort();
    }
}

async fn keep_alive(
    sink: Arc<Mutex<WsSink>>,
    mut shutdown_rx: watch::Receiver<bool>,
    interval: std::time::Duration,
) {
    let ping = match serde_json::to_string(&ClientFrame::Ping) {
        Ok(ping) => ping,
        Err(e) => {
            error!(error = %e, "Failed to encode PING");
            return;
        }
    };
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                trace!("Sending PING");
                if let Err(e) = sink.lock().await.send(Message::Text(ping.clone())).await {
                    warn!(error = %e, "Failed to send PING");
                }
            }
        }
    }
    debug!("Keep-alive loop stopped");
}

struct Reader {
    channel_id: String,
    bus: EventBus,
    responses: Bus<ResponseFrame>,
    all_responses: Topic<ResponseFrame>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Reader {
    async fn run<St>(self, mut stream: St)
    where
        St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Close(_))) | None => {
                        self.terminate("connection closed by peer");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "Push session read failed");
                        self.terminate(&e.to_string());
                        break;
                    }
                }
            }
        }
        debug!("Push reader loop stopped");
    }

    fn terminate(&self, reason: &str) {
        self.shutdown.send_replace(true);
        self.bus.publish(Event::error(&self.channel_id, ORIGIN, reason));
    }

    fn handle_text(&self, text: &str) {
        let frame: ServerFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, frame = text, "Dropping malformed frame");
                return;
            }
        };

        match frame {
            ServerFrame::Pong => trace!("PONG"),
            ServerFrame::Reconnect => warn!("Push service requested a reconnect"),
            ServerFrame::Response(response) => {
                if let Some(nonce) = response.nonce.as_deref().filter(|n| !n.is_empty()) {
                    self.responses.publish(nonce, response.clone());
                }
                self.all_responses.publish(response);
            }
            ServerFrame::Message { data } => match decode_message(&data) {
                Ok(event) => {
                    debug!(kind = %event.kind(), channel = %event.channel_id(), "Push event");
                    self.bus.publish(event);
                }
                Err(DecodeError::UnknownEvent(name)) => {
                    warn!(event = %name, topic = %data.topic, "Dropping unknown push event");
                }
                Err(e) => error!(error = %e, topic = %data.topic, "Failed to decode push event"),
            },
            ServerFrame::Unknown => debug!(frame = text, "Ignoring unknown frame type"),
        }
    }
}

/// Decode the nested payload of a MESSAGE frame by its topic's event name.
pub fn decode_message(data: &MessageData) -> Result<Event, DecodeError> {
    let (event_name, channel_id) = pubsub::split_topic(&data.topic)
        .ok_or_else(|| DecodeError::MalformedTopic(data.topic.clone()))?;
    let now = OffsetDateTime::now_utc();

    let event = match event_name {
        pubsub::TOPIC_BITS_V2 => {
            let bits: BitsEventV2 = serde_json::from_str(&data.message)?;
            let d = bits.data;
            Event::Bits(BitsEvent {
                channel_id: channel_id.to_owned(),
                anonymous: bits.is_anonymous || d.user_name.is_none(),
                username: d.user_name.unwrap_or_default(),
                bits_used: d.bits_used,
                total_bits_used: d.total_bits_used,
                message: d.chat_message,
                timestamp: now,
            })
        }
        pubsub::TOPIC_SUBSCRIBE => {
            let sub: ChannelSubscribeMessage = serde_json::from_str(&data.message)?;
            Event::Subscription(SubscriptionEvent {
                channel_id: channel_id.to_owned(),
                username: sub.user_name,
                display_name: sub.display_name,
                months: sub.cumulative_months,
                streak_months: sub.streak_months,
                plan: sub.sub_plan,
                context: sub.context,
                is_gift: sub.is_gift,
                recipient: sub.recipient_user_name,
                message: sub.sub_message.message,
                timestamp: now,
            })
        }
        pubsub::TOPIC_CHANNEL_POINTS => {
            let ChannelPointsMessage::RewardRedeemed(points) =
                serde_json::from_str::<ChannelPointsMessage>(&data.message)?;
            let r = points.redemption;
            Event::RewardRedemption(RewardRedemptionEvent {
                channel_id: channel_id.to_owned(),
                redemption_id: r.id,
                user_login: r.user.login,
                user_display_name: r.user.display_name,
                reward_id: r.reward.id,
                reward_title: r.reward.title,
                cost: r.reward.cost,
                user_input: r.user_input,
                timestamp: now,
            })
        }
        other => return Err(DecodeError::UnknownEvent(other.to_owned())),
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    fn config(ping_interval: Duration) -> PubSubConfig {
        PubSubConfig {
            url: url::Url::parse("ws://127.0.0.1/").unwrap(),
            channel_id: "44322889".into(),
            token: "tok".into(),
            ping_interval,
            response_timeout: Duration::from_millis(300),
        }
    }

    async fn pair(ctx: &Context, config: &PubSubConfig) -> (PushMonitor, WebSocketStream<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            tokio_tungstenite::accept_async(tcp).await.unwrap()
        });
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
        let monitor = PushMonitor::from_stream(ctx, config, ws);
        (monitor, accept.await.unwrap())
    }

    async fn next_json(server: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
        loop {
            match server.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    async fn send_json(server: &mut WebSocketStream<TcpStream>, value: serde_json::Value) {
        server.send(Message::Text(value.to_string())).await.unwrap();
    }

    /// Answer the next LISTEN with the given error string; returns its topics.
    async fn answer_listen(server: &mut WebSocketStream<TcpStream>, error: &str) -> serde_json::Value {
        let listen = next_json(server).await;
        assert_eq!(listen["type"], "LISTEN");
        let nonce = listen["nonce"].as_str().unwrap().to_owned();
        send_json(
            server,
            serde_json::json!({"type": "RESPONSE", "nonce": nonce, "error": error}),
        )
        .await;
        listen["data"].clone()
    }

    #[tokio::test]
    async fn register_succeeds_on_empty_error() {
        let ctx = Context::default();
        let cfg = config(Duration::from_secs(60));
        let (monitor, mut server) = pair(&ctx, &cfg).await;

        let peer = tokio::spawn(async move {
            let data = answer_listen(&mut server, "").await;
            (data, server)
        });
        monitor.register_channel("44322889", "tok").await.unwrap();

        let (data, _server) = peer.await.unwrap();
        assert_eq!(
            data,
            serde_json::json!({
                "topics": [
                    "channel-points-channel-v1.44322889",
                    "channel-subscribe-events-v1.44322889",
                    "channel-bits-events-v2.44322889"
                ],
                "auth_token": "tok"
            })
        );
    }

    #[tokio::test]
    async fn register_surfaces_upstream_error() {
        let ctx = Context::default();
        let cfg = config(Duration::from_secs(60));
        let (monitor, mut server) = pair(&ctx, &cfg).await;

        let peer = tokio::spawn(async move {
            answer_listen(&mut server, "ERR_BADAUTH").await;
            server
        });
        let result = monitor.register(vec!["channel-bits-events-v2.1".into()], "bad").await;
        assert!(matches!(result, Err(PubSubError::Rejected(ref code)) if code == "ERR_BADAUTH"));
        let _server = peer.await.unwrap();
    }

    #[tokio::test]
    async fn register_times_out_without_response() {
        let ctx = Context::default();
        let cfg = config(Duration::from_secs(60));
        let (monitor, mut server) = pair(&ctx, &cfg).await;

        let peer = tokio::spawn(async move {
            let listen = next_json(&mut server).await;
            (listen, server)
        });
        let result = monitor.register(vec!["channel-bits-events-v2.1".into()], "tok").await;
        assert!(matches!(result, Err(PubSubError::Timeout)));

        // A late answer for the expired nonce goes nowhere.
        let (listen, mut server) = peer.await.unwrap();
        let nonce = listen["nonce"].as_str().unwrap().to_owned();
        assert!(!monitor.responses.contains(&nonce));
        let (_, mut all) = monitor.all_responses().subscribe_channel();
        send_json(&mut server, serde_json::json!({"type": "RESPONSE", "nonce": nonce, "error": ""})).await;
        assert_eq!(all.recv().await.unwrap().nonce.as_deref(), Some(nonce.as_str()));
    }

    #[tokio::test]
    async fn messages_become_events_on_global_and_channel_topics() {
        let ctx = Context::default();
        let cfg = config(Duration::from_secs(60));
        let (_, mut global) = ctx.bus.global().subscribe_channel();
        let (_, mut channel) = ctx.bus.channel("44322889").subscribe_channel();
        let (_monitor, mut server) = pair(&ctx, &cfg).await;

        let bits = serde_json::json!({
            "data": {
                "user_name": "dallasnchains",
                "channel_name": "dallas",
                "user_id": "129454141",
                "channel_id": "44322889",
                "time": "2017-02-09T13:23:58.168Z",
                "chat_message": "cheer10000 New badge hype!",
                "bits_used": 10000,
                "total_bits_used": 25000,
                "context": "cheer",
                "badge_entitlement": {"new_version": 25000, "previous_version": 10000}
            },
            "version": "1.0",
            "message_type": "bits_event",
            "message_id": "8145728a4-35f0-4cf7-9dc0-f2ef24de1eb6",
            "is_anonymous": false
        });
        send_json(
            &mut server,
            serde_json::json!({"type": "MESSAGE", "data": {"topic": "whispers.44322889", "message": "{}"}}),
        )
        .await;
        send_json(
            &mut server,
            serde_json::json!({"type": "MESSAGE", "data": {
                "topic": "channel-bits-events-v2.44322889",
                "message": bits.to_string()
            }}),
        )
        .await;

        let Event::Bits(event) = global.recv().await.unwrap() else {
            panic!("expected a bits event");
        };
        assert_eq!(event.username, "dallasnchains");
        assert_eq!(event.bits_used, 10000);
        assert!(!event.anonymous);
        assert_eq!(event.message, "cheer10000 New badge hype!");
        assert_eq!(channel.recv().await.unwrap().kind(), EventKind::Bits);
    }

    #[tokio::test]
    async fn keep_alive_sends_ping() {
        let ctx = Context::default();
        let cfg = config(Duration::from_millis(50));
        let (_monitor, mut server) = pair(&ctx, &cfg).await;
        assert_eq!(next_json(&mut server).await, serde_json::json!({"type": "PING"}));
    }

    #[tokio::test]
    async fn peer_close_stops_session_with_error_event() {
        let ctx = Context::default();
        let cfg = config(Duration::from_secs(60));
        let (_, mut global) = ctx.bus.global().subscribe_channel();
        let (monitor, mut server) = pair(&ctx, &cfg).await;

        server.close(None).await.unwrap();
        let event = global.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::Error);
        assert!(!monitor.is_running());
        assert!(matches!(
            monitor.register(vec!["x.1".into()], "tok").await,
            Err(PubSubError::Closed)
        ));
    }

    #[test]
    fn decode_rejects_unknown_and_malformed() {
        let unknown = MessageData {
            topic: "whispers.1".into(),
            message: "{}".into(),
        };
        assert!(matches!(decode_message(&unknown), Err(DecodeError::UnknownEvent(_))));

        let malformed = MessageData {
            topic: "no-channel".into(),
            message: "{}".into(),
        };
        assert!(matches!(decode_message(&malformed), Err(DecodeError::MalformedTopic(_))));

        let bad_json = MessageData {
            topic: "channel-subscribe-events-v1.1".into(),
            message: "not json".into(),
        };
        assert!(matches!(decode_message(&bad_json), Err(DecodeError::Json(_))));
    }

    #[test]
    fn decode_subscription_and_redemption() {
        let sub = MessageData {
            topic: "channel-subscribe-events-v1.44322889".into(),
            message: serde_json::json!({
                "user_name": "tww2",
                "display_name": "TWW2",
                "channel_name": "mr_woodchuck",
                "user_id": "13405587",
                "channel_id": "89614178",
                "sub_plan": "1000",
                "sub_plan_name": "Channel Subscription (mr_woodchuck)",
                "cumulative_months": 9,
                "streak_months": 3,
                "context": "resub",
                "is_gift": false,
                "sub_message": {"message": "A Twitch baby is born! KappaHD", "emotes": null}
            })
            .to_string(),
        };
        let Event::Subscription(s) = decode_message(&sub).unwrap() else {
            panic!("expected a subscription event");
        };
        assert_eq!(s.username, "tww2");
        assert_eq!(s.months, 9);
        assert_eq!(s.channel_id, "44322889");

        let points = MessageData {
            topic: "channel-points-channel-v1.44322889".into(),
            message: serde_json::json!({
                "type": "reward-redeemed",
                "data": {
                    "timestamp": "2019-11-12T01:29:34.98329743Z",
                    "redemption": {
                        "id": "9203c6f0-51b6-4d1d-a9ae-8eafdb0d6d47",
                        "user": {"id": "30515034", "login": "davethecust", "display_name": "davethecust"},
                        "channel_id": "30515034",
                        "reward": {"id": "6ef17bb2", "title": "Panel Message", "cost": 10},
                        "user_input": "yeooo",
                        "status": "FULFILLED"
                    }
                }
            })
            .to_string(),
        };
        let Event::RewardRedemption(r) = decode_message(&points).unwrap() else {
            panic!("expected a redemption event");
        };
        assert_eq!(r.reward_title, "Panel Message");
        assert_eq!(r.user_input, "yeooo");
    }
}
