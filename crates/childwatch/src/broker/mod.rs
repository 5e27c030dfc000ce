//! Broker session handling.
//!
//! [`Session`] is the transport-independent state machine: it reacts to
//! [`TransportEvent`]s, re-subscribes the alert topic on every connect and
//! decides which messages go to ingestion. [`mqtt`] drives it from a
//! `rumqttc` event loop.

pub mod mqtt;

use rumqttc::QoS;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

pub use mqtt::{publish_alert, BrokerConnection};

/// QoS used for the alert subscription (at-least-once).
pub const ALERT_QOS: QoS = QoS::AtLeastOnce;

/// Lifecycle of a broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session, and none being attempted.
    Disconnected,
    /// A connect (or reconnect) is in progress.
    Connecting,
    /// The broker accepted the session.
    Connected,
    /// An established session dropped; the transport will reconnect.
    ConnectionLost,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::ConnectionLost => write!(f, "connection lost"),
        }
    }
}

/// What the transport reports to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker acknowledged a connect.
    Connected {
        /// Whether the broker resumed a stored session.
        session_present: bool,
    },
    /// A message was published on a subscribed topic.
    Message {
        /// Topic the message was published on.
        topic: String,
        /// Raw payload.
        payload: Vec<u8>,
    },
    /// The broker answered a subscribe request.
    SubscribeAck {
        /// Whether the broker refused the subscription.
        rejected: bool,
    },
    /// The connection failed or dropped.
    Disconnected {
        /// Description of the failure.
        cause: String,
    },
}

/// A message handed from the transport to ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// What the driver should do after the session handled an event.
#[derive(Debug)]
pub enum SessionAction {
    /// Nothing to do; keep polling.
    Continue,
    /// Hand this message to ingestion.
    Deliver(InboundMessage),
    /// The session dropped; wait the reconnect delay, then keep polling.
    Retry,
    /// The initial connect failed; stop the session.
    Stop(Error),
}

/// Something that can request a topic subscription.
pub trait Subscriber: Send {
    /// Request delivery of messages published to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Subscription`] if the request cannot be issued.
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<()>;
}

/// Broker session state machine.
#[derive(Debug)]
pub struct Session<S> {
    endpoint: String,
    topic: String,
    subscriber: S,
    state: watch::Sender<ConnectionState>,
    ever_connected: bool,
    subscribed: bool,
}

impl<S: Subscriber> Session<S> {
    /// Create a session for `topic` on `endpoint`, in the `Connecting` state.
    ///
    /// Returns the session and a receiver for its state changes.
    pub fn new(
        endpoint: impl Into<String>,
        topic: impl Into<String>,
        subscriber: S,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (state, receiver) = watch::channel(ConnectionState::Connecting);
        let session = Self {
            endpoint: endpoint.into(),
            topic: topic.into(),
            subscriber,
            state,
            ever_connected: false,
            subscribed: false,
        };
        (session, receiver)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the broker has confirmed the alert subscription.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// The topic filter this session subscribes to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The subscriber used for (re-)subscribing.
    pub fn subscriber(&self) -> &S {
        &self.subscriber
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// React to one transport event.
    pub fn handle(&mut self, event: TransportEvent) -> SessionAction {
        match event {
            TransportEvent::Connected { session_present } => {
                if self.ever_connected {
                    info!("Reconnected to {}", self.endpoint);
                } else {
                    info!("Connected to {}", self.endpoint);
                }
                debug!("Broker session present: {}", session_present);
                self.ever_connected = true;
                self.subscribed = false;
                self.set_state(ConnectionState::Connected);
                self.subscribe();
                SessionAction::Continue
            }
            TransportEvent::Message { topic, payload } => {
                if !topic_matches(&self.topic, &topic) {
                    debug!("Ignoring message on unrelated topic {}", topic);
                    return SessionAction::Continue;
                }
                debug!("Message on {} ({} bytes)", topic, payload.len());
                SessionAction::Deliver(InboundMessage { topic, payload })
            }
            TransportEvent::SubscribeAck { rejected } => {
                if rejected {
                    let err = Error::subscription(&self.topic, "rejected by broker");
                    warn!("{}", err);
                    self.subscribed = false;
                } else {
                    info!("Subscription successful to topic: {}", self.topic);
                    self.subscribed = true;
                }
                SessionAction::Continue
            }
            TransportEvent::Disconnected { cause } => {
                self.subscribed = false;
                if self.ever_connected {
                    warn!("Connection to {} lost: {}", self.endpoint, cause);
                    self.set_state(ConnectionState::ConnectionLost);
                    self.set_state(ConnectionState::Connecting);
                    SessionAction::Retry
                } else {
                    let err = Error::connection(&self.endpoint, cause);
                    error!("{}", err);
                    self.set_state(ConnectionState::Disconnected);
                    SessionAction::Stop(err)
                }
            }
        }
    }

    /// Mark the session closed.
    pub fn close(&mut self) {
        self.subscribed = false;
        self.set_state(ConnectionState::Disconnected);
        info!("Broker session to {} closed", self.endpoint);
    }

    fn subscribe(&self) {
        match self.subscriber.subscribe(&self.topic, ALERT_QOS) {
            Ok(()) => debug!("Requested subscription to {}", self.topic),
            Err(err) => warn!("{}", err),
        }
    }
}

/// Whether `topic` matches the MQTT subscription `filter`.
///
/// Supports the `+` (single level) and `#` (remaining levels) wildcards.
/// Wildcards never match topics beginning with `$`.
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) | (None, None) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            _ => return false,
        }
    }
}
