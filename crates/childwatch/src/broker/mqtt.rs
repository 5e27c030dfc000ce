//! MQTT transport for the broker session, built on `rumqttc`.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS, SubscribeReasonCode,
};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    ConnectionState, InboundMessage, Session, SessionAction, Subscriber, TransportEvent, ALERT_QOS,
};
use crate::config::BrokerConfig;
use crate::error::{Error, Result};

/// Capacity of the client's outgoing request queue.
const REQUEST_CAPACITY: usize = 10;

/// How long a closing session keeps polling to flush its DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// How long a one-shot publish waits for the broker's acknowledgement.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

impl Subscriber for AsyncClient {
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        self.try_subscribe(topic, qos)
            .map_err(|e| Error::subscription(topic, e.to_string()))
    }
}

fn mqtt_options(config: &BrokerConfig) -> MqttOptions {
    let mut options = MqttOptions::new(config.resolved_client_id(), &config.host, config.port);
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(true);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }
    options
}

fn publish_error(topic: &str, err: &ClientError) -> Error {
    Error::Publish {
        topic: topic.to_string(),
        message: err.to_string(),
    }
}

/// Map a polled transport event onto what the session cares about.
fn translate(polled: std::result::Result<Event, ConnectionError>) -> Option<TransportEvent> {
    match polled {
        Ok(Event::Incoming(Packet::ConnAck(ack))) => Some(TransportEvent::Connected {
            session_present: ack.session_present,
        }),
        Ok(Event::Incoming(Packet::Publish(publish))) => Some(TransportEvent::Message {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        }),
        Ok(Event::Incoming(Packet::SubAck(ack))) => Some(TransportEvent::SubscribeAck {
            rejected: ack
                .return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure)),
        }),
        Ok(_) => None,
        Err(err) => Some(TransportEvent::Disconnected {
            cause: err.to_string(),
        }),
    }
}

/// Keep polling until the DISCONNECT packet is written or the grace runs out.
async fn flush_disconnect(eventloop: &mut EventLoop) {
    let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
    if flushed.is_err() {
        debug!("Broker did not take DISCONNECT within {:?}", DISCONNECT_GRACE);
    }
}

/// A live subscription to the alert topic.
///
/// Messages received on the topic are forwarded, in arrival order, to the
/// channel handed to [`BrokerConnection::connect`].
#[derive(Debug)]
pub struct BrokerConnection {
    client: AsyncClient,
    state: watch::Receiver<ConnectionState>,
    close: Arc<Notify>,
    task: JoinHandle<Result<()>>,
}

impl BrokerConnection {
    /// Start a session to the configured broker.
    ///
    /// Returns immediately; the session runs on a background task. If the
    /// first connect fails the session ends in `Disconnected` and
    /// [`close`](Self::close) reports the connection error. Must be called
    /// from within a tokio runtime.
    #[must_use]
    pub fn connect(config: &BrokerConfig, messages: mpsc::Sender<InboundMessage>) -> Self {
        let endpoint = config.endpoint();
        info!("Connecting to {} (topic {})", endpoint, config.topic);

        let (client, eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CAPACITY);
        let (session, state) = Session::new(endpoint, config.topic.clone(), client.clone());
        let close = Arc::new(Notify::new());
        let task = tokio::spawn(run_session(
            session,
            eventloop,
            messages,
            Arc::clone(&close),
            config.reconnect_delay(),
        ));

        Self {
            client,
            state,
            close,
            task,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the session has ended (`Disconnected`).
    pub async fn terminated(&mut self) {
        // An error means the session task is gone, which is also terminal.
        let _ = self
            .state
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await;
    }

    /// Publish a message on the live session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Publish`] if the request cannot be queued.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .publish(topic, ALERT_QOS, false, payload.to_vec())
            .await
            .map_err(|e| publish_error(topic, &e))
    }

    /// Close the session.
    ///
    /// Stops further deliveries, sends a best-effort DISCONNECT and drops the
    /// message sender so the receiving side sees end-of-stream. Messages
    /// already handed over stay queued for the receiver.
    ///
    /// # Errors
    ///
    /// Returns the connection error if the session ended because the first
    /// connect failed.
    pub async fn close(self) -> Result<()> {
        self.close.notify_one();
        match self.task.await {
            Ok(result) => result,
            Err(join) => Err(Error::internal(format!("broker task failed: {join}"))),
        }
    }
}

async fn run_session(
    mut session: Session<AsyncClient>,
    mut eventloop: EventLoop,
    messages: mpsc::Sender<InboundMessage>,
    close: Arc<Notify>,
    reconnect_delay: Duration,
) -> Result<()> {
    loop {
        let polled = tokio::select! {
            () = close.notified() => break,
            polled = eventloop.poll() => polled,
        };
        let Some(event) = translate(polled) else {
            continue;
        };

        match session.handle(event) {
            SessionAction::Continue => {}
            SessionAction::Deliver(message) => {
                tokio::select! {
                    () = close.notified() => break,
                    sent = messages.send(message) => {
                        if sent.is_err() {
                            warn!("Ingestion queue closed; ending broker session");
                            break;
                        }
                    }
                }
            }
            SessionAction::Retry => {
                debug!("Reconnecting in {:?}", reconnect_delay);
                tokio::select! {
                    () = close.notified() => break,
                    () = tokio::time::sleep(reconnect_delay) => {}
                }
            }
            SessionAction::Stop(err) => return Err(err),
        }
    }

    if session.subscriber().try_disconnect().is_ok() {
        flush_disconnect(&mut eventloop).await;
    }
    session.close();
    Ok(())
}

/// Publish a single alert message and wait for the broker to acknowledge it.
///
/// Uses its own short-lived session, independent of any running service.
///
/// # Errors
///
/// Returns [`Error::Connection`] if the broker is unreachable and
/// [`Error::Publish`] if the message is not acknowledged in time.
pub async fn publish_alert(config: &BrokerConfig, topic: &str, message: &str) -> Result<()> {
    let endpoint = config.endpoint();
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CAPACITY);

    client
        .publish(topic, ALERT_QOS, false, message.as_bytes().to_vec())
        .await
        .map_err(|e| publish_error(topic, &e))?;

    let acked = tokio::time::timeout(PUBLISH_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::PubAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(err) => return Err(Error::connection(&endpoint, err.to_string())),
            }
        }
    })
    .await
    .map_err(|_| Error::Publish {
        topic: topic.to_string(),
        message: format!("no acknowledgement within {PUBLISH_TIMEOUT:?}"),
    })?;
    acked?;

    info!("Published alert to {} on {}", topic, endpoint);
    if client.try_disconnect().is_ok() {
        flush_disconnect(&mut eventloop).await;
    }
    Ok(())
}
