//! Impure I/O operations for the MQTT session
//!
//! This module handles all network communication through rumqttc. Every
//! connect builds a fresh client and event loop; the event loop runs on its
//! own task, reports link state through a `watch` channel and hands SubAck
//! outcomes back to the waiting subscribe call.

use super::connection::{configure_mqtt_options, MqttError};
use super::message_handler::{EventRoute, LoopFailure, MessageHandler};
use crate::config::BrokerEndpoint;
use crate::shutdown::ShutdownSignal;
use crate::transport::{BrokerSession, ConnectOutcome, InboundMessage};
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

/// Capacity of the rumqttc request channel
const REQUEST_CAPACITY: usize = 10;

/// Capacity of the inbound message channel
const INBOUND_CAPACITY: usize = 32;

/// How long disconnect waits for the event loop to wind down
const EVENT_LOOP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the SubAck report channel
const SUBACK_CAPACITY: usize = 4;

/// How long subscribe waits for the broker's SubAck
const SUBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Link state published by the event-loop task
#[derive(Debug, Clone, PartialEq)]
enum LinkState {
    /// Waiting for ConnAck
    Pending,
    /// ConnAck accepted
    Up,
    /// ConnAck with a non-success code
    Rejected(String),
    /// Network error or broker disconnect
    Down(String),
}

/// Broker answer to a SUBSCRIBE
#[derive(Debug, Clone, PartialEq)]
enum SubAckReport {
    Granted(String),
    Refused(String),
}

/// MQTT v5 broker session backed by rumqttc
pub struct RumqttcSession {
    client: Option<AsyncClient>,
    link_rx: Option<watch::Receiver<LinkState>>,
    suback_rx: Option<mpsc::Receiver<SubAckReport>>,
    event_loop_handle: Option<JoinHandle<()>>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Option<mpsc::Receiver<InboundMessage>>,
}

impl RumqttcSession {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        Self {
            client: None,
            link_rx: None,
            suback_rx: None,
            event_loop_handle: None,
            inbound_tx,
            inbound_rx: Some(inbound_rx),
        }
    }

    /// Drive the rumqttc event loop until the link fails or the client goes away
    async fn run_event_loop(
        mut event_loop: EventLoop,
        link_tx: watch::Sender<LinkState>,
        suback_tx: mpsc::Sender<SubAckReport>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) {
        debug!("MQTT event loop started");
        loop {
            let event = match event_loop.poll().await {
                Ok(event) => event,
                Err(e) => {
                    debug!("MQTT event loop error: {}", e);
                    match MessageHandler::route_error(&e) {
                        LoopFailure::ConnectRefused(code) => {
                            link_tx.send_replace(LinkState::Rejected(code));
                        }
                        LoopFailure::SubscribeRefused(reason) => {
                            link_tx.send_replace(LinkState::Down(format!(
                                "subscription refused: {reason}"
                            )));
                            let _ = suback_tx.try_send(SubAckReport::Refused(reason));
                        }
                        LoopFailure::Link(reason) => {
                            link_tx.send_replace(LinkState::Down(reason));
                        }
                    }
                    break;
                }
            };

            match MessageHandler::route_event(&event) {
                EventRoute::ConnectionAcknowledged { accepted: true, .. } => {
                    link_tx.send_replace(LinkState::Up);
                }
                EventRoute::ConnectionAcknowledged {
                    accepted: false,
                    code,
                } => {
                    link_tx.send_replace(LinkState::Rejected(code));
                    break;
                }
                EventRoute::MessageReceived { topic, payload } => {
                    debug!("Message received on {} ({} bytes)", topic, payload.len());
                    if inbound_tx
                        .send(InboundMessage { topic, payload })
                        .await
                        .is_err()
                    {
                        warn!("Inbound message dropped: no receiver");
                    }
                }
                EventRoute::SubscriptionConfirmed {
                    packet_id,
                    granted,
                    reason_codes,
                } => {
                    debug!("SubAck for packet {}: {}", packet_id, reason_codes);
                    let report = if granted {
                        SubAckReport::Granted(reason_codes)
                    } else {
                        SubAckReport::Refused(reason_codes)
                    };
                    let _ = suback_tx.try_send(report);
                }
                EventRoute::Disconnected(reason) => {
                    link_tx.send_replace(LinkState::Down(format!(
                        "disconnected by broker: {reason}"
                    )));
                    break;
                }
                EventRoute::InfrastructureEvent(event) => {
                    tracing::trace!(target: "mqtt_transport", "MQTT event: {}", event);
                }
                EventRoute::OutgoingEvent => {}
            }
        }
        debug!("MQTT event loop stopped");
    }

    /// Wait for the event loop to report the outcome of the connect
    async fn wait_for_connack(
        mut link_rx: watch::Receiver<LinkState>,
        shutdown: &ShutdownSignal,
    ) -> Result<ConnectOutcome, MqttError> {
        let mut shutdown = shutdown.clone();
        loop {
            match link_rx.borrow_and_update().clone() {
                LinkState::Up => return Ok(ConnectOutcome::Accepted),
                LinkState::Rejected(code) => return Ok(ConnectOutcome::Rejected(code)),
                LinkState::Down(reason) => return Err(MqttError::ConnectionFailedStr(reason)),
                LinkState::Pending => {}
            }

            tokio::select! {
                _ = shutdown.requested() => return Err(MqttError::Cancelled),
                changed = link_rx.changed() => {
                    if changed.is_err() {
                        return Err(MqttError::ConnectionFailedStr(
                            "event loop ended before ConnAck".to_string(),
                        ));
                    }
                }
            }
        }
    }

    /// Wait for the SubAck of the subscribe just issued
    async fn wait_for_suback(
        suback_rx: &mut mpsc::Receiver<SubAckReport>,
        shutdown: &ShutdownSignal,
    ) -> Result<String, MqttError> {
        let mut shutdown = shutdown.clone();
        let report = tokio::select! {
            _ = shutdown.requested() => return Err(MqttError::Cancelled),
            report = tokio::time::timeout(SUBACK_TIMEOUT, suback_rx.recv()) => report,
        };

        match report {
            Ok(Some(SubAckReport::Granted(codes))) => Ok(codes),
            Ok(Some(SubAckReport::Refused(reason))) => Err(MqttError::SubscriptionRefused(reason)),
            Ok(None) => Err(MqttError::SubscriptionFailed(
                "event loop ended before SubAck".into(),
            )),
            Err(_) => Err(MqttError::SubscriptionFailed(
                format!("no SubAck within {SUBACK_TIMEOUT:?}").into(),
            )),
        }
    }

    /// Drop the current client and stop its event loop without a Disconnect packet
    fn teardown(&mut self) {
        self.client = None;
        self.link_rx = None;
        self.suback_rx = None;
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

impl Default for RumqttcSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerSession for RumqttcSession {
    async fn connect(
        &mut self,
        endpoint: &BrokerEndpoint,
        shutdown: &ShutdownSignal,
    ) -> Result<ConnectOutcome, MqttError> {
        self.teardown();

        let options = configure_mqtt_options(endpoint)?;
        debug!(
            "Connecting to {}:{} as {}",
            endpoint.address,
            endpoint.port,
            options.client_id()
        );

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (link_tx, link_rx) = watch::channel(LinkState::Pending);
        let (suback_tx, suback_rx) = mpsc::channel(SUBACK_CAPACITY);

        let span = crate::mqtt_span!(operation = "event_loop", broker = %endpoint.address);
        let handle = tokio::spawn(
            Self::run_event_loop(event_loop, link_tx, suback_tx, self.inbound_tx.clone())
                .instrument(span),
        );

        self.client = Some(client);
        self.link_rx = Some(link_rx.clone());
        self.suback_rx = Some(suback_rx);
        self.event_loop_handle = Some(handle);

        Self::wait_for_connack(link_rx, shutdown).await
    }

    /// Subscribe and wait for the broker to acknowledge it
    async fn subscribe(&mut self, topic: &str, shutdown: &ShutdownSignal) -> Result<(), MqttError> {
        let (Some(client), Some(suback_rx)) = (self.client.as_ref(), self.suback_rx.as_mut()) else {
            return Err(MqttError::NotConnected);
        };

        // acks left over from an earlier attempt on this connection
        while suback_rx.try_recv().is_ok() {}

        let mut cancel = shutdown.clone();
        tokio::select! {
            _ = cancel.requested() => return Err(MqttError::Cancelled),
            result = client.subscribe(topic, QoS::AtLeastOnce) => {
                result.map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))?;
            }
        }

        let codes = Self::wait_for_suback(suback_rx, shutdown).await?;
        debug!("Subscription to {} granted: {}", topic, codes);
        Ok(())
    }

    async fn ping(&mut self) -> Result<bool, MqttError> {
        let link_rx = self.link_rx.as_ref().ok_or(MqttError::NotConnected)?;
        let loop_alive = self
            .event_loop_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());

        Ok(loop_alive && *link_rx.borrow() == LinkState::Up)
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        let link_up = self
            .link_rx
            .as_ref()
            .is_some_and(|link_rx| *link_rx.borrow() == LinkState::Up);
        let Some(client) = self.client.take().filter(|_| link_up) else {
            // nothing to say to a broker that already closed or refused the link
            self.teardown();
            return Ok(());
        };

        let result = client
            .disconnect()
            .await
            .map_err(|e| MqttError::DisconnectFailed(Box::new(e)));
        // the event loop ends once every client handle is gone
        drop(client);
        self.link_rx = None;
        self.suback_rx = None;

        if let Some(handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(EVENT_LOOP_SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => debug!("Event loop task shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => warn!("Event loop task ended with error: {}", e),
                Err(_) => warn!("Event loop task didn't shut down gracefully, forcing abort"),
                _ => {}
            }
        }

        result
    }

    fn take_messages(&mut self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.inbound_rx.take()
    }
}

impl Drop for RumqttcSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_endpoint() -> BrokerEndpoint {
        BrokerEndpoint {
            address: "127.0.0.1".to_string(),
            // reserved port, nothing listens here
            port: 1,
            username: None,
            password: None,
            topic: "home/daylight".to_string(),
            reconnect_delay: Duration::from_secs(10),
            keep_alive: Duration::from_secs(30),
            client_id: None,
        }
    }

    #[tokio::test]
    async fn test_operations_fail_before_connect() {
        let mut session = RumqttcSession::new();
        let shutdown = ShutdownSignal::never();

        assert!(matches!(session.ping().await, Err(MqttError::NotConnected)));
        assert!(matches!(
            session.subscribe("home/daylight", &shutdown).await,
            Err(MqttError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let mut session = RumqttcSession::new();
        assert!(session.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_take_messages_once() {
        let mut session = RumqttcSession::new();
        assert!(session.take_messages().is_some());
        assert!(session.take_messages().is_none());
    }

    #[tokio::test]
    async fn test_connect_refused_reports_failure() {
        let mut session = RumqttcSession::new();
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            session.connect(&unreachable_endpoint(), &ShutdownSignal::never()),
        )
        .await
        .expect("refused connection should fail fast");

        assert!(matches!(result, Err(MqttError::ConnectionFailedStr(_))));
        assert!(!session.ping().await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_cancelled_by_shutdown() {
        let (trigger, signal) = crate::shutdown::channel();
        trigger.fire();

        let mut session = RumqttcSession::new();
        let result = session.connect(&unreachable_endpoint(), &signal).await;
        // the refusal and the shutdown race; both are acceptable here but a
        // fired signal must never produce an accepted connection
        assert!(!matches!(result, Ok(ConnectOutcome::Accepted)));
        assert!(session.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_connack_accepted() {
        let (link_tx, link_rx) = watch::channel(LinkState::Pending);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            link_tx.send_replace(LinkState::Up);
            // keep the sender alive until the waiter has seen the change
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        let result = RumqttcSession::wait_for_connack(link_rx, &ShutdownSignal::never()).await;
        assert_eq!(result.unwrap(), ConnectOutcome::Accepted);
    }

    #[tokio::test]
    async fn test_wait_for_connack_rejected() {
        let (_link_tx, link_rx) = watch::channel(LinkState::Rejected("NotAuthorized".into()));
        let result = RumqttcSession::wait_for_connack(link_rx, &ShutdownSignal::never()).await;
        assert_eq!(
            result.unwrap(),
            ConnectOutcome::Rejected("NotAuthorized".to_string())
        );
    }

    #[tokio::test]
    async fn test_wait_for_connack_closed_channel() {
        let (link_tx, link_rx) = watch::channel(LinkState::Pending);
        drop(link_tx);
        let result = RumqttcSession::wait_for_connack(link_rx, &ShutdownSignal::never()).await;
        assert!(matches!(result, Err(MqttError::ConnectionFailedStr(_))));
    }

    #[tokio::test]
    async fn test_wait_for_connack_cancelled() {
        let (_link_tx, link_rx) = watch::channel(LinkState::Pending);
        let (trigger, signal) = crate::shutdown::channel();

        let waiter = tokio::spawn(async move {
            RumqttcSession::wait_for_connack(link_rx, &signal).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.fire();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(MqttError::Cancelled)));
    }
    #[tokio::test]
    async fn test_wait_for_suback_granted() {
        let (suback_tx, mut suback_rx) = mpsc::channel(SUBACK_CAPACITY);
        suback_tx.try_send(SubAckReport::Granted("[Success(AtLeastOnce)]".into())).unwrap();

        let result = RumqttcSession::wait_for_suback(&mut suback_rx, &ShutdownSignal::never()).await;
        assert_eq!(result.unwrap(), "[Success(AtLeastOnce)]");
    }

    #[tokio::test]
    async fn test_wait_for_suback_refused() {
        let (suback_tx, mut suback_rx) = mpsc::channel(SUBACK_CAPACITY);
        suback_tx.try_send(SubAckReport::Refused("NotAuthorized".into())).unwrap();

        let result = RumqttcSession::wait_for_suback(&mut suback_rx, &ShutdownSignal::never()).await;
        assert!(matches!(
            result,
            Err(MqttError::SubscriptionRefused(reason)) if reason == "NotAuthorized"
        ));
    }

    #[tokio::test]
    async fn test_wait_for_suback_event_loop_gone() {
        let (suback_tx, mut suback_rx) = mpsc::channel::<SubAckReport>(SUBACK_CAPACITY);
        drop(suback_tx);

        let result = RumqttcSession::wait_for_suback(&mut suback_rx, &ShutdownSignal::never()).await;
        assert!(matches!(result, Err(MqttError::SubscriptionFailed(_))));
    }

    #[tokio::test]
    async fn test_wait_for_suback_cancelled() {
        let (_suback_tx, mut suback_rx) = mpsc::channel::<SubAckReport>(SUBACK_CAPACITY);
        let (trigger, signal) = crate::shutdown::channel();
        trigger.fire();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            RumqttcSession::wait_for_suback(&mut suback_rx, &signal),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(MqttError::Cancelled)));
    }
}
