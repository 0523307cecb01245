//! Connection supervisor
//!
//! Owns the broker session for the lifetime of the process. [`start`] waits
//! for the network, runs the first connect-and-subscribe and launches the
//! keepalive loop; the loop probes the connection every reconnect delay and
//! performs a full reconnect with resubscribe whenever the probe fails.
//! Received messages are decoded and handed to an [`ApplyCommand`] target.
//!
//! No failure inside the supervisor ever reaches the caller: every error is
//! logged, and cancellation is logged as a normal stop.
//!
//! [`start`]: ConnectionSupervisor::start

use crate::command::{decode, ApplyCommand};
use crate::config::BrokerEndpoint;
use crate::shutdown::{self, ShutdownSignal, ShutdownTrigger};
use crate::transport::mqtt::{ConnectionEvent, ConnectionState, HealthMonitor};
use crate::transport::network::{wait_until_available, NETWORK_POLL_INTERVAL};
use crate::transport::{
    BrokerSession, ConnectOutcome, InboundMessage, InterfaceNetworkCheck, MqttError,
    NetworkCheck,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Bounded wait for the disconnect in [`ConnectionSupervisor::stop`]
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded wait for background tasks in [`ConnectionSupervisor::stop`]
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

type SharedSession = Arc<Mutex<Box<dyn BrokerSession>>>;

pub struct ConnectionSupervisor {
    endpoint: BrokerEndpoint,
    session: SharedSession,
    messages: std::sync::Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    target: Arc<dyn ApplyCommand>,
    network: Arc<dyn NetworkCheck>,
    network_poll_interval: Duration,
    state_tx: watch::Sender<ConnectionState>,
    reconnect_count: AtomicU32,
    trigger: ShutdownTrigger,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    pub fn new(
        endpoint: BrokerEndpoint,
        mut session: impl BrokerSession + 'static,
        target: Arc<dyn ApplyCommand>,
    ) -> Self {
        let messages = session.take_messages();
        let session: Box<dyn BrokerSession> = Box::new(session);
        let network = Arc::new(InterfaceNetworkCheck);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (trigger, _) = shutdown::channel();

        Self {
            endpoint,
            session: Arc::new(Mutex::new(session)),
            messages: std::sync::Mutex::new(messages),
            target,
            network,
            network_poll_interval: NETWORK_POLL_INTERVAL,
            state_tx,
            reconnect_count: AtomicU32::new(0),
            trigger,
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Replace the network availability check
    pub fn with_network_check(
        mut self,
        network: Arc<dyn NetworkCheck>,
        poll_interval: Duration,
    ) -> Self {
        self.network = network;
        self.network_poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Number of reconnects triggered by failed liveness probes
    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    /// Connect, subscribe and launch the keepalive loop
    ///
    /// Returns once the initial attempt has completed, whatever its outcome.
    /// Blocks while the network is unavailable unless `shutdown` fires.
    pub async fn start(self: &Arc<Self>, shutdown: &ShutdownSignal) {
        let span = crate::lifecycle_span!(
            phase = "start",
            broker = %self.endpoint.address,
            topic = %self.endpoint.topic
        );

        async {
            info!("Service started");
            self.track(shutdown.forward_to(&self.trigger));
            let signal = self.trigger.signal();

            self.spawn_dispatch(signal.clone());

            if !wait_until_available(self.network.as_ref(), self.network_poll_interval, &signal)
                .await
            {
                info!("Service cancelled while waiting for network");
                return;
            }

            {
                let mut session = self.session.lock().await;
                self.connect_and_subscribe(&mut **session, &signal).await;
            }

            if signal.is_requested() {
                return;
            }

            let supervisor = Arc::clone(self);
            let keepalive = tokio::spawn(
                async move { supervisor.keepalive_loop(signal).await }
                    .instrument(crate::mqtt_span!(operation = "keepalive")),
            );
            self.track(keepalive);
        }
        .instrument(span)
        .await
    }

    /// Disconnect gracefully and wait for background tasks
    ///
    /// The disconnect is bounded by its own timeout and abandoned as soon as
    /// `shutdown` fires. Never fails; disconnect problems are logged.
    pub async fn stop(&self, shutdown: &ShutdownSignal) {
        info!("Disconnecting MQTT client...");
        self.trigger.fire();

        let session = self.session.clone();
        let disconnect = async move {
            let mut session = session.lock().await;
            session.disconnect().await
        };

        // the disconnect is always attempted once, even with `shutdown` already fired
        let mut cancel = shutdown.clone();
        tokio::select! {
            biased;
            result = tokio::time::timeout(DISCONNECT_TIMEOUT, disconnect) => match result {
                Ok(Ok(())) => info!("MQTT client disconnected"),
                Ok(Err(MqttError::Cancelled)) => info!("Service cancelled"),
                Ok(Err(e)) => error!("Error while disconnecting MQTT client: {}", e),
                Err(_) => warn!("Disconnect didn't complete within {:?}", DISCONNECT_TIMEOUT),
            },
            _ = cancel.requested() => info!("Service cancelled, disconnect abandoned"),
        }
        self.transition(ConnectionEvent::Disconnected);

        self.join_tasks(TASK_JOIN_TIMEOUT).await;
        info!("Service stopped");
    }

    fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(handle);
        }
    }

    async fn join_tasks(&self, timeout: Duration) {
        let handles: Vec<_> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => return,
        };
        let deadline = Instant::now() + timeout;

        for handle in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if !e.is_cancelled() => error!("Background task failed: {}", e),
                Ok(Err(_)) => {}
                Err(_) => warn!("Background task didn't stop within {:?}", timeout),
            }
        }
    }

    fn transition(&self, event: ConnectionEvent) {
        self.state_tx.send_modify(|state| {
            let next = HealthMonitor::determine_next_state(state, event);
            HealthMonitor::log_state_transition(state, &next);
            *state = next;
        });
    }

    /// One connect attempt followed by a subscribe when accepted
    ///
    /// The caller holds the session lock for the whole sequence.
    async fn connect_and_subscribe(
        &self,
        session: &mut dyn BrokerSession,
        shutdown: &ShutdownSignal,
    ) {
        let endpoint = &self.endpoint;
        self.transition(ConnectionEvent::ConnectStarted);

        match session.connect(endpoint, shutdown).await {
            Ok(ConnectOutcome::Accepted) => {
                info!("Connected to {}:{}", endpoint.address, endpoint.port);
                self.transition(ConnectionEvent::ConnectAccepted);
            }
            Ok(ConnectOutcome::Rejected(code)) => {
                warn!("Connection status: {}", code);
                self.transition(ConnectionEvent::ConnectFailed(format!("rejected: {code}")));
                return;
            }
            Err(MqttError::Cancelled) => {
                info!("Service cancelled during connect");
                self.transition(ConnectionEvent::Disconnected);
                return;
            }
            Err(e) => {
                error!("Error while connecting: {}", e);
                self.transition(ConnectionEvent::ConnectFailed(e.to_string()));
                return;
            }
        }

        self.transition(ConnectionEvent::SubscribeStarted);
        match session.subscribe(&endpoint.topic, shutdown).await {
            Ok(()) => {
                info!("Subscribed to topic {}", endpoint.topic);
                self.transition(ConnectionEvent::SubscribeAcknowledged);
            }
            Err(MqttError::Cancelled) => {
                info!("Service cancelled during subscribe");
                self.transition(ConnectionEvent::SubscribeFailed("cancelled".to_string()));
            }
            Err(e) => {
                error!("MQTT client can't subscribe to topic {}: {}", endpoint.topic, e);
                self.transition(ConnectionEvent::SubscribeFailed(e.to_string()));
            }
        }
    }

    /// Probe, then wait one reconnect delay, until shutdown
    async fn keepalive_loop(self: Arc<Self>, shutdown: ShutdownSignal) {
        debug!(
            "Keepalive loop started, interval {:?}",
            self.endpoint.reconnect_delay
        );

        while !shutdown.is_requested() {
            self.keepalive_tick(&shutdown).await;

            if !shutdown.interruptible_sleep(self.endpoint.reconnect_delay).await {
                break;
            }
        }

        debug!("Keepalive loop stopped");
    }

    async fn keepalive_tick(&self, shutdown: &ShutdownSignal) {
        let mut session = self.session.lock().await;

        let failure = match session.ping().await {
            Ok(true) => {
                debug!("MQTT client keeps the connection");
                return;
            }
            Ok(false) => "liveness probe failed".to_string(),
            Err(e) => format!("liveness probe error: {e}"),
        };

        if shutdown.is_requested() {
            return;
        }

        warn!("MQTT client not connected ({}), trying to reconnect...", failure);
        self.transition(ConnectionEvent::ProbeFailed(failure));
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
        self.transition(ConnectionEvent::ResetForReconnect);

        self.connect_and_subscribe(&mut **session, shutdown).await;
    }

    fn spawn_dispatch(&self, shutdown: ShutdownSignal) {
        let messages = self.messages.lock().ok().and_then(|mut guard| guard.take());
        let Some(messages) = messages else {
            warn!("Message stream already taken, received messages will not be dispatched");
            return;
        };

        let target = self.target.clone();
        let handle = tokio::spawn(
            Self::dispatch_loop(messages, target, shutdown)
                .instrument(crate::mqtt_span!(operation = "dispatch")),
        );
        self.track(handle);
    }

    async fn dispatch_loop(
        mut messages: mpsc::Receiver<InboundMessage>,
        target: Arc<dyn ApplyCommand>,
        mut shutdown: ShutdownSignal,
    ) {
        loop {
            let message = tokio::select! {
                _ = shutdown.requested() => break,
                message = messages.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match decode(&message.payload) {
                Ok(payload) => {
                    debug!(
                        topic = %message.topic,
                        brightness = payload.brightness().value(),
                        color = payload.color().value(),
                        "Received message"
                    );
                    target.apply(payload).await;
                }
                Err(e) => error!(topic = %message.topic, "Error while processing message: {}", e),
            }
        }
        debug!("Message dispatch stopped");
    }
}
