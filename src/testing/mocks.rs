//! Mock implementations for testing
//!
//! Provides a scripted broker session, a recording command target and a fixed
//! network check so the supervisor and command pipeline can be exercised
//! without a broker or the control utility.

use crate::command::{ApplyCommand, CommandPayload};
use crate::config::BrokerEndpoint;
use crate::shutdown::ShutdownSignal;
use crate::transport::{
    BrokerSession, ConnectOutcome, InboundMessage, MqttError, NetworkCheck,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// A call made on [`MockSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Connect,
    Subscribe(String),
    Ping,
    Disconnect,
}

/// Scripted result of one connect call
#[derive(Debug, Clone)]
pub enum MockConnect {
    Accept,
    Reject(String),
    Fail(String),
    /// Never completes until shutdown fires, then reports cancellation
    BlockUntilShutdown,
}

#[derive(Default)]
struct Script {
    connects: VecDeque<MockConnect>,
    pings: VecDeque<Result<bool, String>>,
    subscribe_failure: Option<String>,
    blocking_disconnect: bool,
}

/// Scripted broker session
///
/// Unscripted connects are accepted and unscripted pings succeed.
pub struct MockSession {
    calls: Arc<Mutex<Vec<SessionCall>>>,
    script: Arc<Mutex<Script>>,
    cancelled_connects: Arc<AtomicUsize>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Option<mpsc::Receiver<InboundMessage>>,
}

/// Inspection and injection handle that outlives the moved session
#[derive(Clone)]
pub struct MockSessionHandle {
    calls: Arc<Mutex<Vec<SessionCall>>>,
    cancelled_connects: Arc<AtomicUsize>,
    inbound_tx: mpsc::Sender<InboundMessage>,
}

impl MockSession {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(Script::default())),
            cancelled_connects: Arc::new(AtomicUsize::new(0)),
            inbound_tx,
            inbound_rx: Some(inbound_rx),
        }
    }

    pub fn with_connects(self, connects: impl IntoIterator<Item = MockConnect>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.connects.extend(connects);
        }
        self
    }

    pub fn with_pings(self, pings: impl IntoIterator<Item = Result<bool, String>>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.pings.extend(pings);
        }
        self
    }

    pub fn with_subscribe_failure(self, reason: impl Into<String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.subscribe_failure = Some(reason.into());
        }
        self
    }

    /// Disconnect never completes
    pub fn with_blocking_disconnect(self) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.blocking_disconnect = true;
        }
        self
    }

    pub fn handle(&self) -> MockSessionHandle {
        MockSessionHandle {
            calls: self.calls.clone(),
            cancelled_connects: self.cancelled_connects.clone(),
            inbound_tx: self.inbound_tx.clone(),
        }
    }

    fn record(&self, call: SessionCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerSession for MockSession {
    async fn connect(
        &mut self,
        _endpoint: &BrokerEndpoint,
        shutdown: &ShutdownSignal,
    ) -> Result<ConnectOutcome, MqttError> {
        self.record(SessionCall::Connect);
        let next = self.script.lock().unwrap().connects.pop_front();

        match next.unwrap_or(MockConnect::Accept) {
            MockConnect::Accept => Ok(ConnectOutcome::Accepted),
            MockConnect::Reject(code) => Ok(ConnectOutcome::Rejected(code)),
            MockConnect::Fail(reason) => Err(MqttError::ConnectionFailedStr(reason)),
            MockConnect::BlockUntilShutdown => {
                let mut shutdown = shutdown.clone();
                shutdown.requested().await;
                self.cancelled_connects.fetch_add(1, Ordering::SeqCst);
                Err(MqttError::Cancelled)
            }
        }
    }

    async fn subscribe(&mut self, topic: &str, _shutdown: &ShutdownSignal) -> Result<(), MqttError> {
        self.record(SessionCall::Subscribe(topic.to_string()));
        match self.script.lock().unwrap().subscribe_failure.clone() {
            Some(reason) => Err(MqttError::SubscriptionFailed(reason.into())),
            None => Ok(()),
        }
    }

    async fn ping(&mut self) -> Result<bool, MqttError> {
        self.record(SessionCall::Ping);
        match self.script.lock().unwrap().pings.pop_front() {
            Some(Ok(alive)) => Ok(alive),
            Some(Err(reason)) => Err(MqttError::ConnectionFailedStr(reason)),
            None => Ok(true),
        }
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        self.record(SessionCall::Disconnect);
        let blocking = self.script.lock().unwrap().blocking_disconnect;
        if blocking {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn take_messages(&mut self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.inbound_rx.take()
    }
}

impl MockSessionHandle {
    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &SessionCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn cancelled_connects(&self) -> usize {
        self.cancelled_connects.load(Ordering::SeqCst)
    }

    /// Deliver a raw payload as if it arrived on `topic`
    pub async fn deliver(&self, topic: &str, payload: &[u8]) {
        self.inbound_tx
            .send(InboundMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            })
            .await
            .expect("supervisor dropped the message stream");
    }

    /// Wait until at least `n` calls matching `call` were recorded
    pub async fn wait_for(&self, call: &SessionCall, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.count(call) >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.count(call) >= n
    }
}

/// Command target that records every payload it is asked to apply
#[derive(Default)]
pub struct RecordingApplier {
    applied: tokio::sync::Mutex<Vec<CommandPayload>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every apply takes `delay` to complete
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub async fn applied(&self) -> Vec<CommandPayload> {
        self.applied.lock().await.clone()
    }

    /// Highest number of concurrently running applies observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn wait_for_count(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.applied.lock().await.len() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.applied.lock().await.len() >= n
    }
}

#[async_trait]
impl ApplyCommand for RecordingApplier {
    async fn apply(&self, payload: CommandPayload) {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        self.applied.lock().await.push(payload);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Network check that becomes available after a fixed number of polls
pub struct FixedNetworkCheck {
    available_after: Option<usize>,
    polls: AtomicUsize,
}

impl FixedNetworkCheck {
    pub fn available() -> Self {
        Self::available_after(1)
    }

    pub fn available_after(polls: usize) -> Self {
        Self {
            available_after: Some(polls),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available_after: None,
            polls: AtomicUsize::new(0),
        }
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkCheck for FixedNetworkCheck {
    async fn is_available(&self) -> bool {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        self.available_after.is_some_and(|n| polls >= n)
    }
}
