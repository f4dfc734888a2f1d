use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use pulse_core::{decode_frame, ConnectionStatus, Event, ServiceName, NORMAL_CLOSURE};
use pulse_telemetry::{MetricSample, MetricsRecorder};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{LinkConfig, ServiceEndpoint};
use crate::dispatcher::EventDispatcher;
use crate::error::TransportError;
use crate::status::{self, ConnectionState, LinkStats, ServiceStatus};
use crate::transport::{Frame, Link, Transport};

const CLOSE_SEND_TIMEOUT: Duration = Duration::from_secs(1);

struct ServiceSlot {
    address: String,
    state: ConnectionState,
    retries: u32,
    last_error: Option<String>,
    exhausted: bool,
    /// Bumped on every connect and deliberate close. Tasks and timers carry
    /// the value they were started with and stand down on mismatch.
    generation: u64,
    connection: Option<CancellationToken>,
    reconnect_timer: Option<JoinHandle<()>>,
    last_change: DateTime<Utc>,
}

impl ServiceSlot {
    fn new(address: String) -> Self {
        Self {
            address,
            state: ConnectionState::Closed,
            retries: 0,
            last_error: None,
            exhausted: false,
            generation: 0,
            connection: None,
            reconnect_timer: None,
            last_change: Utc::now(),
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.last_change = Utc::now();
        }
    }
}

/// Keeps one persistent connection per configured service and feeds the
/// decoded events into an [`EventDispatcher`].
///
/// Every public method is synchronous: it updates the slot table and spawns
/// whatever asynchronous work is needed on the current tokio runtime.
/// Dropping the manager shuts it down.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    endpoints: Vec<ServiceEndpoint>,
    config: LinkConfig,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<EventDispatcher>,
    metrics: Arc<MetricsRecorder>,
    slots: DashMap<ServiceName, ServiceSlot>,
    destroyed: AtomicBool,
}

impl ConnectionManager {
    pub fn new(
        endpoints: Vec<ServiceEndpoint>,
        config: LinkConfig,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<EventDispatcher>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        let slots = DashMap::new();
        for endpoint in &endpoints {
            slots.insert(
                endpoint.name.clone(),
                ServiceSlot::new(endpoint.address.clone()),
            );
        }
        Self {
            inner: Arc::new(Inner {
                endpoints,
                config,
                transport,
                dispatcher,
                metrics,
                slots,
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.inner.dispatcher
    }

    pub fn endpoints(&self) -> &[ServiceEndpoint] {
        &self.inner.endpoints
    }

    /// Start a connection attempt for every service that is not already
    /// open or connecting. Returns how many attempts were started.
    pub fn connect_all(&self) -> usize {
        let mut started = 0;
        for endpoint in &self.inner.endpoints {
            if self.inner.connect(endpoint.name.as_str()) {
                started += 1;
            }
        }
        started
    }

    /// Start a connection attempt for one service, clearing its retry
    /// budget. Returns false for an unknown service, one that is already
    /// open or connecting, or after shutdown.
    pub fn connect(&self, service: &str) -> bool {
        self.inner.connect(service)
    }

    /// Close every connection with a normal-closure frame and cancel all
    /// pending reconnection timers.
    pub fn disconnect_all(&self) {
        for endpoint in &self.inner.endpoints {
            self.inner.close_slot(&endpoint.name, false);
        }
    }

    /// Reset every retry counter, close what is open and reconnect at once.
    pub fn reconnect_all(&self) {
        if self.inner.is_destroyed() {
            return;
        }
        info!("manual reconnect of all services");
        for endpoint in &self.inner.endpoints {
            self.inner.close_slot(&endpoint.name, true);
        }
        self.connect_all();
    }

    /// Disconnect everything and refuse all further connection work.
    pub fn shutdown(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.disconnect_all();
        debug!("connection manager shut down");
    }

    /// Service name to "currently open".
    pub fn get_connection_status(&self) -> BTreeMap<String, bool> {
        self.inner
            .endpoints
            .iter()
            .map(|endpoint| {
                let open = self
                    .inner
                    .slots
                    .get(&endpoint.name)
                    .is_some_and(|slot| slot.state == ConnectionState::Open);
                (endpoint.name.to_string(), open)
            })
            .collect()
    }

    /// Detailed per-service health, in configuration order.
    pub fn service_statuses(&self) -> Vec<ServiceStatus> {
        self.inner
            .endpoints
            .iter()
            .filter_map(|endpoint| {
                let slot = self.inner.slots.get(&endpoint.name)?;
                Some(ServiceStatus {
                    service: endpoint.name.to_string(),
                    address: slot.address.clone(),
                    state: slot.state,
                    open: slot.state == ConnectionState::Open,
                    retries: slot.retries,
                    last_error: slot.last_error.clone(),
                    exhausted: slot.exhausted,
                    reconnect_pending: slot.reconnect_timer.is_some(),
                    last_change: slot.last_change,
                })
            })
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.inner.open_count()
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats::from_metrics(&self.inner.metrics)
    }

    /// Every recorded series, including per-service labels.
    pub fn metrics(&self) -> Vec<MetricSample> {
        self.inner.metrics.snapshot()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn open_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == ConnectionState::Open)
            .count()
    }

    fn refresh_open_gauge(&self) {
        self.metrics
            .gauge_set(status::SERVICES_OPEN, &[], self.open_count() as i64);
    }

    fn emit(&self, event: Event) {
        self.dispatcher.notify(&event);
    }

    /// Manual connect. Clears an exhausted retry budget.
    fn connect(self: &Arc<Self>, service: &str) -> bool {
        self.start_attempt(service, None)
    }

    /// Begin a connection attempt. With `expected` set, the attempt only
    /// starts if the slot is still on that generation; the check and the
    /// start share one critical section so a concurrent `close_slot` wins.
    fn start_attempt(self: &Arc<Self>, service: &str, expected: Option<u64>) -> bool {
        if self.is_destroyed() {
            return false;
        }
        let Some(mut slot) = self.slots.get_mut(service) else {
            warn!(service, "connect requested for unknown service");
            return false;
        };
        if let Some(generation) = expected {
            if slot.generation != generation {
                return false;
            }
            // Detach rather than abort: the caller is the timer.
            slot.reconnect_timer = None;
        }
        if matches!(slot.state, ConnectionState::Open | ConnectionState::Connecting) {
            return false;
        }
        if expected.is_none() {
            slot.retries = 0;
            slot.exhausted = false;
        }
        if let Some(timer) = slot.reconnect_timer.take() {
            timer.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;
        let token = CancellationToken::new();
        slot.connection = Some(token.clone());
        slot.set_state(ConnectionState::Connecting);
        let endpoint = ServiceEndpoint::new(slot.key().clone(), slot.address.clone());
        drop(slot);

        debug!(service, generation, address = %endpoint.address, "connecting");
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_connection(endpoint, generation, token).await;
        });
        true
    }

    async fn run_connection(
        self: Arc<Self>,
        endpoint: ServiceEndpoint,
        generation: u64,
        token: CancellationToken,
    ) {
        let name = endpoint.name.clone();
        let timeout = self.config.connect_timeout;
        let attempt = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = tokio::time::timeout(timeout, self.transport.connect(&endpoint)) => result,
        };
        let link = match attempt {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                self.on_error(&name, generation, &e);
                return;
            }
            Err(_) => {
                self.on_error(&name, generation, &TransportError::Timeout(timeout));
                return;
            }
        };
        if !self.on_open(&name, generation) {
            return;
        }

        let Link {
            mut sink,
            mut stream,
        } = link;
        let period = self.config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    let close = sink.send(Frame::Close(Some(NORMAL_CLOSURE)));
                    if tokio::time::timeout(CLOSE_SEND_TIMEOUT, close).await.is_err() {
                        debug!(service = %name, "close frame not flushed before timeout");
                    }
                    return;
                }
                _ = heartbeat.tick() => {
                    let ping = Frame::Text(self.config.keepalive_payload.clone());
                    if let Err(e) = sink.send(ping).await {
                        self.on_error(&name, generation, &e);
                        return;
                    }
                    trace!(service = %name, "sent keep-alive");
                }
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.handle_text(&name, &text),
                    Some(Ok(Frame::Close(code))) => {
                        self.on_close(&name, generation, code);
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.on_error(&name, generation, &e);
                        return;
                    }
                    None => {
                        self.on_close(&name, generation, None);
                        return;
                    }
                },
            }
        }
    }

    fn handle_text(&self, service: &ServiceName, text: &str) {
        let labels = [("service", service.as_str())];
        self.metrics.counter_inc(status::FRAMES_RECEIVED, &labels, 1);
        match decode_frame(text) {
            Ok(frame) => match frame.into_event(service) {
                Some(event) => {
                    self.metrics
                        .counter_inc(status::EVENTS_DISPATCHED, &labels, 1);
                    self.dispatcher.notify(&event);
                }
                None => {
                    self.metrics
                        .counter_inc(status::KEEPALIVES_DROPPED, &labels, 1);
                    trace!(service = %service, "keep-alive received");
                }
            },
            Err(e) => {
                self.metrics
                    .counter_inc(status::MALFORMED_DROPPED, &labels, 1);
                warn!(
                    service = %service,
                    kind = e.error_kind(),
                    error = %e,
                    "dropping malformed frame"
                );
            }
        }
    }

    /// Returns false when the attempt is stale and its link must be dropped.
    fn on_open(&self, service: &ServiceName, generation: u64) -> bool {
        {
            let Some(mut slot) = self.slots.get_mut(service) else {
                return false;
            };
            if slot.generation != generation {
                return false;
            }
            slot.retries = 0;
            slot.exhausted = false;
            slot.last_error = None;
            slot.set_state(ConnectionState::Open);
        }
        self.metrics.counter_inc(
            status::CONNECTIONS_OPENED,
            &[("service", service.as_str())],
            1,
        );
        self.refresh_open_gauge();
        info!(service = %service, "connected");
        self.emit(Event::connection(
            service.clone(),
            ConnectionStatus::Connected,
            None,
            None,
        ));
        true
    }

    fn on_close(self: &Arc<Self>, service: &ServiceName, generation: u64, code: Option<u16>) {
        {
            let Some(mut slot) = self.slots.get_mut(service) else {
                return;
            };
            if slot.generation != generation {
                return;
            }
            slot.connection = None;
            slot.set_state(ConnectionState::Closed);
        }
        self.refresh_open_gauge();
        let normal = code == Some(NORMAL_CLOSURE);
        if normal {
            info!(service = %service, "closed by peer");
        } else {
            warn!(service = %service, code = ?code, "connection closed abnormally");
        }
        self.emit(Event::connection(
            service.clone(),
            ConnectionStatus::Disconnected,
            code,
            None,
        ));
        if !normal {
            self.schedule_reconnect(service, generation);
        }
    }

    fn on_error(self: &Arc<Self>, service: &ServiceName, generation: u64, error: &TransportError) {
        let detail = error.to_string();
        {
            let Some(mut slot) = self.slots.get_mut(service) else {
                return;
            };
            if slot.generation != generation {
                return;
            }
            slot.connection = None;
            slot.last_error = Some(detail.clone());
            slot.set_state(ConnectionState::Error);
        }
        self.metrics.counter_inc(
            status::CONNECTION_ERRORS,
            &[("service", service.as_str()), ("kind", error.kind())],
            1,
        );
        self.refresh_open_gauge();
        warn!(service = %service, error = %detail, "connection error");
        self.emit(Event::connection(
            service.clone(),
            ConnectionStatus::Error,
            None,
            Some(detail),
        ));
        self.schedule_reconnect(service, generation);
    }

    fn schedule_reconnect(self: &Arc<Self>, service: &ServiceName, generation: u64) {
        if self.is_destroyed() {
            return;
        }
        let Some(mut slot) = self.slots.get_mut(service) else {
            return;
        };
        if slot.generation != generation || slot.reconnect_timer.is_some() {
            return;
        }
        let policy = &self.config.reconnect;
        let attempt = slot.retries + 1;
        if !policy.allows(attempt) {
            let first = !slot.exhausted;
            slot.exhausted = true;
            drop(slot);
            if first {
                warn!(
                    service = %service,
                    attempts = policy.max_attempts,
                    "reconnection attempts exhausted, giving up until manual reconnect"
                );
            }
            return;
        }
        slot.retries = attempt;
        let delay = policy.delay_for(attempt);
        let inner = Arc::clone(self);
        let timer_service = service.clone();
        slot.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire_reconnect(&timer_service, generation);
        }));
        drop(slot);

        self.metrics.counter_inc(
            status::RECONNECTS_SCHEDULED,
            &[("service", service.as_str())],
            1,
        );
        info!(
            service = %service,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
    }

    fn fire_reconnect(self: &Arc<Self>, service: &ServiceName, generation: u64) -> bool {
        self.start_attempt(service.as_str(), Some(generation))
    }

    /// Close one slot deliberately. Stale tasks and timers are invalidated
    /// in the same critical section.
    fn close_slot(&self, service: &ServiceName, reset_retries: bool) {
        let was_open = {
            let Some(mut slot) = self.slots.get_mut(service) else {
                return;
            };
            slot.generation += 1;
            if let Some(token) = slot.connection.take() {
                token.cancel();
            }
            if let Some(timer) = slot.reconnect_timer.take() {
                timer.abort();
            }
            if reset_retries {
                slot.retries = 0;
                slot.exhausted = false;
            }
            let was_open = slot.state == ConnectionState::Open;
            slot.set_state(ConnectionState::Closed);
            was_open
        };
        self.refresh_open_gauge();
        if was_open {
            info!(service = %service, "disconnected");
            self.emit(Event::connection(
                service.clone(),
                ConnectionStatus::Disconnected,
                Some(NORMAL_CLOSURE),
                None,
            ));
        }
    }
}
