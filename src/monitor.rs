// src/monitor.rs - Per-server connection/subscription lifecycle
//
// One AlarmMonitor task per configured server. The task owns its session,
// its subscription and its recurrence state; nothing here is shared across
// servers except the dispatch queue and the read-only directories.

use crate::client::{AlarmSession, ServerTarget, SessionFactory, SubscriptionHandle};
use crate::config::{Config, ConnectionConfig, RoutingConfig, SubscriptionConfig};
use crate::dedup::RecurrenceSet;
use crate::directory::RecipientDirectory;
use crate::dispatch::DispatchQueue;
use crate::event::{normalize, EventSink, RawAlarmEvent};
use crate::router;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Session lifecycle states. Transitions are driven only by the monitor
/// task owning the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Subscribing,
    Active,
    Backoff,
}

/// Per-session event pipeline: normalize, log, dedup, route, enqueue.
/// Supplied to the session as its event sink and discarded on teardown.
/// The recurrence set is shared only between rebuilds of the same
/// connection's subscription, never across servers.
pub struct AlarmPipeline {
    source_address: String,
    recurrence: Arc<Mutex<RecurrenceSet>>,
    directory: Arc<RecipientDirectory>,
    routing: Arc<RoutingConfig>,
    queue: DispatchQueue,
}

impl AlarmPipeline {
    pub fn new(
        source_address: String,
        recurrence: Arc<Mutex<RecurrenceSet>>,
        directory: Arc<RecipientDirectory>,
        routing: Arc<RoutingConfig>,
        queue: DispatchQueue,
    ) -> Self {
        Self {
            source_address,
            recurrence,
            directory,
            routing,
            queue,
        }
    }

    fn handle(&mut self, event: RawAlarmEvent, now: chrono::DateTime<chrono::Local>) {
        let record = normalize(&event, &self.source_address);

        // Every sighting is logged, including suppressed repeats.
        info!(
            target: "uamon::alarms",
            source = %record.source_address,
            record = ?record,
            "alarm event"
        );

        let fresh = match self.recurrence.lock() {
            Ok(mut set) => set.should_process(&record),
            Err(poisoned) => poisoned.into_inner().should_process(&record),
        };
        if !fresh {
            debug!(source = %self.source_address, "repeat of open alarm suppressed");
            return;
        }

        // Inactive (and acknowledgement-only) records are logged, not routed.
        if !record.is_active() {
            return;
        }

        let items = router::route(&record, &self.directory, &self.routing, now);
        if !self.routing.send_sms && !items.is_empty() {
            debug!(count = items.len(), "send_sms disabled, items go to the log transport");
        }
        for item in items {
            self.queue.enqueue(item);
        }
    }
}

impl EventSink for AlarmPipeline {
    fn event(&mut self, event: RawAlarmEvent) {
        self.handle(event, chrono::Local::now());
    }

    fn status_change(&mut self, status: &str) {
        info!(
            target: "uamon::alarms",
            source = %self.source_address,
            status,
            "status change notification"
        );
    }
}

/// Connection/subscription manager for one server.
pub struct AlarmMonitor<F: SessionFactory> {
    factory: F,
    subscription: SubscriptionConfig,
    connection: ConnectionConfig,
    routing: Arc<RoutingConfig>,
    directory: Arc<RecipientDirectory>,
    queue: DispatchQueue,
}

impl<F: SessionFactory> AlarmMonitor<F> {
    pub fn new(
        factory: F,
        config: &Config,
        directory: Arc<RecipientDirectory>,
        queue: DispatchQueue,
    ) -> Self {
        Self {
            factory,
            subscription: config.subscription.clone(),
            connection: config.connection.clone(),
            routing: Arc::new(config.routing.clone()),
            directory,
            queue,
        }
    }

    /// Run the state machine for `target` until the process stops. Never
    /// returns normally; every failure funnels into `Backoff`.
    pub async fn run(&self, target: ServerTarget) {
        let address = target.address.clone();
        let mut state = SessionState::Disconnected;
        let mut session: Option<F::Session> = None;
        let mut handle: Option<SubscriptionHandle> = None;
        let mut recurrence = Arc::new(Mutex::new(RecurrenceSet::new()));

        loop {
            state = match state {
                SessionState::Disconnected => SessionState::Connecting,

                SessionState::Connecting => match self.factory.connect(&target).await {
                    Ok(s) => {
                        info!(address = %address, "session established");
                        session = Some(s);
                        // Fresh connection, fresh recurrence state.
                        recurrence = Arc::new(Mutex::new(RecurrenceSet::new()));
                        SessionState::Subscribing
                    }
                    Err(e) => {
                        warn!(address = %address, error = %e, "connect failed, backing off");
                        SessionState::Backoff
                    }
                },

                SessionState::Subscribing => match session.as_mut() {
                    // Lost the session between states; start over.
                    None => SessionState::Disconnected,
                    Some(s) => match self.establish_subscription(s, &address, &recurrence).await {
                        Ok(h) => {
                            handle = Some(h);
                            info!(address = %address, "alarm subscription active");
                            SessionState::Active
                        }
                        Err(e) => {
                            warn!(address = %address, error = %e, "subscribe failed, backing off");
                            Self::teardown(&mut session, &mut handle).await;
                            SessionState::Backoff
                        }
                    },
                },

                SessionState::Active => {
                    sleep(Duration::from_millis(self.connection.liveness_interval_ms)).await;
                    match session.as_mut() {
                        None => SessionState::Disconnected,
                        Some(s) => match s.check_connection().await {
                        Ok(()) if s.publish_alive() => SessionState::Active,
                        Ok(()) => {
                            // Session alive, publish channel dead: rebuild the
                            // subscription without reconnecting.
                            warn!(address = %address, "dead publish channel detected, rebuilding subscription");
                            match self.establish_subscription(s, &address, &recurrence).await {
                                Ok(h) => {
                                    handle = Some(h);
                                    info!(address = %address, "subscription rebuilt");
                                    SessionState::Active
                                }
                                Err(e) => {
                                    warn!(address = %address, error = %e, "rebuild failed, backing off");
                                    Self::teardown(&mut session, &mut handle).await;
                                    SessionState::Backoff
                                }
                            }
                        }
                        Err(e) => {
                            warn!(address = %address, error = %e, "connection error, backing off");
                            Self::teardown(&mut session, &mut handle).await;
                            SessionState::Backoff
                        }
                        },
                    }
                }

                SessionState::Backoff => {
                    sleep(Duration::from_millis(self.connection.backoff_ms)).await;
                    SessionState::Connecting
                }
            };
        }
    }

    async fn establish_subscription(
        &self,
        session: &mut F::Session,
        address: &str,
        recurrence: &Arc<Mutex<RecurrenceSet>>,
    ) -> crate::error::Result<SubscriptionHandle> {
        let sink = Box::new(AlarmPipeline::new(
            address.to_string(),
            recurrence.clone(),
            self.directory.clone(),
            self.routing.clone(),
            self.queue.clone(),
        ));
        let handle = session
            .subscribe_alarms(
                &self.subscription,
                &self.routing.server_node,
                &self.routing.alarm_condition_type,
                sink,
            )
            .await?;
        // Replay currently-active conditions into the new subscription.
        session.condition_refresh(handle).await?;
        Ok(handle)
    }

    /// Best-effort teardown: delete the subscription and close the session,
    /// swallowing errors. Always runs before a new connect attempt so no
    /// subscription leaks across retries.
    async fn teardown(session: &mut Option<F::Session>, handle: &mut Option<SubscriptionHandle>) {
        if let Some(mut s) = session.take() {
            if let Some(h) = handle.take() {
                if let Err(e) = s.delete_subscription(h).await {
                    debug!(error = %e, "subscription delete failed during teardown");
                }
            }
            if let Err(e) = s.disconnect().await {
                debug!(error = %e, "disconnect failed during teardown");
            }
        }
        *handle = None;
    }
}
