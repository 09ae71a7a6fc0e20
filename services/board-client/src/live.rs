//! Live reconciliation channel.
//!
//! Keeps the session in step with the server. Any substantive push event
//! triggers a full reload. When the push channel cannot be opened on the
//! first try, the channel polls the last-updated timestamp instead and
//! reloads only when it moves forward.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use raidboard_events::SyncEvent;
use raidboard_reconcile::{
    ConnectionMachine, ConnectionState, OpenOutcome, ReconnectPlan, ServerTimestamp,
    UpdateWatermark, POST_SAVE_CHECK_DELAY,
};
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, trace, warn};

use crate::api::EventStream;
use crate::config::Config;
use crate::error::ClientError;
use crate::persistence::SaveKind;
use crate::session::Session;

/// How the channel learns about server changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Push,
    Polling,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Push => "push",
            SyncMode::Polling => "polling",
        }
    }
}

/// Published channel status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveStatus {
    pub connected: bool,
    pub mode: SyncMode,
    pub state: ConnectionState,
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self {
            connected: false,
            mode: SyncMode::Push,
            state: ConnectionState::Disconnected,
        }
    }
}

type Timer = Option<Pin<Box<Sleep>>>;

// =============================================================================
// Channel
// =============================================================================

pub struct LiveChannel {
    session: Arc<Session>,
    reconnect_delay: Duration,
    poll_interval: Duration,
    status: watch::Sender<LiveStatus>,
    saves: Option<broadcast::Receiver<SaveKind>>,
}

impl LiveChannel {
    pub fn new(session: Arc<Session>, config: &Config) -> Self {
        let (status, _) = watch::channel(LiveStatus::default());
        Self {
            session,
            reconnect_delay: config.reconnect_delay,
            poll_interval: config.poll_interval,
            status,
            saves: None,
        }
    }

    /// Listens to completed saves; in polling mode each one triggers an
    /// extra timestamp check shortly after.
    pub fn with_save_events(mut self, saves: broadcast::Receiver<SaveKind>) -> Self {
        self.saves = Some(saves);
        self
    }

    pub fn status(&self) -> watch::Receiver<LiveStatus> {
        self.status.subscribe()
    }

    /// Runs until `shutdown` turns true.
    ///
    /// `visible` reports whether anyone is looking at the board. While it is
    /// false no push connection is kept open or retried.
    pub async fn run(mut self, mut visible: watch::Receiver<bool>, mut shutdown: watch::Receiver<bool>) {
        info!(
            reconnect_delay_ms = millis(self.reconnect_delay),
            poll_interval_ms = millis(self.poll_interval),
            "starting live channel"
        );

        let mut machine = ConnectionMachine::new(self.reconnect_delay);
        let mut mode = SyncMode::Push;
        let mut stream: Option<EventStream> = None;
        let mut reconnect: Timer = None;
        let mut post_save: Timer = None;
        let mut poll: Option<Interval> = None;
        let mut watermark = UpdateWatermark::new();
        let mut visibility_open = true;

        if !*visible.borrow_and_update() {
            machine.hidden();
        }
        self.connect(&mut machine, &mut mode, &mut stream, &mut reconnect, &mut poll)
            .await;
        self.publish(&machine, mode);

        loop {
            tokio::select! {
                item = next_event(&mut stream) => {
                    match item {
                        Some(Ok(event)) => self.handle_event(event, &mut machine, &mut watermark),
                        Some(Err(e)) => {
                            warn!(error = %e, "push channel failed");
                            stream = None;
                            self.schedule_reconnect(&mut machine, &mut reconnect);
                        }
                        None => {
                            info!("push channel closed");
                            stream = None;
                            self.schedule_reconnect(&mut machine, &mut reconnect);
                        }
                    }
                }
                _ = fire(&mut reconnect) => {
                    reconnect = None;
                    if machine.timer_fired() {
                        self.open(&mut machine, &mut stream, &mut reconnect).await;
                    }
                }
                _ = tick(&mut poll) => {
                    self.check_last_updated(&mut watermark).await;
                }
                _ = fire(&mut post_save) => {
                    post_save = None;
                    self.check_last_updated(&mut watermark).await;
                }
                saved = next_save(&mut self.saves) => {
                    match saved {
                        Ok(kind) if mode == SyncMode::Polling => {
                            debug!(kind = %kind, "save completed, checking for updates");
                            post_save = Some(Box::pin(tokio::time::sleep(POST_SAVE_CHECK_DELAY)));
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "save notifications lagged");
                            if mode == SyncMode::Polling {
                                post_save = Some(Box::pin(tokio::time::sleep(POST_SAVE_CHECK_DELAY)));
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => self.saves = None,
                    }
                }
                changed = visible.changed(), if visibility_open => {
                    if changed.is_err() {
                        visibility_open = false;
                        continue;
                    }
                    let now_visible = *visible.borrow_and_update();
                    if now_visible {
                        self.on_shown(
                            &mut machine,
                            &mut mode,
                            &mut stream,
                            &mut reconnect,
                            &mut poll,
                            &mut watermark,
                        )
                        .await;
                    } else if machine.hidden() {
                        info!("hidden, closing push channel");
                        stream = None;
                        reconnect = None;
                    } else {
                        reconnect = None;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("live channel shutting down");
                        machine.teardown();
                        self.publish(&machine, mode);
                        break;
                    }
                }
            }

            self.publish(&machine, mode);
        }
    }

    fn publish(&self, machine: &ConnectionMachine, mode: SyncMode) {
        let next = LiveStatus {
            connected: machine.is_connected(),
            mode,
            state: machine.state(),
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// First connection attempt. A failure here switches to polling for good.
    async fn connect(
        &self,
        machine: &mut ConnectionMachine,
        mode: &mut SyncMode,
        stream: &mut Option<EventStream>,
        reconnect: &mut Timer,
        poll: &mut Option<Interval>,
    ) {
        if !machine.begin_connect() {
            return;
        }
        match self.session.backend().subscribe().await {
            Ok(events) => {
                self.opened(machine);
                *stream = Some(events);
            }
            Err(e) => {
                warn!(error = %e, "push channel unavailable, falling back to polling");
                machine.teardown();
                *reconnect = None;
                *mode = SyncMode::Polling;
                *poll = Some(self.poll_timer());
            }
        }
    }

    /// Later connection attempts; failures are retried after the delay.
    async fn open(
        &self,
        machine: &mut ConnectionMachine,
        stream: &mut Option<EventStream>,
        reconnect: &mut Timer,
    ) {
        match self.session.backend().subscribe().await {
            Ok(events) => {
                self.opened(machine);
                *stream = Some(events);
            }
            Err(e) => {
                warn!(error = %e, "push channel reconnect failed");
                self.schedule_reconnect(machine, reconnect);
            }
        }
    }

    fn opened(&self, machine: &mut ConnectionMachine) {
        match machine.opened() {
            OpenOutcome::First => info!("push channel connected"),
            OpenOutcome::Reconnect => {
                info!("push channel reconnected");
                self.spawn_reload("reconnected");
            }
        }
    }

    fn schedule_reconnect(&self, machine: &mut ConnectionMachine, reconnect: &mut Timer) {
        match machine.failed() {
            ReconnectPlan::Schedule(delay) => {
                info!(delay_ms = millis(delay), "scheduling push reconnect");
                *reconnect = Some(Box::pin(tokio::time::sleep(delay)));
            }
            ReconnectPlan::Suppressed => debug!("push reconnect suppressed"),
        }
    }

    async fn on_shown(
        &self,
        machine: &mut ConnectionMachine,
        mode: &mut SyncMode,
        stream: &mut Option<EventStream>,
        reconnect: &mut Timer,
        poll: &mut Option<Interval>,
        watermark: &mut UpdateWatermark,
    ) {
        let reconnect_now = machine.shown();
        match *mode {
            SyncMode::Polling => self.check_last_updated(watermark).await,
            SyncMode::Push if !reconnect_now => {}
            // Never opened yet: this is still the first attempt.
            SyncMode::Push if !machine.ever_connected() => {
                *reconnect = None;
                self.connect(machine, mode, stream, reconnect, poll).await;
            }
            SyncMode::Push => {
                if machine.begin_connect() {
                    info!("visible again, reconnecting");
                    *reconnect = None;
                    self.open(machine, stream, reconnect).await;
                }
            }
        }
    }

    fn handle_event(
        &self,
        event: SyncEvent,
        machine: &mut ConnectionMachine,
        watermark: &mut UpdateWatermark,
    ) {
        match &event {
            SyncEvent::Connected | SyncEvent::Heartbeat => {
                trace!(event = %event.name(), "keep-alive");
                machine.heartbeat();
            }
            SyncEvent::LastUpdated(raw) => match ServerTimestamp::parse(raw) {
                Ok(ts) => {
                    watermark.observe(ts);
                }
                Err(e) => debug!(error = %e, "ignoring unparsable lastUpdated"),
            },
            SyncEvent::Changed { .. } | SyncEvent::WeekAdvanced => {
                debug!(event = %event.name(), "server change");
                self.spawn_reload("push event");
            }
        }
    }

    async fn check_last_updated(&self, watermark: &mut UpdateWatermark) {
        match self.session.backend().last_updated().await {
            Ok(ts) => {
                if watermark.observe(ts).should_reload() {
                    debug!(last_updated = %ts, "server data changed");
                    self.spawn_reload("last-updated advanced");
                }
            }
            Err(e) => debug!(error = %e, "last-updated check failed"),
        }
    }

    /// Reloads in the background so the event stream keeps draining.
    fn spawn_reload(&self, reason: &'static str) {
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            match session.reload().await {
                Ok(true) => debug!(reason, "reload finished"),
                Ok(false) => trace!(reason, "reload folded into running one"),
                Err(e) => warn!(reason, error = %e, "reload failed"),
            }
        });
    }

    fn poll_timer(&self) -> Interval {
        let mut interval = tokio::time::interval_at(Instant::now(), self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}

async fn next_event(stream: &mut Option<EventStream>) -> Option<Result<SyncEvent, ClientError>> {
    match stream {
        Some(events) => events.next().await,
        None => pending().await,
    }
}

async fn next_save(
    saves: &mut Option<broadcast::Receiver<SaveKind>>,
) -> Result<SaveKind, broadcast::error::RecvError> {
    match saves {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

/// Whole milliseconds for log fields, saturating.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn fire(timer: &mut Timer) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}
