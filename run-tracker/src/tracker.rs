//! Running tracker - the primary's telemetry fusion engine.
//!
//! One actor task owns the pure [`FusionState`]. Position, tick and
//! heart-rate subscriptions run as their own tasks and feed the actor's
//! channel; they are aborted as soon as the input is switched off, so a
//! finished session leaves nothing running. Snapshots are published through
//! a `watch` channel (single writer) and relays to the peer go through an
//! ordered relay task so a slow link never blocks the actor.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use run_core::{FusionAction, FusionEvent, FusionState};
use run_types::{MessagingAction, SessionSnapshot};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::connector::PeerLink;
use crate::task::AbortOnDrop;
use crate::sources::{PositionSource, Ticker};

/// Default interval requested from the position source.
pub const DEFAULT_POSITION_INTERVAL: Duration = Duration::from_secs(1);

/// Fusion engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionConfig {
    /// Interval requested from the position source.
    pub position_interval: Duration,
    /// Wait for a first heart-rate sample before publishing snapshots.
    ///
    /// Turn off when the companion has no heart-rate sensor.
    pub require_heart_rate: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            position_interval: DEFAULT_POSITION_INTERVAL,
            require_heart_rate: true,
        }
    }
}

enum Command {
    ObservePosition(bool),
    Input(FusionEvent),
    Finish(oneshot::Sender<(SessionSnapshot, Duration)>),
}

/// Handle to the running tracker actor.
pub struct RunningTracker {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    elapsed: watch::Receiver<Duration>,
    tracking: watch::Receiver<bool>,
    _task: AbortOnDrop,
}

impl RunningTracker {
    /// Start the tracker.
    pub fn spawn(
        config: FusionConfig,
        positions: Arc<dyn PositionSource>,
        ticker: Arc<dyn Ticker>,
        link: Arc<dyn PeerLink>,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(SessionSnapshot::default());
        let (elapsed_tx, elapsed) = watch::channel(Duration::ZERO);
        let (tracking_tx, tracking) = watch::channel(false);
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();

        let relay = AbortOnDrop(tokio::spawn(relay_loop(Arc::clone(&link), relay_rx)));
        let actor = TrackerActor {
            config,
            state: FusionState::new(config.require_heart_rate),
            positions,
            ticker,
            link,
            commands: commands.clone(),
            snapshot: snapshot_tx,
            elapsed: elapsed_tx,
            tracking: tracking_tx,
            relay: relay_tx,
            _relay_task: relay,
            position_task: None,
            tick_task: None,
            heart_rate_task: None,
        };
        let task = tokio::spawn(actor.run(rx));

        Self {
            commands,
            snapshot,
            elapsed,
            tracking,
            _task: AbortOnDrop(task),
        }
    }

    /// Subscribe to position fixes and mark this device trackable.
    pub fn start_observing_position(&self) {
        self.submit(Command::ObservePosition(true));
    }

    /// Drop the position subscription and mark this device untrackable.
    pub fn stop_observing_position(&self) {
        self.submit(Command::ObservePosition(false));
    }

    /// Switch tracking on or off. Switching on opens a new segment.
    pub fn set_is_tracking_run(&self, tracking: bool) {
        self.submit(Command::Input(FusionEvent::TrackingChanged(tracking)));
    }

    /// Stop everything, reset the session and return its final state.
    pub async fn finish_run(&self) -> SessionSnapshot {
        self.finish_with_elapsed().await.0
    }

    /// Like [`finish_run`](Self::finish_run), also returning the tracked time.
    pub async fn finish_with_elapsed(&self) -> (SessionSnapshot, Duration) {
        let (reply, result) = oneshot::channel();
        self.submit(Command::Finish(reply));
        result.await.unwrap_or_default()
    }

    /// Watch published snapshots.
    pub fn snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Watch accumulated tracking time.
    pub fn elapsed(&self) -> watch::Receiver<Duration> {
        self.elapsed.clone()
    }

    /// Watch whether the session is tracking.
    pub fn tracking(&self) -> watch::Receiver<bool> {
        self.tracking.clone()
    }

    /// Whether the session is tracking right now.
    pub fn is_tracking(&self) -> bool {
        *self.tracking.borrow()
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("running tracker is no longer running");
        }
    }
}

struct TrackerActor {
    config: FusionConfig,
    state: FusionState,
    positions: Arc<dyn PositionSource>,
    ticker: Arc<dyn Ticker>,
    link: Arc<dyn PeerLink>,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Sender<SessionSnapshot>,
    elapsed: watch::Sender<Duration>,
    tracking: watch::Sender<bool>,
    relay: mpsc::UnboundedSender<MessagingAction>,
    _relay_task: AbortOnDrop,
    position_task: Option<AbortOnDrop>,
    tick_task: Option<AbortOnDrop>,
    heart_rate_task: Option<AbortOnDrop>,
}

impl TrackerActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::ObservePosition(observe) => self.observe_position(observe).await,
                Command::Input(event) => self.apply(event),
                Command::Finish(reply) => {
                    let last = self.finish().await;
                    let _ = reply.send(last);
                }
            }
        }
    }

    async fn observe_position(&mut self, observe: bool) {
        if observe == self.position_task.is_some() {
            return;
        }
        if observe {
            let stream = self.positions.observe(self.config.position_interval);
            self.position_task = Some(self.forward(stream.map(FusionEvent::Position)));
            tracing::debug!("observing position");
        } else {
            self.position_task = None;
            tracing::debug!("stopped observing position");
        }
        self.link.set_trackable(observe).await;
    }

    fn apply(&mut self, event: FusionEvent) {
        if let FusionEvent::TrackingChanged(tracking) = event {
            self.set_tracking_inputs(tracking);
        }

        let actions = self.state.on_event(event);
        self.elapsed.send_if_modified(|elapsed| {
            let changed = *elapsed != self.state.elapsed();
            *elapsed = self.state.elapsed();
            changed
        });
        self.execute(actions);
    }

    fn set_tracking_inputs(&mut self, tracking: bool) {
        if tracking == self.tick_task.is_some() {
            return;
        }
        if tracking {
            self.tick_task = Some(self.forward(self.ticker.ticks().map(FusionEvent::Tick)));
            let heart_rates = heart_rate_updates(self.link.subscribe());
            self.heart_rate_task = Some(self.forward(heart_rates.map(FusionEvent::HeartRate)));
            tracing::info!("session tracking");
        } else {
            self.tick_task = None;
            self.heart_rate_task = None;
            tracing::info!("session paused");
        }
        self.tracking.send_replace(tracking);
    }

    async fn finish(&mut self) -> (SessionSnapshot, Duration) {
        self.observe_position(false).await;
        self.set_tracking_inputs(false);

        let last = self.state.summary();
        let elapsed = self.state.elapsed();
        self.apply(FusionEvent::Reset);
        tracing::info!(
            distance_meters = last.distance_meters,
            samples = last.sample_count(),
            "session finished"
        );
        (last, elapsed)
    }

    fn execute(&mut self, actions: Vec<FusionAction>) {
        for action in actions {
            match action {
                FusionAction::Publish(snapshot) => {
                    self.snapshot.send_replace(snapshot);
                }
                FusionAction::Relay(message) => {
                    let _ = self.relay.send(message);
                }
            }
        }
    }

    fn forward<S>(&self, mut events: S) -> AbortOnDrop
    where
        S: futures::Stream<Item = FusionEvent> + Send + Unpin + 'static,
    {
        let commands = self.commands.clone();
        AbortOnDrop(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if commands.send(Command::Input(event)).is_err() {
                    break;
                }
            }
        }))
    }
}

/// Heart-rate values from the peer's action stream.
fn heart_rate_updates(
    inbound: broadcast::Receiver<MessagingAction>,
) -> futures::stream::BoxStream<'static, u32> {
    futures::stream::unfold(inbound, |mut inbound| async move {
        loop {
            match inbound.recv().await {
                Ok(MessagingAction::HeartRateUpdate { heart_rate }) => {
                    return Some((heart_rate, inbound))
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "heart-rate updates dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

async fn relay_loop(link: Arc<dyn PeerLink>, mut rx: mpsc::UnboundedReceiver<MessagingAction>) {
    while let Some(action) = rx.recv().await {
        if let Err(e) = link.send_action(action).await {
            tracing::debug!(?action, error = %e, "relay to peer failed");
        }
    }
}
