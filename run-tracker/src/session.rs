//! Session controllers for both sides of the pair.
//!
//! [`PrimarySession`] drives the [`RunningTracker`] from the user's controls
//! and from the companion's intents. [`CompanionSession`] drives the
//! companion's exercise service and relays its heart rate. Both apply the
//! same origin rule: intents that came from the peer are never sent back.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::stream::BoxStream;
use futures::StreamExt;
use run_core::{max_speed_kmh, outbound, total_elevation_meters, Command, Origin};
use run_types::{ExerciseError, MessagingAction, Run, SessionSnapshot};
use tokio::sync::{broadcast, mpsc, watch};

use crate::connector::PeerLink;
use crate::task::AbortOnDrop;
use crate::sources::ExerciseTracker;
use crate::tracker::RunningTracker;

/// Capacity of the session event fan-out.
const EVENT_CAPACITY: usize = 16;

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

async fn forward(link: &dyn PeerLink, command: Command, origin: Origin) {
    if let Some(action) = outbound(command, origin) {
        if let Err(e) = link.send_action(action).await {
            tracing::warn!(?action, error = %e, "failed to forward intent to peer");
        }
    }
}

// ===========================================
// Primary
// ===========================================

/// A session as it was when the user finished it.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRun {
    /// Final snapshot, with distance and pace computed.
    pub snapshot: SessionSnapshot,
    /// Tracked (non-paused) time.
    pub elapsed: Duration,
    /// Unix seconds when tracking first started, if it ever did.
    pub started_at: Option<i64>,
}

impl FinishedRun {
    /// Build the persisted record. `None` when no position was recorded.
    pub fn to_run(&self) -> Option<Run> {
        let start = self.snapshot.first_position()?;
        let heart_rates = &self.snapshot.heart_rates;
        let avg_heart_rate = if heart_rates.is_empty() {
            None
        } else {
            let sum: u64 = heart_rates.iter().map(|&hr| hr as u64).sum();
            Some((sum as f64 / heart_rates.len() as f64).round() as u32)
        };

        Some(Run {
            id: None,
            duration: self.elapsed,
            started_at: self.started_at.unwrap_or_else(current_timestamp),
            distance_meters: self.snapshot.distance_meters,
            location: start.position,
            max_speed_kmh: max_speed_kmh(&self.snapshot.segments),
            total_elevation_meters: total_elevation_meters(&self.snapshot.segments),
            avg_heart_rate,
            max_heart_rate: heart_rates.iter().copied().max(),
            map_picture_url: None,
        })
    }
}

/// Events from the primary session.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryEvent {
    /// The session was finished, locally or by the peer.
    Finished(FinishedRun),
}

#[derive(Debug, Default)]
struct PrimaryFlags {
    started: bool,
    running: bool,
    started_at: Option<i64>,
}

struct PrimaryInner {
    tracker: RunningTracker,
    link: Arc<dyn PeerLink>,
    flags: Mutex<PrimaryFlags>,
    events: broadcast::Sender<PrimaryEvent>,
}

impl PrimaryInner {
    async fn apply(&self, command: Command, origin: Origin) -> Option<FinishedRun> {
        let finished = match command {
            Command::StartOrResume | Command::Pause => {
                let running = command == Command::StartOrResume;
                {
                    let mut flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
                    if origin == Origin::Peer && !flags.started {
                        tracing::debug!(?command, "ignoring peer intent, no session open");
                        return None;
                    }
                    flags.running = running;
                    if running && flags.started_at.is_none() {
                        flags.started_at = Some(current_timestamp());
                    }
                }
                self.tracker.set_is_tracking_run(running);
                None
            }
            Command::Finish => {
                let started_at = {
                    let mut flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
                    if origin == Origin::Peer && !flags.started {
                        tracing::debug!("ignoring peer finish, no session open");
                        return None;
                    }
                    std::mem::take(&mut *flags).started_at
                };
                let (snapshot, elapsed) = self.tracker.finish_with_elapsed().await;
                let run = FinishedRun {
                    snapshot,
                    elapsed,
                    started_at,
                };
                let _ = self.events.send(PrimaryEvent::Finished(run.clone()));
                Some(run)
            }
        };

        forward(self.link.as_ref(), command, origin).await;
        finished
    }
}

/// Primary-side session controller.
pub struct PrimarySession {
    inner: Arc<PrimaryInner>,
    _listener: AbortOnDrop,
}

impl PrimarySession {
    /// Wrap a running tracker and start listening for peer intents.
    pub fn spawn(tracker: RunningTracker, link: Arc<dyn PeerLink>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut inbound = link.subscribe();
        let inner = Arc::new(PrimaryInner {
            tracker,
            link,
            flags: Mutex::new(PrimaryFlags::default()),
            events,
        });

        let listener = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            loop {
                match inbound.recv().await {
                    Ok(action) => {
                        if let Some(command) = Command::from_action(&action) {
                            tracing::debug!(?command, "intent from peer");
                            listener.apply(command, Origin::Peer).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "peer actions dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            inner,
            _listener: AbortOnDrop(task),
        }
    }

    /// Open a session: observe position and become trackable.
    pub fn start_session(&self) {
        self.inner
            .flags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .started = true;
        self.inner.tracker.start_observing_position();
    }

    /// Leave the session without finishing it.
    pub fn stop_session(&self) {
        {
            let mut flags = self.inner.flags.lock().unwrap_or_else(|e| e.into_inner());
            flags.started = false;
            flags.running = false;
        }
        self.inner.tracker.set_is_tracking_run(false);
        self.inner.tracker.stop_observing_position();
    }

    /// Toggle between running and paused, mirroring the intent to the peer.
    pub async fn pause_resume(&self) {
        let running = self
            .inner
            .flags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .running;
        self.inner
            .apply(Command::toggle(running), Origin::Local)
            .await;
    }

    /// Finish the session locally and tell the peer.
    pub async fn finish(&self) -> FinishedRun {
        match self.inner.apply(Command::Finish, Origin::Local).await {
            Some(run) => run,
            None => FinishedRun {
                snapshot: SessionSnapshot::default(),
                elapsed: Duration::ZERO,
                started_at: None,
            },
        }
    }

    /// Whether the session is running (not paused).
    pub fn is_running(&self) -> bool {
        self.inner
            .flags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .running
    }

    /// The fusion engine behind this session.
    pub fn tracker(&self) -> &RunningTracker {
        &self.inner.tracker
    }

    /// Subscribe to session events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<PrimaryEvent> {
        self.inner.events.subscribe()
    }
}

// ===========================================
// Companion
// ===========================================

/// What the companion shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanionState {
    /// The user wants the run going.
    pub is_run_active: bool,
    /// The primary announced it is trackable.
    pub is_trackable: bool,
    /// The primary is connected and in range.
    pub is_peer_nearby: bool,
    /// An exercise was started in this session.
    pub has_started_running: bool,
    /// The exercise service can measure heart rate.
    pub can_track_heart_rate: bool,
    /// Last heart-rate sample.
    pub heart_rate: u32,
    /// Elapsed time reported by the primary.
    pub elapsed: Duration,
    /// Distance reported by the primary.
    pub distance_meters: u32,
}

impl CompanionState {
    /// Tracking happens only when all three conditions hold.
    pub fn is_tracking(&self) -> bool {
        self.is_run_active && self.is_trackable && self.is_peer_nearby
    }
}

/// Events from the companion session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionEvent {
    /// A user-visible notice.
    Error(&'static str),
    /// The run was finished.
    RunFinished,
}

enum CompanionCommand {
    Toggle,
    Finish,
}

/// Companion-side session controller.
pub struct CompanionSession {
    commands: mpsc::UnboundedSender<CompanionCommand>,
    state: watch::Receiver<CompanionState>,
    events: broadcast::Sender<CompanionEvent>,
    _task: AbortOnDrop,
}

impl CompanionSession {
    /// Start the controller.
    pub fn spawn(exercise: Arc<dyn ExerciseTracker>, link: Arc<dyn PeerLink>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(CompanionState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = CompanionActor {
            inbound: link.subscribe(),
            peer: link.connected_peer(),
            exercise,
            link,
            state: CompanionState::default(),
            published: state_tx,
            events: events.clone(),
            heart_rates: None,
        };
        let task = tokio::spawn(actor.run(rx));

        Self {
            commands,
            state,
            events,
            _task: AbortOnDrop(task),
        }
    }

    /// The user pressed start/pause.
    pub fn toggle_run(&self) {
        self.submit(CompanionCommand::Toggle);
    }

    /// The user pressed finish.
    pub fn finish(&self) {
        self.submit(CompanionCommand::Finish);
    }

    /// Watch the displayed state.
    pub fn state(&self) -> watch::Receiver<CompanionState> {
        self.state.clone()
    }

    /// Subscribe to notices and finish events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CompanionEvent> {
        self.events.subscribe()
    }

    fn submit(&self, command: CompanionCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("companion session is no longer running");
        }
    }
}

struct CompanionActor {
    exercise: Arc<dyn ExerciseTracker>,
    link: Arc<dyn PeerLink>,
    inbound: broadcast::Receiver<MessagingAction>,
    peer: watch::Receiver<Option<run_types::DeviceNode>>,
    state: CompanionState,
    published: watch::Sender<CompanionState>,
    events: broadcast::Sender<CompanionEvent>,
    heart_rates: Option<BoxStream<'static, u32>>,
}

impl CompanionActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<CompanionCommand>) {
        self.state.can_track_heart_rate = self.exercise.is_heart_rate_supported().await;
        if self.state.can_track_heart_rate {
            if let Err(e) = self.exercise.prepare().await {
                self.report(e);
            }
        }
        self.state.is_peer_nearby = self.peer_nearby();
        let mut peer_open = true;
        self.publish();
        self.on_peer_or_tracking_changed().await;

        loop {
            let was_tracking = self.state.is_tracking();
            let mut peer_changed = false;

            tokio::select! {
                command = commands.recv() => match command {
                    Some(CompanionCommand::Toggle) => {
                        let command = Command::toggle(self.state.is_run_active);
                        self.apply(command, Origin::Local).await;
                    }
                    Some(CompanionCommand::Finish) => {
                        self.apply(Command::Finish, Origin::Local).await;
                    }
                    None => break,
                },
                inbound = self.inbound.recv() => match inbound {
                    Ok(action) => self.on_peer_action(action).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "peer actions dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = self.peer.changed(), if peer_open => {
                    if changed.is_err() {
                        peer_open = false;
                    }
                    self.state.is_peer_nearby = self.peer_nearby();
                    peer_changed = true;
                },
                heart_rate = next_heart_rate(&mut self.heart_rates) => match heart_rate {
                    Some(heart_rate) => {
                        self.state.heart_rate = heart_rate;
                        let relay = MessagingAction::HeartRateUpdate { heart_rate };
                        if let Err(e) = self.link.send_action(relay).await {
                            tracing::debug!(error = %e, "heart-rate relay failed");
                        }
                    }
                    None => self.heart_rates = None,
                },
            }

            if self.state.is_tracking() != was_tracking {
                self.on_tracking_changed().await;
                self.on_peer_or_tracking_changed().await;
            } else if peer_changed {
                self.on_peer_or_tracking_changed().await;
            }
            self.publish();
        }
    }

    async fn apply(&mut self, command: Command, origin: Origin) {
        match command {
            Command::StartOrResume | Command::Pause => {
                if self.state.is_trackable {
                    self.state.is_run_active = command == Command::StartOrResume;
                }
            }
            Command::Finish => {
                if let Err(e) = self.exercise.stop().await {
                    self.report(e);
                }
                let _ = self.events.send(CompanionEvent::RunFinished);
                self.state = CompanionState {
                    is_trackable: self.state.is_trackable,
                    is_peer_nearby: self.state.is_peer_nearby,
                    can_track_heart_rate: self.state.can_track_heart_rate,
                    ..CompanionState::default()
                };
                tracing::info!(?origin, "run finished");
            }
        }
        forward(self.link.as_ref(), command, origin).await;
    }

    async fn on_peer_action(&mut self, action: MessagingAction) {
        if let Some(command) = Command::from_action(&action) {
            self.apply(command, Origin::Peer).await;
            return;
        }
        match action {
            MessagingAction::Trackable => self.state.is_trackable = true,
            MessagingAction::Untrackable => self.state.is_trackable = false,
            MessagingAction::TimeUpdate { elapsed } => self.state.elapsed = elapsed,
            MessagingAction::DistanceUpdate { distance_meters } => {
                self.state.distance_meters = distance_meters
            }
            _ => {}
        }
    }

    /// Drive the exercise service through a tracking transition.
    async fn on_tracking_changed(&mut self) {
        let tracking = self.state.is_tracking();
        let result = match (tracking, self.state.has_started_running) {
            (true, false) => self.exercise.start().await,
            (true, true) => self.exercise.resume().await,
            (false, true) => self.exercise.pause().await,
            (false, false) => Ok(()),
        };
        if let Err(e) = result {
            self.report(e);
        }

        if tracking {
            self.state.has_started_running = true;
            self.heart_rates = Some(self.exercise.heart_rate());
        } else {
            self.heart_rates = None;
        }
        tracing::debug!(tracking, "companion tracking changed");
    }

    /// Ask the primary for its trackable state while we are not tracking.
    async fn on_peer_or_tracking_changed(&mut self) {
        if self.state.is_tracking() || self.peer.borrow().is_none() {
            return;
        }
        if let Err(e) = self
            .link
            .send_action(MessagingAction::ConnectionRequest)
            .await
        {
            tracing::debug!(error = %e, "connection request failed");
        }
    }

    fn peer_nearby(&self) -> bool {
        self.peer.borrow().as_ref().is_some_and(|node| node.is_nearby)
    }

    fn report(&self, error: ExerciseError) {
        tracing::warn!(error = %error, "exercise error");
        if let Some(message) = error.user_message() {
            let _ = self.events.send(CompanionEvent::Error(message));
        }
    }

    fn publish(&self) {
        self.published.send_if_modified(|shown| {
            if *shown == self.state {
                return false;
            }
            *shown = self.state.clone();
            true
        });
    }
}

async fn next_heart_rate(stream: &mut Option<BoxStream<'static, u32>>) -> Option<u32> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ExerciseTracker;
    use crate::tracker::tests::{eventually, FakeLink, FakePositions, FakeTicker};
    use crate::tracker::FusionConfig;
    use async_trait::async_trait;
    use futures::channel::mpsc::{unbounded, UnboundedSender};
    use run_types::{DeviceNode, NodeId, Position, TimedPosition};

    // ===========================================
    // Primary
    // ===========================================

    struct Primary {
        session: PrimarySession,
        link: Arc<FakeLink>,
        positions: UnboundedSender<Position>,
        ticks: UnboundedSender<Duration>,
    }

    fn primary() -> Primary {
        let (source, positions) = FakePositions::new();
        let (ticker, ticks) = FakeTicker::new();
        let link = FakeLink::new();
        let config = FusionConfig {
            require_heart_rate: false,
            ..FusionConfig::default()
        };
        let tracker = RunningTracker::spawn(config, source, ticker, link.clone());
        let session = PrimarySession::spawn(tracker, link.clone());
        Primary {
            session,
            link,
            positions,
            ticks,
        }
    }

    #[tokio::test]
    async fn local_toggle_is_forwarded() {
        let p = primary();
        p.session.start_session();
        p.session.pause_resume().await;

        assert!(p.session.is_running());
        assert!(p.link.sent().contains(&MessagingAction::StartOrResume));
        eventually(|| p.session.tracker().is_tracking()).await;

        p.session.pause_resume().await;
        assert!(!p.session.is_running());
        assert!(p.link.sent().contains(&MessagingAction::Pause));
    }

    #[tokio::test]
    async fn peer_pause_is_not_echoed() {
        let p = primary();
        p.session.start_session();
        p.session.pause_resume().await;
        eventually(|| p.session.tracker().is_tracking()).await;

        p.link.deliver(MessagingAction::Pause).await;

        eventually(|| !p.session.is_running()).await;
        eventually(|| !p.session.tracker().is_tracking()).await;
        assert!(!p.link.sent().contains(&MessagingAction::Pause));
    }

    #[tokio::test]
    async fn peer_intent_ignored_without_open_session() {
        let p = primary();
        p.link.deliver(MessagingAction::StartOrResume).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!p.session.is_running());
        assert!(!p.session.tracker().is_tracking());
    }

    #[tokio::test]
    async fn local_finish_returns_the_run() {
        let p = primary();
        let mut snapshots = p.session.tracker().snapshot();
        p.session.start_session();
        p.session.pause_resume().await;
        p.ticks.unbounded_send(Duration::from_secs(10)).unwrap();
        p.positions
            .unbounded_send(Position::new(0.0, 0.0, 0.0))
            .unwrap();
        p.positions
            .unbounded_send(Position::new(0.0, 0.001, 0.0))
            .unwrap();
        tokio::time::timeout(
            Duration::from_secs(1),
            snapshots.wait_for(|s| s.sample_count() == 2),
        )
        .await
        .unwrap()
        .unwrap();

        let finished = p.session.finish().await;

        assert_eq!(finished.elapsed, Duration::from_secs(10));
        assert_eq!(finished.snapshot.distance_meters, 111);
        assert!(finished.started_at.is_some());
        assert!(p.link.sent().contains(&MessagingAction::Finish));
        assert!(!p.session.is_running());

        let run = finished.to_run().unwrap();
        assert_eq!(run.distance_meters, 111);
        assert_eq!(run.duration, Duration::from_secs(10));
        assert_eq!(run.location, Position::new(0.0, 0.0, 0.0));
    }

    #[tokio::test]
    async fn peer_finish_emits_event_without_echo() {
        let p = primary();
        let mut events = p.session.subscribe_events();
        p.session.start_session();

        p.link.deliver(MessagingAction::Finish).await;

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, PrimaryEvent::Finished(_)));
        assert!(!p.link.sent().contains(&MessagingAction::Finish));
    }

    #[tokio::test]
    async fn peer_finish_ignored_without_open_session() {
        let p = primary();
        let mut events = p.session.subscribe_events();

        p.link.deliver(MessagingAction::Finish).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert!(!p.link.sent().contains(&MessagingAction::Finish));
    }

    #[test]
    fn finished_run_statistics() {
        let at = |lon: f64, alt: f64, secs: u64| {
            TimedPosition::new(Position::new(0.0, lon, alt), Duration::from_secs(secs))
        };
        let finished = FinishedRun {
            snapshot: SessionSnapshot {
                distance_meters: 222,
                pace: Duration::from_secs(270),
                segments: vec![vec![at(0.0, 10.0, 0), at(0.001, 14.0, 10), at(0.002, 12.0, 40)]],
                heart_rates: vec![150, 160, 171],
            },
            elapsed: Duration::from_secs(60),
            started_at: Some(1_700_000_000),
        };

        let run = finished.to_run().unwrap();
        assert_eq!(run.started_at, 1_700_000_000);
        assert_eq!(run.avg_heart_rate, Some(160));
        assert_eq!(run.max_heart_rate, Some(171));
        assert_eq!(run.total_elevation_meters, 4);
        assert!(run.max_speed_kmh > 39.0 && run.max_speed_kmh < 41.0);
    }

    #[test]
    fn finished_run_without_positions_has_no_record() {
        let finished = FinishedRun {
            snapshot: SessionSnapshot::default(),
            elapsed: Duration::ZERO,
            started_at: None,
        };
        assert!(finished.to_run().is_none());
    }

    // ===========================================
    // Companion
    // ===========================================

    #[derive(Default)]
    struct FakeExercise {
        calls: Mutex<Vec<&'static str>>,
        start_error: Mutex<Option<ExerciseError>>,
        heart_rate_feeds: Mutex<Vec<UnboundedSender<u32>>>,
    }

    impl FakeExercise {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn subscribers(&self) -> usize {
            self.heart_rate_feeds
                .lock()
                .unwrap()
                .iter()
                .filter(|tx| !tx.is_closed())
                .count()
        }

        fn emit(&self, heart_rate: u32) {
            self.heart_rate_feeds
                .lock()
                .unwrap()
                .retain(|tx| tx.unbounded_send(heart_rate).is_ok());
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ExerciseTracker for FakeExercise {
        async fn is_heart_rate_supported(&self) -> bool {
            true
        }

        async fn prepare(&self) -> Result<(), ExerciseError> {
            self.record("prepare");
            Ok(())
        }

        async fn start(&self) -> Result<(), ExerciseError> {
            self.record("start");
            match self.start_error.lock().unwrap().take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        async fn resume(&self) -> Result<(), ExerciseError> {
            self.record("resume");
            Ok(())
        }

        async fn pause(&self) -> Result<(), ExerciseError> {
            self.record("pause");
            Ok(())
        }

        async fn stop(&self) -> Result<(), ExerciseError> {
            self.record("stop");
            Ok(())
        }

        fn heart_rate(&self) -> BoxStream<'static, u32> {
            let (tx, rx) = unbounded();
            self.heart_rate_feeds.lock().unwrap().push(tx);
            rx.boxed()
        }
    }

    struct Companion {
        session: CompanionSession,
        link: Arc<FakeLink>,
        exercise: Arc<FakeExercise>,
        state: watch::Receiver<CompanionState>,
    }

    fn companion_with(exercise: FakeExercise) -> Companion {
        let link = FakeLink::new();
        link.peer
            .send_replace(Some(DeviceNode::new(NodeId::new("phone"), "Phone", true)));
        let exercise = Arc::new(exercise);
        let session = CompanionSession::spawn(exercise.clone(), link.clone());
        let state = session.state();
        Companion {
            session,
            link,
            exercise,
            state,
        }
    }

    async fn wait_state<F>(rx: &mut watch::Receiver<CompanionState>, f: F) -> CompanionState
    where
        F: FnMut(&CompanionState) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(f))
            .await
            .unwrap()
            .unwrap()
            .clone()
    }

    async fn tracking_companion(exercise: FakeExercise) -> Companion {
        let mut c = companion_with(exercise);
        c.link.deliver(MessagingAction::Trackable).await;
        wait_state(&mut c.state, |s| s.is_trackable).await;
        c.session.toggle_run();
        wait_state(&mut c.state, |s| s.is_tracking()).await;
        c
    }

    #[test]
    fn companion_actor_can_run_on_a_worker_thread() {
        fn assert_send<T: Send>(_: &T) {}

        let link = FakeLink::new();
        let (_commands, rx) = mpsc::unbounded_channel();
        let (published, _) = watch::channel(CompanionState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let actor = CompanionActor {
            inbound: link.subscribe(),
            peer: link.connected_peer(),
            exercise: Arc::new(FakeExercise::default()),
            link,
            state: CompanionState::default(),
            published,
            events,
            heart_rates: Some(futures::stream::empty::<u32>().boxed()),
        };

        let run = actor.run(rx);
        assert_send(&run);
    }

    #[tokio::test]
    async fn asks_for_trackability_while_not_tracking() {
        let c = companion_with(FakeExercise::default());
        eventually(|| c.link.sent().contains(&MessagingAction::ConnectionRequest)).await;
    }

    #[tokio::test]
    async fn tracking_needs_trackable_peer_and_active_run() {
        let c = tracking_companion(FakeExercise::default()).await;

        eventually(|| c.exercise.calls().contains(&"start")).await;
        assert_eq!(c.exercise.calls(), vec!["prepare", "start"]);
        assert!(c.link.sent().contains(&MessagingAction::StartOrResume));
        assert!(c.state.borrow().has_started_running);
    }

    #[tokio::test]
    async fn peer_pause_then_resume() {
        let mut c = tracking_companion(FakeExercise::default()).await;

        c.link.deliver(MessagingAction::Pause).await;
        wait_state(&mut c.state, |s| !s.is_tracking()).await;
        eventually(|| c.exercise.calls().last() == Some(&"pause")).await;
        assert!(!c.link.sent().contains(&MessagingAction::Pause));

        c.link.deliver(MessagingAction::StartOrResume).await;
        wait_state(&mut c.state, |s| s.is_tracking()).await;
        eventually(|| c.exercise.calls().last() == Some(&"resume")).await;
    }

    #[tokio::test]
    async fn peer_intents_ignored_while_untrackable() {
        let mut c = companion_with(FakeExercise::default());

        c.link.deliver(MessagingAction::StartOrResume).await;
        c.link
            .deliver(MessagingAction::TimeUpdate {
                elapsed: Duration::from_secs(5),
            })
            .await;

        let state = wait_state(&mut c.state, |s| s.elapsed == Duration::from_secs(5)).await;
        assert!(!state.is_run_active);
        assert!(!c.exercise.calls().contains(&"start"));
    }

    #[tokio::test]
    async fn heart_rate_relayed_while_tracking() {
        let mut c = tracking_companion(FakeExercise::default()).await;
        eventually(|| c.exercise.subscribers() > 0).await;

        c.exercise.emit(152);

        eventually(|| {
            c.link
                .sent()
                .contains(&MessagingAction::HeartRateUpdate { heart_rate: 152 })
        })
        .await;
        wait_state(&mut c.state, |s| s.heart_rate == 152).await;
    }

    #[tokio::test]
    async fn displays_primary_telemetry() {
        let mut c = companion_with(FakeExercise::default());
        c.link
            .deliver(MessagingAction::TimeUpdate {
                elapsed: Duration::from_secs(61),
            })
            .await;
        c.link
            .deliver(MessagingAction::DistanceUpdate {
                distance_meters: 240,
            })
            .await;

        let state = wait_state(&mut c.state, |s| s.distance_meters == 240).await;
        assert_eq!(state.elapsed, Duration::from_secs(61));
    }

    #[tokio::test]
    async fn exercise_errors_become_notices() {
        let exercise = FakeExercise::default();
        *exercise.start_error.lock().unwrap() = Some(ExerciseError::OngoingOtherExercise);
        let c = companion_with(exercise);
        let mut events = c.session.subscribe_events();

        c.link.deliver(MessagingAction::Trackable).await;
        c.link.deliver(MessagingAction::StartOrResume).await;

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            CompanionEvent::Error(ExerciseError::OngoingOtherExercise.user_message().unwrap())
        );
    }

    #[tokio::test]
    async fn unsupported_tracking_is_silent() {
        let exercise = FakeExercise::default();
        *exercise.start_error.lock().unwrap() = Some(ExerciseError::TrackingNotSupported);
        let mut c = companion_with(exercise);
        let mut events = c.session.subscribe_events();

        c.link.deliver(MessagingAction::Trackable).await;
        wait_state(&mut c.state, |s| s.is_trackable).await;
        c.session.toggle_run();
        wait_state(&mut c.state, |s| s.is_tracking()).await;
        assert!(c.exercise.calls().contains(&"start"));
        c.session.finish();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, CompanionEvent::RunFinished);
    }

    #[tokio::test]
    async fn peer_finish_stops_exercise_without_echo() {
        let mut c = tracking_companion(FakeExercise::default()).await;
        let mut events = c.session.subscribe_events();

        c.link.deliver(MessagingAction::Finish).await;

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, CompanionEvent::RunFinished);
        let state = wait_state(&mut c.state, |s| !s.has_started_running).await;
        assert!(!state.is_run_active);
        assert!(c.exercise.calls().contains(&"stop"));
        assert!(!c.link.sent().contains(&MessagingAction::Finish));
    }

    #[tokio::test]
    async fn local_finish_is_forwarded() {
        let c = tracking_companion(FakeExercise::default()).await;
        c.session.finish();
        eventually(|| c.link.sent().contains(&MessagingAction::Finish)).await;
    }
}
