//! Telemetry fusion state machine.
//!
//! Combines three named inputs into one [`SessionSnapshot`]:
//!
//! - position fixes (recorded only while tracking)
//! - elapsed-time ticks (accumulated only while tracking)
//! - heart-rate samples relayed by the companion (accepted only while tracking)
//!
//! Nothing is published until the [`CombineGate`] has seen a first value from
//! every required input. After that every input recomputes and republishes
//! the snapshot. Elapsed time and distance pass through a [`ChangeFilter`]
//! before they are relayed to the peer, so unchanged values never produce
//! traffic.
//!
//! Like the connector protocol, this module performs no I/O: the tracker in
//! `stridelink-tracker` feeds events in and executes the returned actions.

use std::time::Duration;

use run_types::{MessagingAction, Position, SessionSnapshot, TimedPosition};

use crate::distance::total_distance_meters;

/// Wait-for-first-value rule for the combining stage.
///
/// The gate opens once each required input has produced at least one value
/// and stays open until the session is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombineGate {
    require_heart_rate: bool,
    saw_position: bool,
    saw_elapsed: bool,
    saw_heart_rate: bool,
}

impl CombineGate {
    /// Create a closed gate.
    ///
    /// With `require_heart_rate == false` the gate ignores the heart-rate
    /// input, for companions without a heart-rate sensor.
    pub fn new(require_heart_rate: bool) -> Self {
        Self {
            require_heart_rate,
            saw_position: false,
            saw_elapsed: false,
            saw_heart_rate: false,
        }
    }

    /// Record that a position was accepted.
    pub fn saw_position(&mut self) {
        self.saw_position = true;
    }

    /// Record that elapsed time advanced.
    pub fn saw_elapsed(&mut self) {
        self.saw_elapsed = true;
    }

    /// Record that a heart-rate sample was accepted.
    pub fn saw_heart_rate(&mut self) {
        self.saw_heart_rate = true;
    }

    /// Whether every required input has produced a value.
    pub fn is_open(&self) -> bool {
        self.saw_position && self.saw_elapsed && (self.saw_heart_rate || !self.require_heart_rate)
    }

    /// Close the gate again, keeping the heart-rate requirement.
    pub fn reset(&mut self) {
        *self = Self::new(self.require_heart_rate);
    }
}

/// Distinct-until-changed filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter<T> {
    last: Option<T>,
}

impl<T: PartialEq + Clone> ChangeFilter<T> {
    /// Create a filter that treats `initial` as already seen.
    pub fn seeded(initial: T) -> Self {
        Self {
            last: Some(initial),
        }
    }

    /// Create a filter that lets the first value through.
    pub fn empty() -> Self {
        Self { last: None }
    }

    /// Offer a value. Returns true when it differs from the last one passed.
    pub fn offer(&mut self, value: &T) -> bool {
        if self.last.as_ref() == Some(value) {
            return false;
        }
        self.last = Some(value.clone());
        true
    }
}

/// Inputs to the fusion state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum FusionEvent {
    /// Tracking switched on or off.
    TrackingChanged(bool),
    /// A position fix from the position source.
    Position(Position),
    /// The ticker fired; carries the time since the previous tick.
    Tick(Duration),
    /// A heart-rate sample from the peer.
    HeartRate(u32),
    /// The session was finished; return to the initial state.
    Reset,
}

/// Instructions for the runtime, produced in order.
#[derive(Debug, Clone, PartialEq)]
pub enum FusionAction {
    /// Publish a new snapshot.
    Publish(SessionSnapshot),
    /// Relay an action to the peer (best effort).
    Relay(MessagingAction),
}

/// Fusion engine state. NO I/O.
#[derive(Debug, Clone)]
pub struct FusionState {
    is_tracking: bool,
    elapsed: Duration,
    snapshot: SessionSnapshot,
    gate: CombineGate,
    elapsed_filter: ChangeFilter<Duration>,
    distance_filter: ChangeFilter<u32>,
}

impl FusionState {
    /// Create an idle engine.
    pub fn new(require_heart_rate: bool) -> Self {
        Self {
            is_tracking: false,
            elapsed: Duration::ZERO,
            snapshot: SessionSnapshot::default(),
            gate: CombineGate::new(require_heart_rate),
            elapsed_filter: ChangeFilter::seeded(Duration::ZERO),
            distance_filter: ChangeFilter::seeded(0),
        }
    }

    /// Whether positions, ticks and heart rates are currently recorded.
    pub fn is_tracking(&self) -> bool {
        self.is_tracking
    }

    /// Accumulated tracking time.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Latest state of the session, published or not.
    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    /// Whether snapshots are being published.
    pub fn is_publishing(&self) -> bool {
        self.gate.is_open()
    }

    /// The session with distance and pace computed, whether or not the gate
    /// ever opened. Used to build the final record on finish.
    pub fn summary(&self) -> SessionSnapshot {
        let distance_meters = total_distance_meters(&self.snapshot.segments);
        SessionSnapshot {
            distance_meters,
            pace: pace(self.elapsed, distance_meters),
            ..self.snapshot.clone()
        }
    }

    /// Process an event and return the actions to execute.
    pub fn on_event(&mut self, event: FusionEvent) -> Vec<FusionAction> {
        match event {
            FusionEvent::TrackingChanged(tracking) => {
                if tracking == self.is_tracking {
                    return vec![];
                }
                self.is_tracking = tracking;
                if !tracking {
                    // The current segment is frozen as-is.
                    return vec![];
                }
                self.snapshot.segments.push(Vec::new());
                self.recompute()
            }

            FusionEvent::Position(position) => {
                if !self.is_tracking {
                    return vec![];
                }
                let sample = TimedPosition::new(position, self.elapsed);
                match self.snapshot.segments.last_mut() {
                    Some(segment) => segment.push(sample),
                    None => self.snapshot.segments.push(vec![sample]),
                }
                self.gate.saw_position();
                self.recompute()
            }

            FusionEvent::Tick(delta) => {
                if !self.is_tracking {
                    return vec![];
                }
                self.elapsed += delta;
                self.gate.saw_elapsed();

                let mut actions = Vec::new();
                if self.elapsed_filter.offer(&self.elapsed) {
                    actions.push(FusionAction::Relay(MessagingAction::TimeUpdate {
                        elapsed: self.elapsed,
                    }));
                }
                actions.extend(self.recompute());
                actions
            }

            FusionEvent::HeartRate(heart_rate) => {
                if !self.is_tracking {
                    return vec![];
                }
                self.snapshot.heart_rates.push(heart_rate);
                self.gate.saw_heart_rate();
                self.recompute()
            }

            FusionEvent::Reset => {
                self.is_tracking = false;
                self.elapsed = Duration::ZERO;
                self.snapshot = SessionSnapshot::default();
                self.gate.reset();

                let mut actions = vec![FusionAction::Publish(SessionSnapshot::default())];
                if self.elapsed_filter.offer(&Duration::ZERO) {
                    actions.push(FusionAction::Relay(MessagingAction::TimeUpdate {
                        elapsed: Duration::ZERO,
                    }));
                }
                if self.distance_filter.offer(&0) {
                    actions.push(FusionAction::Relay(MessagingAction::DistanceUpdate {
                        distance_meters: 0,
                    }));
                }
                actions
            }
        }
    }

    fn recompute(&mut self) -> Vec<FusionAction> {
        if !self.gate.is_open() {
            return vec![];
        }

        let distance_meters = total_distance_meters(&self.snapshot.segments);
        self.snapshot.distance_meters = distance_meters;
        self.snapshot.pace = pace(self.elapsed, distance_meters);

        let mut actions = vec![FusionAction::Publish(self.snapshot.clone())];
        if self.distance_filter.offer(&distance_meters) {
            actions.push(FusionAction::Relay(MessagingAction::DistanceUpdate {
                distance_meters,
            }));
        }
        actions
    }
}

impl Default for FusionState {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Average time per kilometer, rounded to whole seconds. Zero without distance.
pub fn pace(elapsed: Duration, distance_meters: u32) -> Duration {
    if distance_meters == 0 {
        return Duration::ZERO;
    }
    let km = distance_meters as f64 / 1000.0;
    Duration::from_secs((elapsed.as_secs() as f64 / km).round() as u64)
}
