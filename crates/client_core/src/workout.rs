//! Guided workout session: set progression, status polling and rest countdown.
//!
//! Phase changes are the only cancellation signal. Every background task is
//! tied to the set epoch it was spawned for and its handle is aborted when the
//! session leaves the phase that owns it.

use std::{fmt, sync::Arc, time::Duration};

use shared::{
    domain::{ExerciseKind, DEFAULT_TARGET_REPS},
    protocol::WorkoutStatus,
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{config::DEFAULT_POLL_INTERVAL_MS, WorkoutBackend};

pub const MAX_TARGET_REPS: u32 = 50;
pub const MAX_TARGET_SETS: u32 = 5;
pub const MIN_REST_SECONDS: u32 = 15;
pub const MAX_REST_SECONDS: u32 = 120;
pub const REST_STEP_SECONDS: u32 = 15;
pub const DEFAULT_TARGET_SETS: u32 = 3;
pub const DEFAULT_REST_SECONDS: u32 = 30;

pub const NO_EXERCISE_MESSAGE: &str =
    "No exercise selected. Choose an exercise before starting a set.";
pub const START_FAILED_MESSAGE: &str =
    "Failed to start workout. Please make sure the backend is running.";
pub const RESET_FAILED_MESSAGE: &str = "Failed to reset workout. Please try again.";

const REST_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Active,
    Resting,
    SetComplete,
    AllComplete,
}

impl Phase {
    pub fn allows_config_changes(self) -> bool {
        matches!(self, Phase::Idle | Phase::SetComplete)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Idle => "idle",
            Phase::Active => "active",
            Phase::Resting => "resting",
            Phase::SetComplete => "set complete",
            Phase::AllComplete => "all complete",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkoutError {
    #[error("no exercise is bound to this session")]
    NoExercise,
    #[error("target reps must be between 1 and 50, got {0}")]
    InvalidReps(u32),
    #[error("target sets must be between 1 and 5, got {0}")]
    InvalidSets(u32),
    #[error("rest must be 15-120 seconds in steps of 15, got {0}")]
    InvalidRest(u32),
    #[error("target sets {target_sets} is below the current set {current_set}")]
    SetsBelowProgress { target_sets: u32, current_set: u32 },
    #[error("cannot {operation} while {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },
    #[error("a set is already being started")]
    StartPending,
    #[error("workout session is closed")]
    Closed,
    #[error("{0}")]
    Remote(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkoutConfig {
    pub target_reps: u32,
    pub target_sets: u32,
    pub rest_seconds: u32,
}

impl Default for WorkoutConfig {
    fn default() -> Self {
        Self {
            target_reps: DEFAULT_TARGET_REPS,
            target_sets: DEFAULT_TARGET_SETS,
            rest_seconds: DEFAULT_REST_SECONDS,
        }
    }
}

impl WorkoutConfig {
    pub fn new(
        target_reps: u32,
        target_sets: u32,
        rest_seconds: u32,
    ) -> Result<Self, WorkoutError> {
        if !(1..=MAX_TARGET_REPS).contains(&target_reps) {
            return Err(WorkoutError::InvalidReps(target_reps));
        }
        if !(1..=MAX_TARGET_SETS).contains(&target_sets) {
            return Err(WorkoutError::InvalidSets(target_sets));
        }
        if !(MIN_REST_SECONDS..=MAX_REST_SECONDS).contains(&rest_seconds)
            || rest_seconds % REST_STEP_SECONDS != 0
        {
            return Err(WorkoutError::InvalidRest(rest_seconds));
        }
        Ok(Self {
            target_reps,
            target_sets,
            rest_seconds,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkoutSnapshot {
    pub exercise: Option<ExerciseKind>,
    pub config: WorkoutConfig,
    pub current_set: u32,
    pub phase: Phase,
    pub reps_completed: u32,
    pub status: Option<WorkoutStatus>,
    pub rest_remaining: Option<u32>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkoutEvent {
    PhaseChanged { phase: Phase, current_set: u32 },
    RepsUpdated { reps_completed: u32, target_reps: u32 },
    RestTick { remaining: u32 },
    ConfigUpdated(WorkoutConfig),
    Error(String),
}

struct WorkoutState {
    exercise: Option<ExerciseKind>,
    config: WorkoutConfig,
    current_set: u32,
    phase: Phase,
    reps_completed: u32,
    status: Option<WorkoutStatus>,
    rest_remaining: Option<u32>,
    last_error: Option<String>,
    epoch: u64,
    start_pending: bool,
    closed: bool,
    poll_task: Option<JoinHandle<()>>,
    rest_task: Option<JoinHandle<()>>,
}

impl WorkoutState {
    fn cancel_tasks(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        if let Some(task) = self.rest_task.take() {
            task.abort();
        }
    }

    fn clear_set_progress(&mut self) {
        self.reps_completed = 0;
        self.status = None;
        self.rest_remaining = None;
    }
}

pub struct WorkoutSession {
    backend: Arc<dyn WorkoutBackend>,
    poll_interval: Duration,
    inner: Mutex<WorkoutState>,
    events: broadcast::Sender<WorkoutEvent>,
}

impl WorkoutSession {
    pub fn new(backend: Arc<dyn WorkoutBackend>, exercise: Option<ExerciseKind>) -> Arc<Self> {
        Self::new_with_poll_interval(
            backend,
            exercise,
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        )
    }

    pub fn new_with_poll_interval(
        backend: Arc<dyn WorkoutBackend>,
        exercise: Option<ExerciseKind>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            backend,
            poll_interval,
            inner: Mutex::new(WorkoutState {
                exercise,
                config: WorkoutConfig::default(),
                current_set: 1,
                phase: Phase::Idle,
                reps_completed: 0,
                status: None,
                rest_remaining: None,
                last_error: None,
                epoch: 0,
                start_pending: false,
                closed: false,
                poll_task: None,
                rest_task: None,
            }),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkoutEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> WorkoutSnapshot {
        let guard = self.inner.lock().await;
        WorkoutSnapshot {
            exercise: guard.exercise,
            config: guard.config,
            current_set: guard.current_set,
            phase: guard.phase,
            reps_completed: guard.reps_completed,
            status: guard.status.clone(),
            rest_remaining: guard.rest_remaining,
            last_error: guard.last_error.clone(),
        }
    }

    fn emit(&self, event: WorkoutEvent) {
        let _ = self.events.send(event);
    }

    fn emit_phase(&self, state: &WorkoutState) {
        self.emit(WorkoutEvent::PhaseChanged {
            phase: state.phase,
            current_set: state.current_set,
        });
    }

    fn record_error(&self, state: &mut WorkoutState, message: &str) {
        state.last_error = Some(message.to_string());
        self.emit(WorkoutEvent::Error(message.to_string()));
    }

    /// Binds the exercise whose reps the backend should count. Target reps
    /// go back to the suggested default.
    pub async fn bind_exercise(&self, exercise: ExerciseKind) -> Result<(), WorkoutError> {
        let mut guard = self.inner.lock().await;
        if guard.phase != Phase::Idle {
            return Err(WorkoutError::InvalidPhase {
                operation: "change exercise",
                phase: guard.phase,
            });
        }
        guard.exercise = Some(exercise);
        guard.config.target_reps = DEFAULT_TARGET_REPS;
        self.emit(WorkoutEvent::ConfigUpdated(guard.config));
        Ok(())
    }

    /// Applies new targets atomically. Only allowed between sets.
    pub async fn update_config(
        &self,
        target_reps: u32,
        target_sets: u32,
        rest_seconds: u32,
    ) -> Result<WorkoutConfig, WorkoutError> {
        let config = WorkoutConfig::new(target_reps, target_sets, rest_seconds)?;
        let mut guard = self.inner.lock().await;
        if !guard.phase.allows_config_changes() || guard.start_pending {
            return Err(WorkoutError::InvalidPhase {
                operation: "change settings",
                phase: guard.phase,
            });
        }
        if guard.current_set > config.target_sets {
            return Err(WorkoutError::SetsBelowProgress {
                target_sets: config.target_sets,
                current_set: guard.current_set,
            });
        }
        guard.config = config;
        info!(target_reps, target_sets, rest_seconds, "workout settings updated");
        self.emit(WorkoutEvent::ConfigUpdated(config));
        Ok(config)
    }

    pub async fn clear_error(&self) {
        self.inner.lock().await.last_error = None;
    }

    /// Starts the current set on the backend and begins status polling.
    pub async fn start_set(self: &Arc<Self>) -> Result<(), WorkoutError> {
        let (exercise, target_reps, current_set, target_sets, epoch) = {
            let mut guard = self.inner.lock().await;
            if guard.closed {
                return Err(WorkoutError::Closed);
            }
            let Some(exercise) = guard.exercise else {
                self.record_error(&mut guard, NO_EXERCISE_MESSAGE);
                return Err(WorkoutError::NoExercise);
            };
            if !matches!(guard.phase, Phase::Idle | Phase::SetComplete) {
                return Err(WorkoutError::InvalidPhase {
                    operation: "start a set",
                    phase: guard.phase,
                });
            }
            if guard.start_pending {
                return Err(WorkoutError::StartPending);
            }
            guard.start_pending = true;
            guard.last_error = None;
            (
                exercise,
                guard.config.target_reps,
                guard.current_set,
                guard.config.target_sets,
                guard.epoch,
            )
        };

        info!(
            exercise = exercise.id(),
            set = current_set,
            of = target_sets,
            target_reps,
            "starting workout set"
        );
        let result = self.backend.start_workout(target_reps, exercise).await;

        let mut guard = self.inner.lock().await;
        guard.start_pending = false;
        if let Err(err) = result {
            error!(error = %err, "failed to start workout");
            self.record_error(&mut guard, START_FAILED_MESSAGE);
            return Err(WorkoutError::Remote(START_FAILED_MESSAGE.to_string()));
        }
        if guard.closed {
            debug!("session closed while the set was starting; not polling");
            return Err(WorkoutError::Closed);
        }
        if guard.epoch != epoch {
            return Err(WorkoutError::InvalidPhase {
                operation: "start a set",
                phase: guard.phase,
            });
        }

        guard.epoch += 1;
        guard.phase = Phase::Active;
        guard.clear_set_progress();
        guard.poll_task = Some(self.spawn_poll_task(guard.epoch));
        self.emit_phase(&guard);
        Ok(())
    }

    fn spawn_poll_task(self: &Arc<Self>, epoch: u64) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match session.backend.workout_status().await {
                    Ok(status) => {
                        if !session.apply_status(epoch, status).await {
                            break;
                        }
                    }
                    // The tracking service may be briefly unavailable; keep polling.
                    Err(err) => warn!(error = %err, "failed to get workout status"),
                }
                tokio::time::sleep(session.poll_interval).await;
            }
        })
    }

    /// Returns whether polling should continue.
    async fn apply_status(self: &Arc<Self>, epoch: u64, status: WorkoutStatus) -> bool {
        let mut guard = self.inner.lock().await;
        if guard.epoch != epoch || guard.phase != Phase::Active {
            return false;
        }

        let completed = status.completed;
        guard.reps_completed = status.reps_count;
        guard.status = Some(status);
        self.emit(WorkoutEvent::RepsUpdated {
            reps_completed: guard.reps_completed,
            target_reps: guard.config.target_reps,
        });
        if !completed {
            return true;
        }

        // This task is the poller; it exits right after returning.
        guard.poll_task = None;
        if guard.current_set < guard.config.target_sets {
            let rest_seconds = guard.config.rest_seconds;
            guard.phase = Phase::Resting;
            guard.rest_remaining = Some(rest_seconds);
            guard.rest_task = Some(self.spawn_rest_task(epoch, rest_seconds));
            info!(set = guard.current_set, rest_seconds, "set complete, resting");
        } else {
            guard.phase = Phase::AllComplete;
            guard.current_set = guard.config.target_sets + 1;
            info!(sets = guard.config.target_sets, "all sets complete");
        }
        self.emit_phase(&guard);
        false
    }

    fn spawn_rest_task(self: &Arc<Self>, epoch: u64, rest_seconds: u32) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut remaining = rest_seconds;
            while remaining > 0 {
                tokio::time::sleep(REST_TICK).await;
                remaining -= 1;
                if !session.record_rest_tick(epoch, remaining).await {
                    return;
                }
            }
            if let Err(err) = session.finish_rest(epoch, false).await {
                warn!(error = %err, "next set did not start after rest");
            }
        })
    }

    async fn record_rest_tick(&self, epoch: u64, remaining: u32) -> bool {
        let mut guard = self.inner.lock().await;
        if guard.epoch != epoch || guard.phase != Phase::Resting {
            return false;
        }
        guard.rest_remaining = Some(remaining);
        self.emit(WorkoutEvent::RestTick { remaining });
        true
    }

    /// Ends the rest interval early. Same transition as the countdown reaching zero.
    pub async fn skip_rest(self: &Arc<Self>) -> Result<(), WorkoutError> {
        let epoch = {
            let guard = self.inner.lock().await;
            if guard.phase != Phase::Resting {
                return Err(WorkoutError::InvalidPhase {
                    operation: "skip rest",
                    phase: guard.phase,
                });
            }
            guard.epoch
        };
        self.finish_rest(epoch, true).await
    }

    async fn finish_rest(
        self: &Arc<Self>,
        epoch: u64,
        cancel_countdown: bool,
    ) -> Result<(), WorkoutError> {
        {
            let mut guard = self.inner.lock().await;
            if guard.epoch != epoch || guard.phase != Phase::Resting {
                return Ok(());
            }
            let countdown = guard.rest_task.take();
            if cancel_countdown {
                if let Some(task) = countdown {
                    task.abort();
                }
            }
            guard.phase = Phase::SetComplete;
            guard.current_set += 1;
            guard.clear_set_progress();
            self.emit_phase(&guard);
        }
        self.start_set().await
    }

    /// Resets the backend counter and returns to `Idle` on the same set number.
    /// Rejected while a start request is still in flight.
    pub async fn reset_set(&self) -> Result<(), WorkoutError> {
        {
            let guard = self.inner.lock().await;
            if guard.closed {
                return Err(WorkoutError::Closed);
            }
            if guard.phase == Phase::AllComplete {
                return Err(WorkoutError::InvalidPhase {
                    operation: "reset",
                    phase: guard.phase,
                });
            }
            // The backend would keep counting a set this session no longer follows.
            if guard.start_pending {
                return Err(WorkoutError::StartPending);
            }
        }

        let result = self.backend.reset_workout().await;

        let mut guard = self.inner.lock().await;
        if let Err(err) = result {
            error!(error = %err, "failed to reset workout");
            self.record_error(&mut guard, RESET_FAILED_MESSAGE);
            return Err(WorkoutError::Remote(RESET_FAILED_MESSAGE.to_string()));
        }
        guard.cancel_tasks();
        guard.epoch += 1;
        guard.phase = Phase::Idle;
        guard.clear_set_progress();
        guard.last_error = None;
        info!(set = guard.current_set, "workout set reset");
        self.emit_phase(&guard);
        Ok(())
    }

    /// Stops all background work; the session accepts no further operations.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        guard.closed = true;
        guard.epoch += 1;
        guard.cancel_tasks();
        debug!("workout session closed");
    }
}

#[cfg(test)]
#[path = "tests/workout_tests.rs"]
mod tests;
