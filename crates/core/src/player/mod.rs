//! Replays a [`Record`] through an [`InputInjector`].
//!
//! Each session runs on its own thread. Events of one loop are scheduled
//! against the loop's start instant (`offset / speed`), which is the sum of
//! the scaled inter-event deltas without accumulating sleep overshoot. Every
//! wait goes through a [`CancelToken`] so a stop request interrupts it at
//! once instead of waiting out the delay.

use std::{
    fmt,
    sync::{mpsc, Arc, Condvar, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    config::validate_speed, InputInjector, LoopPolicy, Record, RecorderError, Result,
    SessionConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
}

/// Payload of the loop-started notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopProgress {
    /// Zero-based index of the loop that is starting.
    pub index: u32,
    /// Total loop count, `None` when looping forever.
    pub total: Option<u32>,
    pub infinite: bool,
}

impl fmt::Display for LoopProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = u64::from(self.index) + 1;
        match self.total {
            Some(total) if !self.infinite => write!(f, "Loop {current} of {total}"),
            _ => write!(f, "Loop {current} of \u{221E}"),
        }
    }
}

/// How a playback session ended. Exactly one is reported per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed { loops: u32 },
    Cancelled { loops_started: u32 },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    LoopStarted(LoopProgress),
    Finished(PlaybackOutcome),
}

/// Observer of playback progress. Called from the playback thread; the
/// loop-started call for a loop always precedes its first injection.
pub trait PlaybackListener: Send + Sync {
    fn loop_started(&self, _progress: &LoopProgress) {}

    fn playback_finished(&self, _outcome: &PlaybackOutcome) {}
}

impl PlaybackListener for mpsc::Sender<PlaybackEvent> {
    fn loop_started(&self, progress: &LoopProgress) {
        let _ = self.send(PlaybackEvent::LoopStarted(*progress));
    }

    fn playback_finished(&self, outcome: &PlaybackOutcome) {
        let _ = self.send(PlaybackEvent::Finished(outcome.clone()));
    }
}

/// Interruptible wait shared between the foreground and a playback thread.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if let Ok(mut cancelled) = self.cancelled.lock() {
            *cancelled = true;
        }
        self.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.lock().map(|flag| *flag).unwrap_or(true)
    }

    /// Blocks until `deadline` or cancellation, whichever comes first; `None`
    /// waits for cancellation only. Returns `true` when cancelled.
    pub fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let Ok(mut cancelled) = self.cancelled.lock() else {
            return true;
        };
        while !*cancelled {
            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    deadline - now
                }
                None => Duration::from_secs(3600),
            };
            cancelled = match self.signal.wait_timeout(cancelled, timeout) {
                Ok((guard, _)) => guard,
                Err(_) => return true,
            };
        }
        true
    }
}

/// Cloneable handle that stops the session it was taken from, from any
/// thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: Arc<CancelToken>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }
}

struct ActiveSession {
    cancel: Arc<CancelToken>,
    handle: JoinHandle<PlaybackOutcome>,
}

/// Plays records back with speed scaling and loop repetition.
pub struct Player<I: InputInjector + 'static> {
    injector: Arc<Mutex<I>>,
    state: Arc<Mutex<PlayerState>>,
    listeners: Vec<Arc<dyn PlaybackListener>>,
    session: Option<ActiveSession>,
}

impl<I: InputInjector + 'static> Player<I> {
    pub fn new(injector: I) -> Self {
        Self {
            injector: Arc::new(Mutex::new(injector)),
            state: Arc::new(Mutex::new(PlayerState::Idle)),
            listeners: Vec::new(),
            session: None,
        }
    }

    /// Registers a listener for all subsequent sessions.
    pub fn add_listener(&mut self, listener: Arc<dyn PlaybackListener>) {
        self.listeners.push(listener);
    }

    /// Convenience listener that forwards notifications into a channel.
    pub fn subscribe(&mut self) -> mpsc::Receiver<PlaybackEvent> {
        let (tx, rx) = mpsc::channel();
        self.add_listener(Arc::new(tx));
        rx
    }

    pub fn state(&self) -> PlayerState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(PlayerState::Idle)
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayerState::Playing
    }

    /// Starts replaying `record` on a background thread. Speed and loop
    /// policy are read from `config` once, here.
    pub fn play(&mut self, record: Arc<Record>, config: &impl SessionConfig) -> Result<()> {
        if record.is_empty() {
            return Err(RecorderError::EmptyRecord);
        }
        let speed = validate_speed(config.speed_multiplier())?;
        let policy = config.loop_policy();
        if policy == LoopPolicy::Count(0) {
            return Err(RecorderError::InvalidLoopCount);
        }

        {
            let mut state = lock_state(&self.state)?;
            if *state == PlayerState::Playing {
                return Err(RecorderError::AlreadyPlaying);
            }
            *state = PlayerState::Playing;
        }
        // The previous thread has already left the Playing state.
        self.reap();

        let cancel = Arc::new(CancelToken::new());
        let context = SessionContext {
            injector: self.injector.clone(),
            state: self.state.clone(),
            listeners: self.listeners.clone(),
            cancel: cancel.clone(),
            record,
            speed,
            policy,
        };

        tracing::info!(
            events = context.record.len(),
            speed,
            loops = ?policy.total(),
            "playback started"
        );
        let spawned = thread::Builder::new()
            .name("playback".into())
            .spawn(move || context.run());

        match spawned {
            Ok(handle) => {
                self.session = Some(ActiveSession { cancel, handle });
                Ok(())
            }
            Err(err) => {
                *lock_state(&self.state)? = PlayerState::Idle;
                Err(err.into())
            }
        }
    }

    /// Cancels the running session and waits for its thread to wind down.
    /// Remaining loops are discarded.
    pub fn stop(&mut self) -> Result<PlaybackOutcome> {
        if !self.is_playing() {
            return Err(RecorderError::NotPlaying);
        }
        let session = self.session.take().ok_or(RecorderError::NotPlaying)?;
        session.cancel.cancel();
        join(session.handle)
    }

    /// Handle that can cancel the current session from another thread.
    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.session.as_ref().map(|session| StopHandle {
            token: session.cancel.clone(),
        })
    }

    /// Blocks until the current session ends on its own (or through a
    /// [`StopHandle`]) and returns how it ended.
    pub fn wait(&mut self) -> Result<PlaybackOutcome> {
        let session = self.session.take().ok_or(RecorderError::NotPlaying)?;
        join(session.handle)
    }

    fn reap(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(err) = join(session.handle) {
                tracing::warn!(%err, "previous playback thread ended abnormally");
            }
        }
    }
}

impl<I: InputInjector + 'static> Drop for Player<I> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            let _ = session.handle.join();
        }
    }
}

impl<I: InputInjector + 'static> fmt::Debug for Player<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn join(handle: JoinHandle<PlaybackOutcome>) -> Result<PlaybackOutcome> {
    handle
        .join()
        .map_err(|_| RecorderError::msg("playback thread panicked"))
}

fn lock_state(state: &Mutex<PlayerState>) -> Result<MutexGuard<'_, PlayerState>> {
    state
        .lock()
        .map_err(|_| RecorderError::msg("player state has been poisoned"))
}

/// Everything a playback thread owns for the duration of one session.
struct SessionContext<I: InputInjector> {
    injector: Arc<Mutex<I>>,
    state: Arc<Mutex<PlayerState>>,
    listeners: Vec<Arc<dyn PlaybackListener>>,
    cancel: Arc<CancelToken>,
    record: Arc<Record>,
    speed: f64,
    policy: LoopPolicy,
}

impl<I: InputInjector> SessionContext<I> {
    fn run(self) -> PlaybackOutcome {
        let outcome = match self.injector.lock() {
            // The guard holds the injection surface until the session ends,
            // whichever way it ends.
            Ok(mut injector) => self.play_loops(&mut *injector),
            Err(_) => PlaybackOutcome::Failed("input injector has been poisoned".into()),
        };

        if let Ok(mut state) = self.state.lock() {
            *state = PlayerState::Idle;
        }
        match &outcome {
            PlaybackOutcome::Failed(reason) => tracing::warn!(%reason, "playback failed"),
            outcome => tracing::info!(?outcome, "playback finished"),
        }
        for listener in &self.listeners {
            listener.playback_finished(&outcome);
        }
        outcome
    }

    fn play_loops(&self, injector: &mut I) -> PlaybackOutcome {
        let total = self.policy.total();
        let mut index: u32 = 0;

        loop {
            if let Some(total) = total {
                if index >= total {
                    return PlaybackOutcome::Completed { loops: total };
                }
            }
            if self.cancel.is_cancelled() {
                return PlaybackOutcome::Cancelled {
                    loops_started: index,
                };
            }

            let progress = LoopProgress {
                index,
                total,
                infinite: self.policy.is_infinite(),
            };
            tracing::debug!(%progress, "loop started");
            for listener in &self.listeners {
                listener.loop_started(&progress);
            }

            let loop_start = Instant::now();
            for event in self.record.events() {
                let due = loop_start.checked_add(scaled_delay(event.offset_millis(), self.speed));
                if self.cancel.wait_until(due) {
                    return PlaybackOutcome::Cancelled {
                        loops_started: index + 1,
                    };
                }
                if let Err(err) = injector.inject(event.action()) {
                    return PlaybackOutcome::Failed(err.to_string());
                }
            }

            index = index.saturating_add(1);
        }
    }
}

/// Wall-clock delay for a recorded offset at the given speed.
pub fn scaled_delay(offset_millis: u64, speed: f64) -> Duration {
    Duration::try_from_secs_f64(offset_millis as f64 / 1000.0 / speed).unwrap_or(Duration::MAX)
}
