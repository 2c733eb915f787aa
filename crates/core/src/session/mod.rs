use std::{path::Path, sync::Arc};

use crate::{
    format, InputHook, InputInjector, PlaybackEvent, PlaybackListener, PlaybackOutcome, Player,
    Record, Recorder, RecorderError, Result, SessionConfig, StopHandle,
};

/// Which activity currently holds the OS input surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Playing,
}

/// Front-end facing coordinator owning one [`Recorder`] and one [`Player`].
///
/// Capture and playback are mutually exclusive: starting one while the
/// other runs is rejected instead of contending for the input surface.
#[derive(Debug)]
pub struct Session<H: InputHook, I: InputInjector + 'static> {
    recorder: Recorder<H>,
    player: Player<I>,
}

impl<H: InputHook, I: InputInjector + 'static> Session<H, I> {
    pub fn new(hook: H, injector: I) -> Self {
        Self {
            recorder: Recorder::new(hook),
            player: Player::new(injector),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.recorder.is_capturing() {
            SessionState::Recording
        } else if self.player.is_playing() {
            SessionState::Playing
        } else {
            SessionState::Idle
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn PlaybackListener>) {
        self.player.add_listener(listener);
    }

    pub fn subscribe(&mut self) -> std::sync::mpsc::Receiver<PlaybackEvent> {
        self.player.subscribe()
    }

    pub fn record(&mut self) -> Result<()> {
        if self.player.is_playing() {
            return Err(RecorderError::PlaybackInProgress);
        }
        self.recorder.record()
    }

    /// Stops whichever activity is running and reports which one it was.
    pub fn stop(&mut self) -> Result<SessionState> {
        match self.state() {
            SessionState::Recording => {
                self.recorder.stop()?;
                Ok(SessionState::Recording)
            }
            SessionState::Playing => {
                self.player.stop()?;
                Ok(SessionState::Playing)
            }
            SessionState::Idle => Err(RecorderError::NotCapturing),
        }
    }

    /// Replays the current record using a snapshot of `config`.
    pub fn play(&mut self, config: &impl SessionConfig) -> Result<()> {
        if self.recorder.is_capturing() {
            return Err(RecorderError::CaptureInProgress);
        }
        let record = self.recorder.get_record().ok_or(RecorderError::EmptyRecord)?;
        self.player.play(record, config)
    }

    /// Blocks until the running playback ends.
    pub fn wait(&mut self) -> Result<PlaybackOutcome> {
        self.player.wait()
    }

    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.player.stop_handle()
    }

    pub fn record_ref(&self) -> Option<Arc<Record>> {
        self.recorder.get_record()
    }

    pub fn set_record(&mut self, record: Record) -> Result<()> {
        if self.player.is_playing() {
            return Err(RecorderError::PlaybackInProgress);
        }
        self.recorder.set_record(Arc::new(record))
    }

    /// Loads a record from disk and makes it the current one.
    pub fn open(&mut self, path: &Path) -> Result<Arc<Record>> {
        match self.state() {
            SessionState::Recording => return Err(RecorderError::CaptureInProgress),
            SessionState::Playing => return Err(RecorderError::PlaybackInProgress),
            SessionState::Idle => {}
        }
        let record = Arc::new(format::load_from_path(path)?);
        self.recorder.set_record(record.clone())?;
        Ok(record)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if self.recorder.is_capturing() {
            return Err(RecorderError::CaptureInProgress);
        }
        let record = self.recorder.get_record().ok_or(RecorderError::EmptyRecord)?;
        format::save_to_path(&record, path)
    }
}
