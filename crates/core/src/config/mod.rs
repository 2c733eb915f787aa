use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};

use crate::{RecorderError, Result};

/// How many times a playback session repeats the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopPolicy {
    Infinite,
    Count(u32),
}

impl LoopPolicy {
    /// Finite policy; zero repetitions is rejected.
    pub fn count(loops: u32) -> Result<Self> {
        if loops == 0 {
            return Err(RecorderError::InvalidLoopCount);
        }
        Ok(Self::Count(loops))
    }

    /// Total number of loops, `None` when infinite.
    pub fn total(&self) -> Option<u32> {
        match self {
            LoopPolicy::Infinite => None,
            LoopPolicy::Count(loops) => Some(*loops),
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, LoopPolicy::Infinite)
    }
}

/// Read-only values a session consumes once, when it starts.
pub trait SessionConfig {
    /// Linear playback speed; 1.0 is real time.
    fn speed_multiplier(&self) -> f64;

    fn loop_policy(&self) -> LoopPolicy;
}

/// Checks that a speed multiplier can produce a finite, forward delay.
pub fn validate_speed(speed: f64) -> Result<f64> {
    if speed.is_finite() && speed > 0.0 {
        Ok(speed)
    } else {
        Err(RecorderError::InvalidSpeed(speed))
    }
}

/// Top-level configuration structure for the application, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub speed: f64,
    pub infinite_loop: bool,
    pub loop_count: u32,
    /// Consumed by the front end only.
    pub minimize_on_record: bool,
    /// Consumed by the front end only.
    pub minimize_on_play: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            infinite_loop: false,
            loop_count: 1,
            minimize_on_record: false,
            minimize_on_play: false,
        }
    }
}

impl AppConfig {
    /// Reads the configuration at `path`, falling back to defaults when the
    /// file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(?path, "no configuration file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        validate_speed(self.speed).map_err(|_| {
            RecorderError::Config(format!("speed must be positive, got {}", self.speed))
        })?;
        if !self.infinite_loop && self.loop_count == 0 {
            return Err(RecorderError::Config("loop_count must be at least 1".into()));
        }
        Ok(())
    }
}

impl SessionConfig for AppConfig {
    fn speed_multiplier(&self) -> f64 {
        self.speed
    }

    fn loop_policy(&self) -> LoopPolicy {
        if self.infinite_loop {
            LoopPolicy::Infinite
        } else {
            LoopPolicy::Count(self.loop_count)
        }
    }
}
