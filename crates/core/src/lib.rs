//! Core library for the Mouse Recorder application.
//!
//! The crate holds the capture/replay engine: the [`Event`] and [`Record`]
//! data model, the [`Recorder`] that observes live pointer input, the
//! [`Player`] that reproduces it with speed scaling and looping, and the
//! codecs in [`format`] that make a recording portable. The operating
//! system is reached only through the [`InputHook`] and [`InputInjector`]
//! traits; real backends live behind the `native` feature.

pub mod config;
pub mod error;
pub mod event;
pub mod format;
pub mod platform;
pub mod player;
pub mod record;
pub mod recorder;
pub mod session;

pub use config::{AppConfig, LoopPolicy, SessionConfig};
pub use error::{RecorderError, Result};
pub use event::{Event, EventKind, InputAction, MouseButton};
pub use format::{BinaryFormat, JsonFormat, RecordFormat, FORMAT_VERSION};
#[cfg(feature = "native")]
pub use platform::{EnigoInjector, RdevHook};
pub use platform::{
    CapturingInjector, EventSink, HookHandle, InjectionLog, InputHook, InputInjector,
    LoggingInjector, ManualHook,
};
pub use player::{
    CancelToken, LoopProgress, PlaybackEvent, PlaybackListener, PlaybackOutcome, Player,
    PlayerState, StopHandle,
};
pub use record::{Record, RecordSummary};
pub use recorder::{Recorder, RecorderState};
pub use session::{Session, SessionState};
