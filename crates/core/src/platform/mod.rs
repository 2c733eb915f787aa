//! Boundary to the operating system's input subsystem.
//!
//! The recorder observes input through an [`InputHook`] and the player
//! synthesizes it through an [`InputInjector`]. Both are process-wide
//! resources in a real backend; the in-process implementations here let the
//! engine run against synthetic input in tests and dry runs.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use crate::{InputAction, RecorderError, Result};

#[cfg(feature = "native")]
mod native;

#[cfg(feature = "native")]
pub use native::{EnigoInjector, RdevHook};

/// Callback an [`InputHook`] invokes for every observed OS event.
///
/// Invocations must return promptly; the hook thread is not allowed to
/// stall waiting on the engine.
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(InputAction) + Send + Sync>);

impl EventSink {
    pub fn new(callback: impl Fn(InputAction) + Send + Sync + 'static) -> Self {
        Self(Arc::new(callback))
    }

    pub fn emit(&self, action: InputAction) {
        (self.0)(action)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish()
    }
}

/// System-wide subscription to pointer, button and wheel events.
pub trait InputHook: Send {
    /// Starts delivering events to `sink` until [`InputHook::uninstall`].
    fn install(&mut self, sink: EventSink) -> Result<()>;

    fn uninstall(&mut self) -> Result<()>;
}

/// Capability to synthesize input events at absolute coordinates.
pub trait InputInjector: Send {
    fn inject(&mut self, action: &InputAction) -> Result<()>;
}

type SinkSlot = Arc<Mutex<Option<EventSink>>>;

fn lock_slot(slot: &SinkSlot) -> Result<MutexGuard<'_, Option<EventSink>>> {
    slot.lock()
        .map_err(|_| RecorderError::msg("input hook slot has been poisoned"))
}

/// Hook fed by hand through a [`HookHandle`], standing in for the OS event
/// stream.
#[derive(Debug, Default)]
pub struct ManualHook {
    slot: SinkSlot,
}

impl ManualHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that emits synthetic OS events into whatever sink is installed.
    pub fn handle(&self) -> HookHandle {
        HookHandle {
            slot: self.slot.clone(),
        }
    }
}

impl InputHook for ManualHook {
    fn install(&mut self, sink: EventSink) -> Result<()> {
        let mut slot = lock_slot(&self.slot)?;
        if slot.is_some() {
            return Err(RecorderError::Platform("input hook already installed".into()));
        }
        *slot = Some(sink);
        Ok(())
    }

    fn uninstall(&mut self) -> Result<()> {
        lock_slot(&self.slot)?.take();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HookHandle {
    slot: SinkSlot,
}

impl HookHandle {
    /// Delivers `action` as if the OS had reported it. Returns `false` when no
    /// sink is installed and the event was dropped.
    pub fn emit(&self, action: InputAction) -> bool {
        // Clone out of the lock so the sink runs without holding it.
        let sink = match self.slot.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        match sink {
            Some(sink) => {
                sink.emit(action);
                true
            }
            None => false,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

/// Injector that keeps every synthesized action together with the instant it
/// was injected.
#[derive(Debug, Default)]
pub struct CapturingInjector {
    log: InjectionLog,
}

impl CapturingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> InjectionLog {
        self.log.clone()
    }
}

impl InputInjector for CapturingInjector {
    fn inject(&mut self, action: &InputAction) -> Result<()> {
        self.log
            .entries
            .lock()
            .map_err(|_| RecorderError::msg("injection log has been poisoned"))?
            .push((Instant::now(), *action));
        Ok(())
    }
}

/// Shared view over the actions a [`CapturingInjector`] has received.
#[derive(Debug, Default, Clone)]
pub struct InjectionLog {
    entries: Arc<Mutex<Vec<(Instant, InputAction)>>>,
}

impl InjectionLog {
    pub fn entries(&self) -> Vec<(Instant, InputAction)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<InputAction> {
        self.entries().into_iter().map(|(_, action)| action).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dry-run injector: reports each action through `tracing` instead of
/// touching the OS.
#[derive(Debug, Default)]
pub struct LoggingInjector {
    injected: u64,
}

impl LoggingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn injected(&self) -> u64 {
        self.injected
    }
}

impl InputInjector for LoggingInjector {
    fn inject(&mut self, action: &InputAction) -> Result<()> {
        self.injected += 1;
        tracing::info!(seq = self.injected, ?action, "dry-run injection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn manual_hook_delivers_only_while_installed() {
        let mut hook = ManualHook::new();
        let handle = hook.handle();
        let seen = Arc::new(AtomicUsize::new(0));

        assert!(!handle.emit(InputAction::Wheel { delta: 1 }));

        let counter = seen.clone();
        hook.install(EventSink::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        assert!(handle.is_installed());
        assert!(handle.emit(InputAction::PointerMove { x: 1, y: 2 }));

        hook.uninstall().unwrap();
        assert!(!handle.emit(InputAction::PointerMove { x: 3, y: 4 }));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn manual_hook_rejects_second_install() {
        let mut hook = ManualHook::new();
        hook.install(EventSink::new(|_| {})).unwrap();
        let err = hook.install(EventSink::new(|_| {})).unwrap_err();
        assert!(matches!(err, RecorderError::Platform(_)));
    }

    #[test]
    fn capturing_injector_keeps_order() {
        let mut injector = CapturingInjector::new();
        let log = injector.log();
        injector.inject(&InputAction::Wheel { delta: 1 }).unwrap();
        injector.inject(&InputAction::Wheel { delta: 2 }).unwrap();

        assert_eq!(
            log.actions(),
            vec![InputAction::Wheel { delta: 1 }, InputAction::Wheel { delta: 2 }]
        );
    }

    #[test]
    fn logging_injector_counts() {
        let mut injector = LoggingInjector::new();
        injector.inject(&InputAction::PointerMove { x: 0, y: 0 }).unwrap();
        assert_eq!(injector.injected(), 1);
    }
}
