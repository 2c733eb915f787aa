use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use crate::{Event, EventSink, InputHook, Record, RecorderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Capturing,
}

/// Buffer shared with the hook callback. `None` once capture has stopped, so
/// late callbacks cannot append to a frozen record.
type CaptureBuffer = Arc<Mutex<Option<Record>>>;

/// Captures live input from an [`InputHook`] into a new [`Record`].
#[derive(Debug)]
pub struct Recorder<H: InputHook> {
    hook: H,
    state: RecorderState,
    buffer: Option<CaptureBuffer>,
    record: Option<Arc<Record>>,
}

impl<H: InputHook> Recorder<H> {
    pub fn new(hook: H) -> Self {
        Self {
            hook,
            state: RecorderState::Idle,
            buffer: None,
            record: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == RecorderState::Capturing
    }

    /// Starts a capture session with a fresh, empty record and installs the
    /// global input hook.
    pub fn record(&mut self) -> Result<()> {
        if self.is_capturing() {
            return Err(RecorderError::AlreadyCapturing);
        }

        let buffer: CaptureBuffer = Arc::new(Mutex::new(Some(Record::new())));
        let started = Instant::now();
        let sink = {
            let buffer = buffer.clone();
            EventSink::new(move |action| match buffer.lock() {
                Ok(mut slot) => {
                    if let Some(record) = slot.as_mut() {
                        // Stamped under the lock so offsets follow delivery order.
                        let offset = started.elapsed().as_millis() as u64;
                        record.push(Event::new(offset, action));
                    }
                }
                Err(_) => tracing::warn!("capture buffer poisoned, dropping input event"),
            })
        };

        self.hook.install(sink)?;
        self.buffer = Some(buffer);
        self.state = RecorderState::Capturing;
        tracing::info!("capture started");
        Ok(())
    }

    /// Ends the capture session, removes the hook and freezes the record.
    pub fn stop(&mut self) -> Result<Arc<Record>> {
        if !self.is_capturing() {
            return Err(RecorderError::NotCapturing);
        }

        let uninstalled = self.hook.uninstall();
        self.state = RecorderState::Idle;

        let record = match self.buffer.take() {
            Some(buffer) => {
                let mut slot = lock_buffer(&buffer)?;
                slot.take().unwrap_or_default()
            }
            None => Record::new(),
        };
        let record = Arc::new(record);
        self.record = Some(record.clone());
        tracing::info!(
            events = record.len(),
            duration_ms = record.duration().as_millis() as u64,
            "capture stopped"
        );

        uninstalled?;
        Ok(record)
    }

    /// Most recently captured or explicitly assigned record.
    pub fn get_record(&self) -> Option<Arc<Record>> {
        self.record.clone()
    }

    /// Replaces the current record, e.g. after opening a file.
    pub fn set_record(&mut self, record: Arc<Record>) -> Result<()> {
        if self.is_capturing() {
            return Err(RecorderError::CaptureInProgress);
        }
        self.record = Some(record);
        Ok(())
    }

    /// Number of events captured so far in the running session.
    pub fn captured_events(&self) -> usize {
        self.buffer
            .as_ref()
            .and_then(|buffer| buffer.lock().ok().map(|slot| slot.as_ref().map_or(0, Record::len)))
            .unwrap_or(0)
    }
}

impl<H: InputHook> Drop for Recorder<H> {
    fn drop(&mut self) {
        if self.is_capturing() {
            if let Err(err) = self.hook.uninstall() {
                tracing::warn!(%err, "failed to remove input hook on drop");
            }
        }
    }
}

fn lock_buffer(buffer: &CaptureBuffer) -> Result<MutexGuard<'_, Option<Record>>> {
    buffer
        .lock()
        .map_err(|_| RecorderError::msg("capture buffer has been poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InputAction, ManualHook, MouseButton};
    use std::{thread, time::Duration};

    fn recorder() -> (Recorder<ManualHook>, crate::HookHandle) {
        let hook = ManualHook::new();
        let handle = hook.handle();
        (Recorder::new(hook), handle)
    }

    #[test]
    fn captures_events_in_delivery_order() {
        let (mut recorder, os) = recorder();
        recorder.record().unwrap();
        assert!(os.is_installed());

        os.emit(InputAction::PointerMove { x: 10, y: 10 });
        thread::sleep(Duration::from_millis(20));
        os.emit(InputAction::ButtonPress {
            x: 10,
            y: 10,
            button: MouseButton::Left,
        });
        os.emit(InputAction::ButtonRelease {
            x: 10,
            y: 10,
            button: MouseButton::Left,
        });
        assert_eq!(recorder.captured_events(), 3);

        let record = recorder.stop().unwrap();
        assert!(!os.is_installed());
        assert_eq!(recorder.state(), RecorderState::Idle);

        let kinds: Vec<_> = record.events().iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec![
                crate::EventKind::PointerMove,
                crate::EventKind::ButtonPress,
                crate::EventKind::ButtonRelease
            ]
        );
        assert!(record.events()[1].offset_millis() >= 20);
        assert!(record
            .events()
            .windows(2)
            .all(|pair| pair[0].offset_millis() <= pair[1].offset_millis()));
        assert_eq!(recorder.get_record(), Some(record));
    }

    #[test]
    fn events_from_other_threads_keep_monotonic_offsets() {
        let (mut recorder, os) = recorder();
        recorder.record().unwrap();

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let os = os.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        os.emit(InputAction::PointerMove { x: worker, y: i });
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let record = recorder.stop().unwrap();
        assert_eq!(record.len(), 200);
        assert!(record
            .events()
            .windows(2)
            .all(|pair| pair[0].offset_millis() <= pair[1].offset_millis()));
    }

    #[test]
    fn no_appends_after_stop() {
        let (mut recorder, os) = recorder();
        recorder.record().unwrap();
        os.emit(InputAction::Wheel { delta: 1 });
        let record = recorder.stop().unwrap();

        assert!(!os.emit(InputAction::Wheel { delta: 2 }));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn state_machine_violations_are_reported() {
        let (mut recorder, _os) = recorder();
        assert!(matches!(recorder.stop(), Err(RecorderError::NotCapturing)));

        recorder.record().unwrap();
        assert!(matches!(
            recorder.record(),
            Err(RecorderError::AlreadyCapturing)
        ));
        assert!(matches!(
            recorder.set_record(Arc::new(Record::new())),
            Err(RecorderError::CaptureInProgress)
        ));

        recorder.stop().unwrap();
        assert!(matches!(recorder.stop(), Err(RecorderError::NotCapturing)));
    }

    #[test]
    fn set_record_replaces_when_idle() {
        let (mut recorder, _os) = recorder();
        assert!(recorder.get_record().is_none());

        let opened = Arc::new(Record::from_events(1, vec![Event::wheel(0, 1)]).unwrap());
        recorder.set_record(opened.clone()).unwrap();
        assert_eq!(recorder.get_record(), Some(opened));
    }

    #[test]
    fn each_session_starts_with_an_empty_record() {
        let (mut recorder, os) = recorder();
        recorder.record().unwrap();
        os.emit(InputAction::Wheel { delta: 1 });
        recorder.stop().unwrap();

        recorder.record().unwrap();
        let second = recorder.stop().unwrap();
        assert!(second.is_empty());
    }

    struct FailingHook;

    impl InputHook for FailingHook {
        fn install(&mut self, _sink: EventSink) -> Result<()> {
            Err(RecorderError::Platform("denied".into()))
        }

        fn uninstall(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_hook_install_leaves_recorder_idle() {
        let mut recorder = Recorder::new(FailingHook);
        assert!(matches!(recorder.record(), Err(RecorderError::Platform(_))));
        assert_eq!(recorder.state(), RecorderState::Idle);
    }
}
