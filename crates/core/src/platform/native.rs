//! Real OS backends: `rdev` for the global hook, `enigo` for injection.

use std::{
    cell::RefCell,
    sync::{
        atomic::{AtomicBool, AtomicI32, Ordering},
        Mutex, OnceLock,
    },
    thread,
};

use enigo::{Axis, Coordinate, Direction, Enigo, Mouse, Settings};

use super::{EventSink, InputHook, InputInjector};
use crate::{InputAction, MouseButton, RecorderError, Result};

// rdev::listen never returns, so one listener thread serves the whole
// process and forwards to whichever sink is currently installed.
static LISTENER_STARTED: OnceLock<()> = OnceLock::new();
static ACTIVE_SINK: Mutex<Option<EventSink>> = Mutex::new(None);
static POINTER_X: AtomicI32 = AtomicI32::new(0);
static POINTER_Y: AtomicI32 = AtomicI32::new(0);
static LISTENER_FAILED: AtomicBool = AtomicBool::new(false);

/// Global pointer hook backed by `rdev::listen`.
#[derive(Debug, Default)]
pub struct RdevHook {
    installed: bool,
}

impl RdevHook {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputHook for RdevHook {
    fn install(&mut self, sink: EventSink) -> Result<()> {
        if LISTENER_FAILED.load(Ordering::SeqCst) {
            return Err(RecorderError::Platform(
                "global input listener could not be started".into(),
            ));
        }

        seed_pointer(current_location());

        {
            let mut active = ACTIVE_SINK
                .lock()
                .map_err(|_| RecorderError::msg("input hook slot has been poisoned"))?;
            if active.is_some() {
                return Err(RecorderError::Platform("input hook already installed".into()));
            }
            *active = Some(sink);
        }

        LISTENER_STARTED.get_or_init(|| {
            thread::Builder::new()
                .name("rdev-listener".into())
                .spawn(run_listener)
                .map(|_| ())
                .unwrap_or_else(|err| {
                    tracing::error!(%err, "failed to spawn input listener thread");
                    LISTENER_FAILED.store(true, Ordering::SeqCst);
                })
        });

        self.installed = true;
        Ok(())
    }

    fn uninstall(&mut self) -> Result<()> {
        if self.installed {
            ACTIVE_SINK
                .lock()
                .map_err(|_| RecorderError::msg("input hook slot has been poisoned"))?
                .take();
            self.installed = false;
        }
        Ok(())
    }
}

impl Drop for RdevHook {
    fn drop(&mut self) {
        let _ = self.uninstall();
    }
}

fn run_listener() {
    tracing::debug!("starting global input listener");
    if let Err(err) = rdev::listen(forward_event) {
        tracing::error!(?err, "global input listener stopped");
        LISTENER_FAILED.store(true, Ordering::SeqCst);
    }
}

fn forward_event(event: rdev::Event) {
    let Some(action) = translate(event.event_type) else {
        return;
    };

    let sink = ACTIVE_SINK.lock().ok().and_then(|slot| slot.clone());
    if let Some(sink) = sink {
        sink.emit(action);
    }
}

/// Converts an rdev event, attaching the last known pointer position to
/// button events since rdev reports none for them.
fn translate(event_type: rdev::EventType) -> Option<InputAction> {
    let action = match event_type {
        rdev::EventType::MouseMove { x, y } => {
            let (x, y) = (x.round() as i32, y.round() as i32);
            POINTER_X.store(x, Ordering::Relaxed);
            POINTER_Y.store(y, Ordering::Relaxed);
            InputAction::PointerMove { x, y }
        }
        rdev::EventType::ButtonPress(button) => {
            let (x, y) = pointer();
            InputAction::ButtonPress {
                x,
                y,
                button: map_button(button),
            }
        }
        rdev::EventType::ButtonRelease(button) => {
            let (x, y) = pointer();
            InputAction::ButtonRelease {
                x,
                y,
                button: map_button(button),
            }
        }
        // rdev reports upward scrolling as positive.
        rdev::EventType::Wheel { delta_y, .. } if delta_y != 0 => InputAction::Wheel {
            delta: -(delta_y.clamp(i32::MIN as i64 + 1, i32::MAX as i64) as i32),
        },
        _ => return None,
    };
    Some(action)
}

/// Asks the OS where the pointer is, so clicks made before the first
/// movement of a session get real coordinates.
fn current_location() -> std::result::Result<(i32, i32), String> {
    let enigo = Enigo::new(&Settings::default()).map_err(|err| err.to_string())?;
    enigo.location().map_err(|err| err.to_string())
}

fn seed_pointer(location: std::result::Result<(i32, i32), String>) {
    match location {
        Ok((x, y)) => {
            POINTER_X.store(x, Ordering::Relaxed);
            POINTER_Y.store(y, Ordering::Relaxed);
        }
        Err(err) => tracing::warn!(%err, "could not read the pointer location"),
    }
}

fn pointer() -> (i32, i32) {
    (
        POINTER_X.load(Ordering::Relaxed),
        POINTER_Y.load(Ordering::Relaxed),
    )
}

fn map_button(button: rdev::Button) -> MouseButton {
    match button {
        rdev::Button::Left => MouseButton::Left,
        rdev::Button::Right => MouseButton::Right,
        rdev::Button::Middle => MouseButton::Middle,
        rdev::Button::Unknown(id) => MouseButton::Other(id),
    }
}

thread_local! {
    static ENIGO: RefCell<Option<Enigo>> = const { RefCell::new(None) };
}

/// Injector backed by `enigo`. The connection is opened lazily on the thread
/// that performs the injection.
#[derive(Debug, Default)]
pub struct EnigoInjector;

impl EnigoInjector {
    pub fn new() -> Self {
        Self
    }
}

impl InputInjector for EnigoInjector {
    fn inject(&mut self, action: &InputAction) -> Result<()> {
        ENIGO.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                let enigo = Enigo::new(&Settings::default())
                    .map_err(|err| RecorderError::Platform(err.to_string()))?;
                *slot = Some(enigo);
            }
            let enigo = slot
                .as_mut()
                .ok_or_else(|| RecorderError::Platform("input connection unavailable".into()))?;
            apply(enigo, action)
        })
    }
}

fn apply(enigo: &mut Enigo, action: &InputAction) -> Result<()> {
    let outcome = match *action {
        InputAction::PointerMove { x, y } => enigo.move_mouse(x, y, Coordinate::Abs),
        InputAction::ButtonPress { x, y, button } => enigo
            .move_mouse(x, y, Coordinate::Abs)
            .and_then(|_| enigo.button(enigo_button(button)?, Direction::Press)),
        InputAction::ButtonRelease { x, y, button } => enigo
            .move_mouse(x, y, Coordinate::Abs)
            .and_then(|_| enigo.button(enigo_button(button)?, Direction::Release)),
        InputAction::Wheel { delta } => enigo.scroll(delta, Axis::Vertical),
    };
    outcome.map_err(|err| RecorderError::Platform(err.to_string()))
}

fn enigo_button(button: MouseButton) -> std::result::Result<enigo::Button, enigo::InputError> {
    match button {
        MouseButton::Left => Ok(enigo::Button::Left),
        MouseButton::Right => Ok(enigo::Button::Right),
        MouseButton::Middle => Ok(enigo::Button::Middle),
        #[cfg(not(target_os = "macos"))]
        MouseButton::Other(8) => Ok(enigo::Button::Back),
        #[cfg(not(target_os = "macos"))]
        MouseButton::Other(9) => Ok(enigo::Button::Forward),
        MouseButton::Other(_) => Err(enigo::InputError::InvalidInput(
            "unsupported mouse button",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_events_use_seeded_then_tracked_position() {
        seed_pointer(Ok((640, 480)));

        let press = translate(rdev::EventType::ButtonPress(rdev::Button::Left));
        assert_eq!(
            press,
            Some(InputAction::ButtonPress {
                x: 640,
                y: 480,
                button: MouseButton::Left,
            })
        );

        translate(rdev::EventType::MouseMove { x: 12.4, y: 7.6 });
        let release = translate(rdev::EventType::ButtonRelease(rdev::Button::Left));
        assert_eq!(
            release,
            Some(InputAction::ButtonRelease {
                x: 12,
                y: 8,
                button: MouseButton::Left,
            })
        );

        // A failed lookup keeps the last known position.
        seed_pointer(Err("no display".into()));
        assert_eq!(pointer(), (12, 8));
    }

    #[test]
    fn upward_scroll_becomes_negative_delta() {
        assert_eq!(
            translate(rdev::EventType::Wheel {
                delta_x: 0,
                delta_y: 2,
            }),
            Some(InputAction::Wheel { delta: -2 })
        );
        assert_eq!(
            translate(rdev::EventType::Wheel {
                delta_x: 1,
                delta_y: 0,
            }),
            None
        );
    }
}
