use serde::{Deserialize, Serialize};

/// Pointer button affected by a press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    /// Any additional button, identified by the platform's raw id.
    Other(u8),
}

impl MouseButton {
    /// Stable numeric code used by the binary format.
    pub fn code(self) -> u8 {
        match self {
            MouseButton::Left => 1,
            MouseButton::Middle => 2,
            MouseButton::Right => 3,
            MouseButton::Other(_) => 0xFF,
        }
    }

    /// Raw platform id, only meaningful for [`MouseButton::Other`].
    pub fn raw_id(self) -> u8 {
        match self {
            MouseButton::Other(id) => id,
            _ => 0,
        }
    }

    /// Inverse of [`MouseButton::code`] / [`MouseButton::raw_id`].
    pub fn from_code(code: u8, raw_id: u8) -> Option<Self> {
        match code {
            1 => Some(MouseButton::Left),
            2 => Some(MouseButton::Middle),
            3 => Some(MouseButton::Right),
            0xFF => Some(MouseButton::Other(raw_id)),
            _ => None,
        }
    }
}

/// Discriminator of an [`InputAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    PointerMove,
    ButtonPress,
    ButtonRelease,
    Wheel,
}

/// One input occurrence, as observed from or injected into the OS.
///
/// Coordinates are absolute screen positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputAction {
    PointerMove { x: i32, y: i32 },
    ButtonPress { x: i32, y: i32, button: MouseButton },
    ButtonRelease { x: i32, y: i32, button: MouseButton },
    /// Vertical scroll; positive values scroll down.
    Wheel { delta: i32 },
}

impl InputAction {
    pub fn kind(&self) -> EventKind {
        match self {
            InputAction::PointerMove { .. } => EventKind::PointerMove,
            InputAction::ButtonPress { .. } => EventKind::ButtonPress,
            InputAction::ButtonRelease { .. } => EventKind::ButtonRelease,
            InputAction::Wheel { .. } => EventKind::Wheel,
        }
    }

    /// Screen position carried by the action, if any.
    pub fn position(&self) -> Option<(i32, i32)> {
        match *self {
            InputAction::PointerMove { x, y }
            | InputAction::ButtonPress { x, y, .. }
            | InputAction::ButtonRelease { x, y, .. } => Some((x, y)),
            InputAction::Wheel { .. } => None,
        }
    }

    pub fn button(&self) -> Option<MouseButton> {
        match *self {
            InputAction::ButtonPress { button, .. } | InputAction::ButtonRelease { button, .. } => {
                Some(button)
            }
            _ => None,
        }
    }
}

/// A captured [`InputAction`] stamped with the time elapsed since the start
/// of its recording session. Events are immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    offset_millis: u64,
    action: InputAction,
}

impl Event {
    pub fn new(offset_millis: u64, action: InputAction) -> Self {
        Self {
            offset_millis,
            action,
        }
    }

    pub fn pointer_move(offset_millis: u64, x: i32, y: i32) -> Self {
        Self::new(offset_millis, InputAction::PointerMove { x, y })
    }

    pub fn button_press(offset_millis: u64, x: i32, y: i32, button: MouseButton) -> Self {
        Self::new(offset_millis, InputAction::ButtonPress { x, y, button })
    }

    pub fn button_release(offset_millis: u64, x: i32, y: i32, button: MouseButton) -> Self {
        Self::new(offset_millis, InputAction::ButtonRelease { x, y, button })
    }

    pub fn wheel(offset_millis: u64, delta: i32) -> Self {
        Self::new(offset_millis, InputAction::Wheel { delta })
    }

    pub fn offset_millis(&self) -> u64 {
        self.offset_millis
    }

    pub fn action(&self) -> &InputAction {
        &self.action
    }

    pub fn kind(&self) -> EventKind {
        self.action.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_codes_are_reversible() {
        for button in [
            MouseButton::Left,
            MouseButton::Middle,
            MouseButton::Right,
            MouseButton::Other(9),
        ] {
            assert_eq!(
                MouseButton::from_code(button.code(), button.raw_id()),
                Some(button)
            );
        }
        assert_eq!(MouseButton::from_code(7, 0), None);
    }

    #[test]
    fn wheel_events_carry_no_position_or_button() {
        let event = Event::wheel(5, -3);
        assert_eq!(event.kind(), EventKind::Wheel);
        assert_eq!(event.action().position(), None);
        assert_eq!(event.action().button(), None);
    }

    #[test]
    fn button_events_expose_position_and_button() {
        let event = Event::button_press(50, 10, 20, MouseButton::Left);
        assert_eq!(event.offset_millis(), 50);
        assert_eq!(event.action().position(), Some((10, 20)));
        assert_eq!(event.action().button(), Some(MouseButton::Left));
    }
}
