//! Pointer and keyboard state for the capture surface.
//!
//! The state is a plain value: the input boundary receives the current
//! [`InteractionState`], applies one event and hands back the next state plus
//! whether a capture was triggered. Nothing here is shared across threads.

use crate::geometry::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Move { x: i64, y: i64 },
    Down { x: i64, y: i64 },
    Up { x: i64, y: i64 },
}

impl PointerEvent {
    pub fn position(&self) -> (i64, i64) {
        match *self {
            PointerEvent::Move { x, y } | PointerEvent::Down { x, y } | PointerEvent::Up { x, y } => (x, y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Quit,
    Capture,
    Other,
}

impl KeyCommand {
    pub fn from_key(key: char) -> Self {
        match key {
            'q' => KeyCommand::Quit,
            ' ' => KeyCommand::Capture,
            _ => KeyCommand::Other,
        }
    }

    /// Line-oriented variant for terminals: `q` quits, an empty line,
    /// `space` or `s` captures.
    pub fn from_line(line: &str) -> Self {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == " " {
            return KeyCommand::Capture;
        }
        match trimmed.trim().to_ascii_lowercase().as_str() {
            "q" | "quit" => KeyCommand::Quit,
            "" | "s" | "space" | "scan" => KeyCommand::Capture,
            _ => KeyCommand::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Normal,
    Hover,
    Pressed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionState {
    pub hover: bool,
    pub pressed: bool,
}

impl InteractionState {
    /// Applies one pointer event against the button rectangle.
    /// Returns the next state and whether the event completed a click.
    pub fn on_pointer(self, event: PointerEvent, button: Rect) -> (InteractionState, bool) {
        let (x, y) = event.position();
        let hover = button.contains(x, y);
        let mut next = InteractionState { hover, pressed: self.pressed };
        let mut triggered = false;

        match event {
            PointerEvent::Down { .. } if hover => next.pressed = true,
            PointerEvent::Up { .. } => {
                triggered = self.pressed && hover;
                next.pressed = false;
            }
            _ => {}
        }

        (next, triggered)
    }

    pub fn style(&self) -> ButtonStyle {
        if self.pressed {
            ButtonStyle::Pressed
        } else if self.hover {
            ButtonStyle::Hover
        } else {
            ButtonStyle::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUTTON: Rect = Rect { x: 100, y: 100, width: 50, height: 20 };

    #[test]
    fn click_inside_triggers() {
        let s = InteractionState::default();
        let (s, t) = s.on_pointer(PointerEvent::Move { x: 110, y: 110 }, BUTTON);
        assert!(s.hover && !t);
        let (s, t) = s.on_pointer(PointerEvent::Down { x: 110, y: 110 }, BUTTON);
        assert!(s.pressed && !t);
        assert_eq!(s.style(), ButtonStyle::Pressed);
        let (s, t) = s.on_pointer(PointerEvent::Up { x: 112, y: 111 }, BUTTON);
        assert!(t);
        assert!(!s.pressed);
        assert_eq!(s.style(), ButtonStyle::Hover);
    }

    #[test]
    fn release_outside_cancels() {
        let s = InteractionState::default();
        let (s, _) = s.on_pointer(PointerEvent::Down { x: 110, y: 110 }, BUTTON);
        let (s, t) = s.on_pointer(PointerEvent::Up { x: 10, y: 10 }, BUTTON);
        assert!(!t);
        assert_eq!(s, InteractionState::default());
    }

    #[test]
    fn press_outside_is_ignored() {
        let s = InteractionState::default();
        let (s, _) = s.on_pointer(PointerEvent::Down { x: 0, y: 0 }, BUTTON);
        assert!(!s.pressed);
        let (_, t) = s.on_pointer(PointerEvent::Up { x: 110, y: 110 }, BUTTON);
        assert!(!t);
    }

    #[test]
    fn key_commands() {
        assert_eq!(KeyCommand::from_key('q'), KeyCommand::Quit);
        assert_eq!(KeyCommand::from_key(' '), KeyCommand::Capture);
        assert_eq!(KeyCommand::from_key('x'), KeyCommand::Other);
        assert_eq!(KeyCommand::from_line("\n"), KeyCommand::Capture);
        assert_eq!(KeyCommand::from_line(" \n"), KeyCommand::Capture);
        assert_eq!(KeyCommand::from_line("Q\n"), KeyCommand::Quit);
        assert_eq!(KeyCommand::from_line("hello"), KeyCommand::Other);
    }
}
