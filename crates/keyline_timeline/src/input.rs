// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input event values routed by the timeline.
//!
//! Hosts either build these directly or translate a frame of egui events
//! with [`PointerTracker::translate`].

use egui::{Key, Modifiers, PointerButton, Pos2};

/// A pointer event at a screen position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// Screen position
    pub pos: Pos2,
    /// Button involved (primary for moves)
    pub button: PointerButton,
    /// Modifier keys held
    pub modifiers: Modifiers,
}

impl PointerEvent {
    /// Primary-button event with no modifiers
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            pos: Pos2::new(x, y),
            button: PointerButton::Primary,
            modifiers: Modifiers::NONE,
        }
    }

    /// Same event with different modifiers
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// A key event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEvent {
    /// Logical key
    pub key: Key,
    /// Modifier keys held
    pub modifiers: Modifiers,
}

impl KeyEvent {
    /// Key with no modifiers
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::NONE,
        }
    }

    /// Same key with different modifiers
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Whether the platform primary modifier (cmd on macOS, ctrl elsewhere) is held
    pub fn primary(&self) -> bool {
        self.modifiers.command
    }
}

/// Input routed through [`crate::Timeline::handle_input`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Pointer button went down
    PointerPressed(PointerEvent),
    /// Pointer moved with no button held
    PointerMoved(PointerEvent),
    /// Pointer moved with a button held
    PointerDragged(PointerEvent),
    /// Pointer button went up
    PointerReleased(PointerEvent),
    /// Key went down
    KeyPressed(KeyEvent),
    /// Key went up
    KeyReleased(KeyEvent),
}

/// Turns raw egui events into timeline input, telling moves from drags
#[derive(Debug, Clone, Default)]
pub struct PointerTracker {
    held: Option<PointerButton>,
    modifiers: Modifiers,
}

impl PointerTracker {
    /// Create a tracker with no button held
    pub fn new() -> Self {
        Self::default()
    }

    /// Button currently held, if any
    pub fn held_button(&self) -> Option<PointerButton> {
        self.held
    }

    /// Translate one frame of egui events
    pub fn translate(&mut self, events: &[egui::Event]) -> Vec<InputEvent> {
        let mut out = Vec::new();
        for event in events {
            match event {
                egui::Event::PointerMoved(pos) => {
                    let pointer = PointerEvent {
                        pos: *pos,
                        button: self.held.unwrap_or(PointerButton::Primary),
                        modifiers: self.modifiers,
                    };
                    if self.held.is_some() {
                        out.push(InputEvent::PointerDragged(pointer));
                    } else {
                        out.push(InputEvent::PointerMoved(pointer));
                    }
                }
                egui::Event::PointerButton {
                    pos,
                    button,
                    pressed,
                    modifiers,
                    ..
                } => {
                    self.modifiers = *modifiers;
                    let pointer = PointerEvent {
                        pos: *pos,
                        button: *button,
                        modifiers: *modifiers,
                    };
                    if *pressed {
                        self.held = Some(*button);
                        out.push(InputEvent::PointerPressed(pointer));
                    } else {
                        self.held = None;
                        out.push(InputEvent::PointerReleased(pointer));
                    }
                }
                egui::Event::Key {
                    key,
                    pressed,
                    modifiers,
                    ..
                } => {
                    self.modifiers = *modifiers;
                    let key_event = KeyEvent {
                        key: *key,
                        modifiers: *modifiers,
                    };
                    if *pressed {
                        out.push(InputEvent::KeyPressed(key_event));
                    } else {
                        out.push(InputEvent::KeyReleased(key_event));
                    }
                }
                _ => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moves_become_drags_while_held() {
        let mut tracker = PointerTracker::new();
        let events = vec![
            egui::Event::PointerMoved(Pos2::new(1.0, 1.0)),
            egui::Event::PointerButton {
                pos: Pos2::new(1.0, 1.0),
                button: PointerButton::Primary,
                pressed: true,
                modifiers: Modifiers::NONE,
            },
            egui::Event::PointerMoved(Pos2::new(5.0, 1.0)),
            egui::Event::PointerButton {
                pos: Pos2::new(5.0, 1.0),
                button: PointerButton::Primary,
                pressed: false,
                modifiers: Modifiers::NONE,
            },
        ];

        let translated = tracker.translate(&events);
        assert!(matches!(translated[0], InputEvent::PointerMoved(_)));
        assert!(matches!(translated[1], InputEvent::PointerPressed(_)));
        assert!(matches!(translated[2], InputEvent::PointerDragged(_)));
        assert!(matches!(translated[3], InputEvent::PointerReleased(_)));
        assert!(tracker.held_button().is_none());
    }

    #[test]
    fn test_primary_modifier() {
        let event = KeyEvent::new(Key::Z).with_modifiers(Modifiers::COMMAND);
        assert!(event.primary());
        assert!(!KeyEvent::new(Key::Z).primary());
    }
}
