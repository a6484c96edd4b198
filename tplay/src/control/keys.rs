//! Keyboard mapping for the terminal control surface

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::Command;

/// What a terminal event asks for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    Command(Command),
    /// Terminal resized; redraw the status line
    Redraw,
    Ignore,
}

/// Key help printed at start-up
pub const KEY_HELP: &str = "Space: play/pause  Left/Right: seek  q/Esc: quit";

/// Map a terminal event to an action.
///
/// Space toggles, Left/Right seek by `seek_step` seconds, `q`, Esc and
/// Ctrl-C quit. Key releases and repeats of non-seek keys are ignored.
pub fn command_for_key(event: &Event, seek_step: f64) -> KeyAction {
    match event {
        Event::Key(key) => map_key(key, seek_step),
        Event::Resize(_, _) => KeyAction::Redraw,
        _ => KeyAction::Ignore,
    }
}

fn map_key(key: &KeyEvent, seek_step: f64) -> KeyAction {
    if key.kind == KeyEventKind::Release {
        return KeyAction::Ignore;
    }
    let repeat = key.kind == KeyEventKind::Repeat;

    let command = match key.code {
        KeyCode::Left => Command::Seek(-seek_step),
        KeyCode::Right => Command::Seek(seek_step),
        _ if repeat => return KeyAction::Ignore,
        KeyCode::Char(' ') => Command::TogglePlayPause,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Command::Quit,
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Command::Quit,
        _ => return KeyAction::Ignore,
    };
    KeyAction::Command(command)
}
