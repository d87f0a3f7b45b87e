use std::io::IsTerminal;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use crate::audio::features::AmplitudeCurve;
use crate::render::modes::Mode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    SetMode(Mode),
    SetCurve(AmplitudeCurve),
    CycleScheme,
    Quit,
}

pub fn command_for_key(key: &KeyEvent) -> Option<Command> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(Command::Quit),
        KeyCode::Char(c @ '1'..='9') => Mode::from_digit(c).map(Command::SetMode),
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            'g' => Some(Command::SetCurve(AmplitudeCurve::Gamma)),
            'd' => Some(Command::SetCurve(AmplitudeCurve::Db)),
            'l' => Some(Command::SetCurve(AmplitudeCurve::Linear)),
            's' => Some(Command::SetCurve(AmplitudeCurve::Sqrt)),
            'c' => Some(Command::CycleScheme),
            _ => None,
        },
        _ => None,
    }
}

/// Non-blocking source of interactive commands, drained once per frame.
pub trait CommandSource {
    /// Next pending command, or `None` when nothing is queued.
    fn poll_command(&mut self) -> Option<Command>;
}

/// No interactive input (stdin is not a terminal).
pub struct NoInput;

impl CommandSource for NoInput {
    fn poll_command(&mut self) -> Option<Command> {
        None
    }
}

/// Terminal keyboard in raw mode. Raw mode is left again on drop.
pub struct KeyboardInput {
    _private: (),
}

impl KeyboardInput {
    /// `None` when stdin is not an interactive terminal.
    pub fn open() -> Result<Option<Self>> {
        if !std::io::stdin().is_terminal() {
            return Ok(None);
        }
        enable_raw_mode().context("Failed to enable raw terminal mode")?;
        Ok(Some(Self { _private: () }))
    }
}

impl CommandSource for KeyboardInput {
    fn poll_command(&mut self) -> Option<Command> {
        loop {
            match event::poll(Duration::ZERO) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => {
                    log::debug!("Keyboard poll failed: {}", err);
                    return None;
                }
            }
            match event::read() {
                Ok(Event::Key(key)) => {
                    if let Some(cmd) = command_for_key(&key) {
                        return Some(cmd);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    log::debug!("Keyboard read failed: {}", err);
                    return None;
                }
            }
        }
    }
}

impl Drop for KeyboardInput {
    fn drop(&mut self) {
        if let Err(err) = disable_raw_mode() {
            log::warn!("Failed to restore terminal: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn digits_pick_modes() {
        assert_eq!(
            command_for_key(&press(KeyCode::Char('1'))),
            Some(Command::SetMode(Mode::Bars))
        );
        assert_eq!(
            command_for_key(&press(KeyCode::Char('6'))),
            Some(Command::SetMode(Mode::Beat))
        );
        assert_eq!(command_for_key(&press(KeyCode::Char('0'))), None);
    }

    #[test]
    fn letters_pick_curves_and_schemes() {
        assert_eq!(
            command_for_key(&press(KeyCode::Char('d'))),
            Some(Command::SetCurve(AmplitudeCurve::Db))
        );
        assert_eq!(
            command_for_key(&press(KeyCode::Char('S'))),
            Some(Command::SetCurve(AmplitudeCurve::Sqrt))
        );
        assert_eq!(
            command_for_key(&press(KeyCode::Char('c'))),
            Some(Command::CycleScheme)
        );
        assert_eq!(command_for_key(&press(KeyCode::Char('x'))), None);
    }

    #[test]
    fn quit_keys() {
        assert_eq!(command_for_key(&press(KeyCode::Char('q'))), Some(Command::Quit));
        assert_eq!(command_for_key(&press(KeyCode::Esc)), Some(Command::Quit));
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(command_for_key(&ctrl_c), Some(Command::Quit));
    }

    #[test]
    fn key_release_is_ignored() {
        let mut key = press(KeyCode::Char('q'));
        key.kind = KeyEventKind::Release;
        assert_eq!(command_for_key(&key), None);
    }
}
