//! Keyboard control thread
//!
//! Owns the terminal while streaming: raw, non-canonical single-character
//! input polled at a bounded interval so shutdown is observed within
//! ~100ms. The previous terminal mode is restored on every exit path by
//! the guard's `Drop`. Cancellation is cooperative only: the loop exits
//! after observing `running == false`, never by interruption.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

use crate::constants::KEY_POLL_INTERVAL;
use crate::control::ControlState;

/// Restores the previous terminal mode when dropped
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!("failed to restore terminal mode: {}", e);
        }
    }
}

/// Control transitions a keystroke can request
#[derive(Debug, PartialEq, Eq)]
enum KeyCommand {
    ToggleRecording,
    Quit,
}

/// Map one key event to a command; everything unrecognized is ignored.
///
/// In raw mode the terminal no longer turns ^C into a signal, so the ^C
/// key event maps to the same shutdown request as `q`.
fn decode(key: &KeyEvent) -> Option<KeyCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') | KeyCode::Char('C')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(KeyCommand::Quit)
        }
        KeyCode::Char('s') | KeyCode::Char('S') => Some(KeyCommand::ToggleRecording),
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(KeyCommand::Quit),
        _ => None,
    }
}

/// Handle to the keyboard listener thread
pub struct KeyListener {
    handle: Option<JoinHandle<()>>,
}

impl KeyListener {
    /// Spawn the listener thread
    pub fn spawn(state: Arc<ControlState>) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name("key-listener".to_string())
            .spawn(move || listen(state))?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for the listener to observe shutdown and exit
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("key listener thread panicked");
            }
        }
    }
}

fn listen(state: Arc<ControlState>) {
    let _raw = match RawModeGuard::enable() {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::warn!("raw terminal mode unavailable: {}", e);
            None
        }
    };

    while state.is_running() {
        match event::poll(KEY_POLL_INTERVAL) {
            // No input within the interval is not an error
            Ok(false) => {}
            Ok(true) => {
                let key = match event::read() {
                    Ok(Event::Key(key)) => key,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!("keyboard read failed: {}", e);
                        continue;
                    }
                };

                match decode(&key) {
                    Some(KeyCommand::ToggleRecording) => match state.toggle_recording() {
                        Ok(true) => {
                            tracing::info!(
                                file = %state.record_path().display(),
                                "recording started"
                            );
                        }
                        Ok(false) => tracing::info!("recording stopped"),
                        Err(e) => tracing::warn!("{}", e),
                    },
                    Some(KeyCommand::Quit) => {
                        tracing::info!("quit requested");
                        state.request_shutdown();
                        break;
                    }
                    None => {}
                }
            }
            Err(e) => {
                tracing::warn!("keyboard poll failed: {}", e);
                thread::sleep(KEY_POLL_INTERVAL);
            }
        }
    }
}
