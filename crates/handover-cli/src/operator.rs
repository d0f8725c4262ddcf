use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, BufRead, IsTerminal, Write};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWait {
    Pressed(char),
    Interrupted,
    TimedOut,
}

/// The person at the desk: reads answers, sees messages.
pub trait Operator {
    fn say(&mut self, message: &str);

    /// Shows `prompt` and reads one line. `None` means input is closed.
    fn ask(&mut self, prompt: &str) -> Option<String>;

    /// Waits up to `window` for a single keystroke.
    fn wait_for_key(&mut self, window: Duration) -> KeyWait;

    fn copy_to_clipboard(&mut self, text: &str);
}

#[derive(Default)]
pub struct TerminalOperator {
    #[cfg(feature = "clipboard")]
    clipboard: Option<arboard::Clipboard>,
}

impl Operator for TerminalOperator {
    fn say(&mut self, message: &str) {
        println!("{message}");
    }

    fn ask(&mut self, prompt: &str) -> Option<String> {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(prompt.as_bytes());
        let _ = stdout.flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(err) => {
                warn!(event = "stdin_read_failed", error = %err);
                None
            }
        }
    }

    fn wait_for_key(&mut self, window: Duration) -> KeyWait {
        if !io::stdin().is_terminal() {
            std::thread::sleep(window);
            return KeyWait::TimedOut;
        }
        match read_single_key(window) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(event = "key_wait_failed", error = %err);
                KeyWait::TimedOut
            }
        }
    }

    #[cfg(feature = "clipboard")]
    fn copy_to_clipboard(&mut self, text: &str) {
        if self.clipboard.is_none() {
            match arboard::Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(err) => {
                    debug!(event = "clipboard_unavailable", error = %err);
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            if let Err(err) = clipboard.set_text(text.to_string()) {
                debug!(event = "clipboard_copy_failed", error = %err);
            }
        }
    }

    #[cfg(not(feature = "clipboard"))]
    fn copy_to_clipboard(&mut self, text: &str) {
        debug!(event = "clipboard_disabled", text = %text);
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Leaves raw mode if a key wait on another thread still holds it. Safe to
/// call when raw mode is off.
pub fn restore_terminal() {
    if let Err(err) = disable_raw_mode() {
        debug!(event = "raw_mode_restore_failed", error = %err);
    }
}

fn read_single_key(window: Duration) -> io::Result<KeyWait> {
    let _raw = RawModeGuard::enable()?;
    let deadline = Instant::now() + window;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || !event::poll(remaining)? {
            return Ok(KeyWait::TimedOut);
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(KeyWait::Interrupted);
            }
            KeyCode::Char(ch) => return Ok(KeyWait::Pressed(ch)),
            _ => continue,
        }
    }
}
