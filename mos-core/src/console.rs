//! Console I/O abstraction for the MOS emulator.
//!
//! The `MosConsole` trait carries raw bytes between the service
//! routines and the host terminal. Control-code interpretation (DEL for
//! backspace, the clear/home sequence for form feed) happens in the
//! service routines, so the console is a dumb byte pipe that works
//! identically for testing (`HeadlessConsole`) and real terminals.
//!
//! Implementations that switch the host terminal into immediate mode
//! must scope the switch inside each call and restore the previous mode
//! on every return path.

use std::collections::VecDeque;

/// Console interface for MOS character and line I/O.
pub trait MosConsole: Send {
    /// Write a byte to console output. Output must be visible
    /// immediately; the guest expects synchronous echo.
    fn write(&mut self, ch: u8);

    /// Read a whole line from the host line editor, without its
    /// terminator. `None` means a transient read failure; the caller
    /// retries.
    fn read_line(&mut self) -> Option<String>;

    /// Get next key. Returns None if no key available.
    fn get_key(&mut self) -> Option<u8>;

    /// Wait for a key (blocking). Default implementation polls.
    fn wait_for_key(&mut self) -> u8 {
        loop {
            if let Some(key) = self.get_key() {
                return key;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}

/// Headless console for testing - captures output, provides queued
/// keys and lines.
#[derive(Default)]
pub struct HeadlessConsole {
    output: Vec<u8>,
    keys: VecDeque<u8>,
    lines: VecDeque<String>,
}

impl HeadlessConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-queued key input.
    pub fn with_keys(keys: &[u8]) -> Self {
        Self {
            keys: keys.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Queue key input.
    pub fn queue_keys(&mut self, keys: &[u8]) {
        self.keys.extend(keys.iter().copied());
    }

    /// Queue a line for `read_line`.
    pub fn queue_line(&mut self, line: &str) {
        self.lines.push_back(line.to_string());
    }

    /// Get all output as bytes.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Get output as string (lossy UTF-8 conversion).
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Clear output buffer.
    pub fn clear_output(&mut self) {
        self.output.clear();
    }
}

impl MosConsole for HeadlessConsole {
    fn write(&mut self, ch: u8) {
        self.output.push(ch);
    }

    fn read_line(&mut self) -> Option<String> {
        // An exhausted queue yields empty lines so a test can never hang
        // inside the line-input service.
        Some(self.lines.pop_front().unwrap_or_default())
    }

    fn get_key(&mut self) -> Option<u8> {
        self.keys.pop_front()
    }

    fn wait_for_key(&mut self) -> u8 {
        self.keys.pop_front().unwrap_or(0)
    }
}
