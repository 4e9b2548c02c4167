//! MOS CLI - Run BBC Micro language ROMs from the command line.
//!
//! Usage:
//!   beeb basic.rom                   # Run BASIC with emulated OS entries
//!   beeb basic.rom --os top.rom      # Use a real OS ROM image
//!   beeb basic.rom --start B800      # Override the start address
//!   beeb basic.rom --trace           # Trace OS calls on stderr

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};

use mos_core::{MosConsole, MosEmulator};

/// BBC Micro MOS emulator CLI
#[derive(Parser, Debug)]
#[command(name = "beeb")]
#[command(about = "Run BBC Micro language ROMs")]
struct Args {
    /// Language ROM image (16 KiB, mapped at 0xB800)
    rom: PathBuf,

    /// OS ROM image (256 bytes, mapped at 0xFF00). Without one the
    /// entry point stubs are synthesised.
    #[arg(short, long)]
    os: Option<PathBuf>,

    /// Start address in hex (default: the reset vector)
    #[arg(short, long)]
    start: Option<String>,

    /// Enable OS call tracing
    #[arg(short, long)]
    trace: bool,
}

/// Put the terminal in raw mode for the lifetime of the guard. Restores
/// cooked mode on every return path, including panics.
struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    fn new() -> Self {
        Self {
            enabled: enable_raw_mode().is_ok(),
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            let _ = disable_raw_mode();
        }
    }
}

/// Console backed by the host terminal. Line input uses the cooked-mode
/// line editor; single-key input switches to raw mode one call at a
/// time so the terminal is always sane when the process exits.
struct TermConsole;

impl MosConsole for TermConsole {
    fn write(&mut self, ch: u8) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();

        match ch {
            0x7F => {
                // Rubout: erase the character under the cursor
                let _ = handle.write_all(b"\x08 \x08");
            }
            _ => {
                let _ = handle.write_all(&[ch]);
            }
        }
        let _ = handle.flush();
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) => {
                // Input is exhausted for good; end the session
                std::process::exit(0);
            }
            Ok(_) => {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Some(line)
            }
            Err(_) => None,
        }
    }

    fn get_key(&mut self) -> Option<u8> {
        let _raw = RawModeGuard::new();
        if event::poll(Duration::from_millis(0)).unwrap_or(false) {
            if let Ok(Event::Key(key_event)) = event::read() {
                return translate_key(key_event.code, key_event.modifiers);
            }
        }
        None
    }

    fn wait_for_key(&mut self) -> u8 {
        let _raw = RawModeGuard::new();
        loop {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(Event::Key(key_event)) = event::read() {
                    if let Some(ch) = translate_key(key_event.code, key_event.modifiers) {
                        return ch;
                    }
                }
            }
        }
    }
}

/// Translate crossterm key events to guest key codes.
fn translate_key(code: KeyCode, modifiers: KeyModifiers) -> Option<u8> {
    // Handle control characters
    if modifiers.contains(KeyModifiers::CONTROL) {
        if let KeyCode::Char(c) = code {
            let upper = c.to_ascii_uppercase();
            if upper.is_ascii_uppercase() {
                return Some(upper as u8 - 64); // Ctrl+A=1, Ctrl+C=3, etc.
            }
        }
    }

    match code {
        KeyCode::Char(c) => Some(c as u8),
        KeyCode::Enter => Some(13),
        KeyCode::Backspace => Some(127),
        KeyCode::Tab => Some(9),
        KeyCode::Esc => Some(27),
        _ => None,
    }
}

/// Parse a hex address, tolerating `0x` and BBC-style `&` prefixes.
fn parse_address(s: &str) -> Result<u16, String> {
    let digits = s
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .trim_start_matches('&');
    u16::from_str_radix(digits, 16).map_err(|_| format!("Invalid start address: {}", s))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut emu = MosEmulator::new(TermConsole);
    emu.trace = args.trace;

    let rom = std::fs::read(&args.rom)?;
    emu.load_lang_rom(&rom)?;

    match &args.os {
        Some(path) => {
            let rom = std::fs::read(path)?;
            emu.load_os_rom(&rom)?;
        }
        None => emu.install_traps(),
    }

    let result = match &args.start {
        Some(s) => emu.run_from(parse_address(s)?),
        None => emu.run(),
    };

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            eprintln!("\nError: {}", e);
            Err(e.into())
        }
    }
}
