//! Acorn MOS service-call emulator core.
//!
//! Runs 6502 machine code (typically the BBC BASIC language ROM) and
//! services the operating system entry points at the top of memory by
//! trapping a reserved opcode and performing the call against host
//! state. There is no video, sound, or interrupt hardware here; the
//! machine operating system surface is re-expressed as host console,
//! file, and clock operations.
//!
//! The crate is organised as:
//! - `memory`: the 64 KiB address space with ROM overlay windows
//! - `mos`: the OS entry points, guest constants, and parameter blocks
//! - `emulator`: the run loop and the service routines themselves
//! - `console`: byte-level console abstraction plus a headless test one
//! - `files`: the fixed table of guest file handles
//! - `clock`: the centisecond TIME counter
//! - `command`: the star command parser behind OSCLI

pub mod clock;
pub mod command;
pub mod console;
pub mod emulator;
pub mod error;
pub mod files;
pub mod memory;
pub mod mos;

pub use clock::CentiClock;
pub use command::{CommandError, StarCommand};
pub use console::{HeadlessConsole, MosConsole};
pub use emulator::MosEmulator;
pub use error::{MosError, MosResult};
pub use files::{AccessMode, FileTable};
pub use memory::AddressSpace;
pub use mos::{addr, OsVector, TRAP};

/// How an emulation run ended: the guest executed *QUIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Program counter at the quit request (the OSCLI entry point).
    pub pc: u16,
}
