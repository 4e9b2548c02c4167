//! Error types for the MOS emulator.

use thiserror::Error;

/// Errors that can occur during MOS emulation.
///
/// These are the fatal tier: a guest program reaching unimplemented
/// functionality, a bad ROM image, or a host I/O failure outside any
/// service routine. Guest-recoverable conditions (bad file handles,
/// command syntax) are reported to the console instead and never
/// surface here.
#[derive(Error, Debug)]
pub enum MosError {
    #[error("unhandled trap at {pc:#06X}")]
    UnhandledTrap { pc: u16 },

    #[error("illegal instruction {opcode:#04X} at {pc:#06X}")]
    IllegalInstruction { pc: u16, opcode: u8 },

    #[error("unhandled OSBYTE A={a:#04X}, X={x:#04X}, Y={y:#04X}")]
    UnhandledOsByte { a: u8, x: u8, y: u8 },

    #[error("unhandled OSWORD A={a:#04X}")]
    UnhandledOsWord { a: u8 },

    #[error("unhandled OSFILE A={a:#04X}")]
    UnhandledOsFile { a: u8 },

    #[error("ROM image is {actual} bytes, expected {expected}")]
    RomSize { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for MOS operations.
pub type MosResult<T> = Result<T, MosError>;
