//! MOS (Machine Operating System) call interface.
//!
//! BBC BASIC talks to the operating system by JSRing into a fixed table
//! of entry points at the top of memory. Each entry in the emulated OS
//! ROM is a two-byte stub: the reserved trap opcode followed by an RTS.
//! The dispatcher recognises the trap, performs the service on the host,
//! and steps the program counter onto the RTS.

pub mod pblock;

pub use pblock::FileBlock;

/// Reserved trap opcode (the 6502 KIL instruction).
pub const TRAP: u8 = 0x02;

/// The cancel key. Any input routine that sees it raises the escape
/// condition.
pub const ESCAPE_KEY: u8 = 0x1B;

/// Value stored in the escape flag byte when the condition is raised.
pub const ESCAPE_SET: u8 = 0xFF;

/// MOS entry points and guest memory map.
pub mod addr {
    /// OSFIND - open or close a file
    pub const OSFIND: u16 = 0xFFCE;
    /// OSBPUT - write a byte to an open file
    pub const OSBPUT: u16 = 0xFFD4;
    /// OSBGET - read a byte from an open file
    pub const OSBGET: u16 = 0xFFD7;
    /// OSARGS - file pointer/extent operations
    pub const OSARGS: u16 = 0xFFDA;
    /// OSFILE - whole-file save and load
    pub const OSFILE: u16 = 0xFFDD;
    /// OSRDCH - read a character from the keyboard
    pub const OSRDCH: u16 = 0xFFE0;
    /// OSASCI - write a character, CR mapped to newline
    pub const OSASCI: u16 = 0xFFE3;
    /// OSNEWL - write a line terminator
    pub const OSNEWL: u16 = 0xFFE7;
    /// OSWRCH - write a character
    pub const OSWRCH: u16 = 0xFFEE;
    /// OSWORD - block-parameterised operations (line input, clock, ...)
    pub const OSWORD: u16 = 0xFFF1;
    /// OSBYTE - register-parameterised status/config queries
    pub const OSBYTE: u16 = 0xFFF4;
    /// OSCLI - pass a command line to the OS
    pub const OSCLI: u16 = 0xFFF7;

    /// 6502 reset vector.
    pub const RESET_VECTOR: u16 = 0xFFFC;

    /// Escape condition flag, visible to the guest in zero page.
    pub const ESCFLG: u16 = 0x00FF;

    /// Bottom of BASIC workspace.
    pub const LOMEM: u16 = 0x0800;
    /// Top of usable RAM (bottom of the language ROM).
    pub const HIMEM: u16 = 0xB800;

    /// Language ROM window.
    pub const LANG_ROM_BASE: u16 = 0xB800;
    pub const LANG_ROM_SIZE: usize = 0x4000;

    /// OS ROM window (entry stubs and vectors).
    pub const OS_ROM_BASE: u16 = 0xFF00;
    pub const OS_ROM_SIZE: usize = 0x100;
}

/// A MOS service routine, identified by its entry address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsVector {
    /// OSFIND: open/close file
    FindFile,
    /// OSBPUT: write byte to file
    PutByte,
    /// OSBGET: read byte from file
    GetByte,
    /// OSARGS: file position/extent
    FileArgs,
    /// OSFILE: whole-file transfer via parameter block
    FileBlock,
    /// OSRDCH: read character
    ReadChar,
    /// OSASCI: write character with CR mapping
    WriteAscii,
    /// OSNEWL: new line
    NewLine,
    /// OSWRCH: write character
    WriteChar,
    /// OSWORD: word-structured operation
    WordOp,
    /// OSBYTE: byte-structured operation
    ByteOp,
    /// OSCLI: command line
    CommandLine,
}

impl OsVector {
    /// Every entry point, in address order.
    pub const ENTRIES: [(u16, OsVector); 12] = [
        (addr::OSFIND, OsVector::FindFile),
        (addr::OSBPUT, OsVector::PutByte),
        (addr::OSBGET, OsVector::GetByte),
        (addr::OSARGS, OsVector::FileArgs),
        (addr::OSFILE, OsVector::FileBlock),
        (addr::OSRDCH, OsVector::ReadChar),
        (addr::OSASCI, OsVector::WriteAscii),
        (addr::OSNEWL, OsVector::NewLine),
        (addr::OSWRCH, OsVector::WriteChar),
        (addr::OSWORD, OsVector::WordOp),
        (addr::OSBYTE, OsVector::ByteOp),
        (addr::OSCLI, OsVector::CommandLine),
    ];

    /// Entry address of this routine.
    pub fn entry(self) -> u16 {
        Self::ENTRIES
            .iter()
            .find(|(_, v)| *v == self)
            .map(|(a, _)| *a)
            .unwrap_or(0)
    }
}

impl TryFrom<u16> for OsVector {
    type Error = u16;

    fn try_from(pc: u16) -> Result<Self, Self::Error> {
        Self::ENTRIES
            .iter()
            .find(|(a, _)| *a == pc)
            .map(|(_, v)| *v)
            .ok_or(pc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_lookup() {
        assert_eq!(OsVector::try_from(0xFFEE), Ok(OsVector::WriteChar));
        assert_eq!(OsVector::try_from(0xFFF7), Ok(OsVector::CommandLine));
        assert_eq!(OsVector::try_from(0xFFCE), Ok(OsVector::FindFile));
    }

    #[test]
    fn test_unknown_address() {
        assert_eq!(OsVector::try_from(0xFFEF), Err(0xFFEF));
        assert_eq!(OsVector::try_from(0x1234), Err(0x1234));
    }

    #[test]
    fn test_entry_round_trip() {
        for (a, v) in OsVector::ENTRIES {
            assert_eq!(v.entry(), a);
            assert_eq!(OsVector::try_from(a), Ok(v));
        }
    }
}
