//! OSFILE parameter block.
//!
//! The guest hands OSFILE the address of an 18-byte block:
//! - Bytes 0-1: pointer to a CR-terminated filename
//! - Bytes 2-5: load address
//! - Bytes 6-9: execution address
//! - Bytes 10-13: start (save) address
//! - Bytes 14-17: end address
//!
//! The address fields are stored as 32-bit words for compatibility with
//! second processors, but on this machine only the low 16 bits mean
//! anything.

use crate::memory::AddressSpace;

/// Decoded OSFILE parameter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub filename: String,
    pub load: u16,
    pub exec: u16,
    pub save: u16,
    pub end: u16,
}

impl FileBlock {
    /// Decode the block at `ptr`, resolving the filename pointer.
    pub fn read(mem: &AddressSpace, ptr: u16) -> Self {
        let fname_ptr = mem.read_u16(ptr);
        Self {
            filename: mem.read_cr_string(fname_ptr),
            load: mem.read_u16(ptr.wrapping_add(2)),
            exec: mem.read_u16(ptr.wrapping_add(6)),
            save: mem.read_u16(ptr.wrapping_add(10)),
            end: mem.read_u16(ptr.wrapping_add(14)),
        }
    }

    /// Address a load should target: exec if nonzero, else load.
    pub fn load_target(&self) -> u16 {
        if self.exec != 0 {
            self.exec
        } else {
            self.load
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(mem: &mut AddressSpace, ptr: u16, name: &str, fields: [u32; 4]) {
        let fname_ptr = 0x0A00u16;
        for (i, b) in name.bytes().chain(std::iter::once(0x0D)).enumerate() {
            mem.write(fname_ptr + i as u16, b);
        }
        mem.write(ptr, (fname_ptr & 0xFF) as u8);
        mem.write(ptr + 1, (fname_ptr >> 8) as u8);
        for (i, f) in fields.iter().enumerate() {
            mem.write_u32(ptr + 2 + 4 * i as u16, *f);
        }
    }

    #[test]
    fn test_read_block() {
        let mut mem = AddressSpace::new();
        block(&mut mem, 0x0900, "DATA", [0x1900, 0x0000, 0x2000, 0x2100]);

        let pb = FileBlock::read(&mem, 0x0900);
        assert_eq!(pb.filename, "DATA");
        assert_eq!(pb.load, 0x1900);
        assert_eq!(pb.exec, 0x0000);
        assert_eq!(pb.save, 0x2000);
        assert_eq!(pb.end, 0x2100);
    }

    #[test]
    fn test_wide_fields_truncate_to_16_bits() {
        let mut mem = AddressSpace::new();
        block(&mut mem, 0x0900, "D", [0xFFFF_1900, 0, 0, 0]);
        assert_eq!(FileBlock::read(&mem, 0x0900).load, 0x1900);
    }

    #[test]
    fn test_load_target() {
        let mut mem = AddressSpace::new();
        block(&mut mem, 0x0900, "D", [0x1900, 0x3000, 0, 0]);
        assert_eq!(FileBlock::read(&mem, 0x0900).load_target(), 0x3000);

        block(&mut mem, 0x0900, "D", [0x1900, 0x0000, 0, 0]);
        assert_eq!(FileBlock::read(&mem, 0x0900).load_target(), 0x1900);
    }
}
