//! Guest address space - 64 KiB RAM with read-only ROM overlays.
//!
//! The language ROM (16 KiB at 0xB800) and the OS ROM (256 bytes at
//! 0xFF00) are separate buffers layered over RAM. Reads inside a loaded
//! overlay come from the overlay; writes always go to RAM, so a write
//! "through" a ROM window is legal but invisible until the overlay is
//! removed. This matches the original hardware, where the paged ROM
//! shadows the RAM underneath it.

use mos6502::memory::Bus;

use crate::error::{MosError, MosResult};
use crate::mos::addr;

/// Size of the flat guest address space.
pub const RAM_SIZE: usize = 0x10000;

/// Guest address space with optional ROM overlays.
pub struct AddressSpace {
    ram: Box<[u8]>,
    lang_rom: Option<Vec<u8>>,
    os_rom: Option<Vec<u8>>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    pub fn new() -> Self {
        Self {
            ram: vec![0u8; RAM_SIZE].into_boxed_slice(),
            lang_rom: None,
            os_rom: None,
        }
    }

    /// Install the language ROM image (must be exactly 16 KiB).
    pub fn load_lang_rom(&mut self, data: &[u8]) -> MosResult<()> {
        if data.len() != addr::LANG_ROM_SIZE {
            return Err(MosError::RomSize {
                expected: addr::LANG_ROM_SIZE,
                actual: data.len(),
            });
        }
        self.lang_rom = Some(data.to_vec());
        Ok(())
    }

    /// Install the OS ROM image (must be exactly 256 bytes).
    pub fn load_os_rom(&mut self, data: &[u8]) -> MosResult<()> {
        if data.len() != addr::OS_ROM_SIZE {
            return Err(MosError::RomSize {
                expected: addr::OS_ROM_SIZE,
                actual: data.len(),
            });
        }
        self.os_rom = Some(data.to_vec());
        Ok(())
    }

    /// Read a byte through the overlays.
    pub fn read(&self, a: u16) -> u8 {
        let a = a as usize;
        if let Some(rom) = &self.lang_rom {
            if (addr::LANG_ROM_BASE as usize..addr::LANG_ROM_BASE as usize + addr::LANG_ROM_SIZE)
                .contains(&a)
            {
                return rom[a - addr::LANG_ROM_BASE as usize];
            }
        }
        if let Some(rom) = &self.os_rom {
            if a >= addr::OS_ROM_BASE as usize {
                return rom[a - addr::OS_ROM_BASE as usize];
            }
        }
        self.ram[a]
    }

    /// Write a byte. Writes always land in RAM, even under a ROM window.
    pub fn write(&mut self, a: u16, v: u8) {
        self.ram[a as usize] = v;
    }

    /// Read a 16-bit little-endian value.
    pub fn read_u16(&self, a: u16) -> u16 {
        u16::from_le_bytes([self.read(a), self.read(a.wrapping_add(1))])
    }

    /// Read a 32-bit little-endian value.
    pub fn read_u32(&self, a: u16) -> u32 {
        u32::from_le_bytes([
            self.read(a),
            self.read(a.wrapping_add(1)),
            self.read(a.wrapping_add(2)),
            self.read(a.wrapping_add(3)),
        ])
    }

    /// Write a 32-bit little-endian value.
    pub fn write_u32(&mut self, a: u16, v: u32) {
        for (i, b) in v.to_le_bytes().iter().enumerate() {
            self.write(a.wrapping_add(i as u16), *b);
        }
    }

    /// Read a carriage-return-terminated guest string. The scan stops
    /// after one full wrap of the address space if no terminator
    /// exists.
    pub fn read_cr_string(&self, a: u16) -> String {
        let mut s = String::new();
        for i in 0..RAM_SIZE {
            let b = self.read(a.wrapping_add(i as u16));
            if b == 0x0D {
                break;
            }
            s.push(b as char);
        }
        s
    }

    /// Raw RAM, bypassing the overlays. Block save reads this directly,
    /// matching the original's behaviour of saving the bytes underneath
    /// a ROM window rather than the ROM itself.
    pub fn ram(&self) -> &[u8] {
        &self.ram[..]
    }

    /// Raw mutable RAM. Block load writes here, which is the same thing
    /// the overlay write rule produces.
    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram[..]
    }
}

impl Bus for AddressSpace {
    fn get_byte(&mut self, address: u16) -> u8 {
        self.read(address)
    }

    fn set_byte(&mut self, address: u16, value: u8) {
        self.write(address, value);
    }
}
