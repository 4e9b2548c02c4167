//! MOS emulator - integrates the 6502 CPU with OS call handling.
//!
//! The guest reaches the operating system by branching into fixed entry
//! points at the top of memory. Each entry holds the reserved trap
//! opcode; the run loop recognises it before execution, performs the
//! service against host state, and steps the program counter onto the
//! RTS that follows the trap byte.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::process::Command;
use std::time::Duration;

use mos6502::cpu::CPU;
use mos6502::instruction::Nmos6502;
use mos6502::registers::{StackPointer, Status};
use mos6502::Variant;

use crate::clock::CentiClock;
use crate::command::{self, StarCommand};
use crate::console::MosConsole;
use crate::error::{MosError, MosResult};
use crate::files::{AccessMode, FileTable};
use crate::memory::AddressSpace;
use crate::mos::{addr, FileBlock, OsVector, ESCAPE_KEY, ESCAPE_SET, TRAP};
use crate::ExitInfo;

/// VT100 clear screen + cursor home, emitted for form feed.
const CLEAR_SCREEN: &[u8] = b"\x1b[2J";
const CURSOR_HOME: &[u8] = b"\x1b[H";

/// MOS emulator state.
pub struct MosEmulator<C: MosConsole> {
    /// 6502 CPU; it owns the guest address space as its bus.
    cpu: CPU<AddressSpace, Nmos6502>,
    /// Console for character and line I/O.
    console: C,
    /// Guest file handles.
    files: FileTable,
    /// Centisecond clock (TIME).
    clock: CentiClock,
    /// Enable service-call tracing.
    pub trace: bool,
}

impl<C: MosConsole> MosEmulator<C> {
    /// Create a new emulator with the given console.
    pub fn new(console: C) -> Self {
        Self {
            cpu: CPU::new(AddressSpace::new(), Nmos6502),
            console,
            files: FileTable::new(),
            clock: CentiClock::new(),
            trace: false,
        }
    }

    /// Get a reference to the guest address space.
    pub fn memory(&self) -> &AddressSpace {
        &self.cpu.memory
    }

    /// Get a mutable reference to the guest address space.
    pub fn memory_mut(&mut self) -> &mut AddressSpace {
        &mut self.cpu.memory
    }

    /// Get console reference.
    pub fn console(&self) -> &C {
        &self.console
    }

    /// Get mutable console reference.
    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    /// Install the language ROM image into its overlay window.
    pub fn load_lang_rom(&mut self, data: &[u8]) -> MosResult<()> {
        self.cpu.memory.load_lang_rom(data)
    }

    /// Install the OS ROM image into its overlay window.
    pub fn load_os_rom(&mut self, data: &[u8]) -> MosResult<()> {
        self.cpu.memory.load_os_rom(data)
    }

    /// Load binary data into RAM at a specific address.
    pub fn load_at(&mut self, address: u16, data: &[u8]) {
        let start = address as usize;
        let ram = self.cpu.memory.ram_mut();
        let end = (start + data.len()).min(ram.len());
        ram[start..end].copy_from_slice(&data[..end - start]);
    }

    /// Stamp the two-byte call stub (trap + RTS) at every entry point
    /// and point the reset vector at the language ROM base. A real OS
    /// ROM image carries its own stubs and vectors; this is for running
    /// without one.
    pub fn install_traps(&mut self) {
        for (entry, _) in OsVector::ENTRIES {
            self.load_at(entry, &[TRAP, 0x60]);
        }
        self.load_at(addr::RESET_VECTOR, &addr::LANG_ROM_BASE.to_le_bytes());
    }

    // ==================== Register Bridge ====================

    /// Accumulator.
    pub fn a(&self) -> u8 {
        self.cpu.registers.accumulator
    }

    /// X index register.
    pub fn x(&self) -> u8 {
        self.cpu.registers.index_x
    }

    /// Y index register.
    pub fn y(&self) -> u8 {
        self.cpu.registers.index_y
    }

    /// Carry flag.
    pub fn carry(&self) -> bool {
        self.cpu.registers.status.contains(Status::PS_CARRY)
    }

    fn set_a(&mut self, v: u8) {
        self.cpu.registers.accumulator = v;
    }

    fn set_x(&mut self, v: u8) {
        self.cpu.registers.index_x = v;
    }

    fn set_y(&mut self, v: u8) {
        self.cpu.registers.index_y = v;
    }

    fn set_carry(&mut self) {
        self.cpu.registers.status.insert(Status::PS_CARRY);
    }

    fn clear_carry(&mut self) {
        self.cpu.registers.status.remove(Status::PS_CARRY);
    }

    /// Parameter block address formed from the index registers.
    fn param_ptr(&self) -> u16 {
        self.x() as u16 | ((self.y() as u16) << 8)
    }

    // ==================== Run Loop ====================

    /// Run from the reset vector until the guest quits.
    pub fn run(&mut self) -> MosResult<ExitInfo> {
        let start = self.cpu.memory.read_u16(addr::RESET_VECTOR);
        self.run_from(start)
    }

    /// Run from the given address until the guest quits.
    pub fn run_from(&mut self, start_address: u16) -> MosResult<ExitInfo> {
        self.cpu.registers.program_counter = start_address;
        self.cpu.registers.stack_pointer = StackPointer(0xFD);

        loop {
            let pc = self.cpu.registers.program_counter;
            let opcode = self.cpu.memory.read(pc);

            // Check for a trap BEFORE executing
            if opcode == TRAP {
                let vector =
                    OsVector::try_from(pc).map_err(|pc| MosError::UnhandledTrap { pc })?;

                if self.trace {
                    eprintln!(
                        "[MOS] {:?} (A={:#04X}, X={:#04X}, Y={:#04X})",
                        vector,
                        self.a(),
                        self.x(),
                        self.y()
                    );
                }

                if let Some(info) = self.dispatch(vector)? {
                    return Ok(info);
                }

                // Step over the trap byte; the stub's RTS takes the CPU
                // back to the caller.
                self.cpu.registers.program_counter = pc.wrapping_add(1);
                continue;
            }

            if Nmos6502::decode(opcode).is_none() {
                return Err(MosError::IllegalInstruction { pc, opcode });
            }

            self.cpu.single_step();
        }
    }

    /// Dispatch one service routine. Returns Some(info) when the guest
    /// asked to quit.
    fn dispatch(&mut self, vector: OsVector) -> MosResult<Option<ExitInfo>> {
        match vector {
            OsVector::FindFile => self.osfind(),
            OsVector::PutByte => self.osbput(),
            OsVector::GetByte => self.osbget(),
            OsVector::FileArgs => self.osargs(),
            OsVector::FileBlock => self.osfile()?,
            OsVector::ReadChar => self.osrdch(),
            OsVector::WriteAscii => self.osasci(),
            OsVector::NewLine => self.osnewl(),
            OsVector::WriteChar => self.oswrch(),
            OsVector::WordOp => self.osword()?,
            OsVector::ByteOp => self.osbyte()?,
            OsVector::CommandLine => return self.oscli(),
        }
        Ok(None)
    }

    // ==================== Console Services ====================

    /// Report a guest-visible message on its own line.
    fn report(&mut self, msg: &str) {
        for b in msg.bytes() {
            self.console.write(b);
        }
        self.console.write(b'\n');
    }

    fn clear_screen(&mut self) {
        for b in CLEAR_SCREEN.iter().chain(CURSOR_HOME) {
            self.console.write(*b);
        }
    }

    /// Raise the escape condition. Sticky until acknowledged.
    fn raise_escape(&mut self) {
        self.cpu.memory.write(addr::ESCFLG, ESCAPE_SET);
    }

    /// OSWRCH: write the character in A, interpreting control codes.
    fn oswrch(&mut self) {
        let a = self.a();
        match a {
            0x08 => self.console.write(0x7F),
            0x0C => self.clear_screen(),
            0x09 | 0x0A | 0x0D | 0x20..=0x7E => self.console.write(a),
            _ => {} // silently dropped
        }
    }

    /// OSASCI: write A with carriage return mapped to a new line.
    fn osasci(&mut self) {
        match self.a() {
            0x0D => self.osnewl(),
            0x0C => self.clear_screen(),
            _ => self.oswrch(),
        }
    }

    /// OSNEWL: emit a line terminator.
    fn osnewl(&mut self) {
        self.console.write(b'\n');
    }

    /// OSRDCH: blocking read of one key into A, masked to 7 bits.
    fn osrdch(&mut self) {
        let key = self.console.wait_for_key() & 0x7F;
        self.set_a(key);
        if key == ESCAPE_KEY {
            self.raise_escape();
            self.set_carry();
        } else {
            self.clear_carry();
        }
    }

    // ==================== OSWORD ====================

    fn osword(&mut self) -> MosResult<()> {
        let a = self.a();
        let ptr = self.param_ptr();
        match a {
            0x00 => self.osword_read_line(ptr),
            0x01 => {
                // Read system clock in centiseconds, 5 bytes LE
                let v = self.clock.read();
                for i in 0..5u16 {
                    self.cpu.memory.write(ptr.wrapping_add(i), (v >> (8 * i)) as u8);
                }
            }
            0x02 => {
                // Write system clock in centiseconds
                let mut v = 0u64;
                for i in 0..5u16 {
                    v |= (self.cpu.memory.read(ptr.wrapping_add(i)) as u64) << (8 * i);
                }
                self.clock.write(v);
            }
            0x07 | 0x08 => {} // SOUND / ENVELOPE, stubbed
            0x09 => {
                // Read pixel: everything is off screen
                self.cpu.memory.write(ptr.wrapping_add(4), 0xFF);
            }
            a => return Err(MosError::UnhandledOsWord { a }),
        }
        Ok(())
    }

    /// OSWORD 0: read a line into guest memory through the host line
    /// editor. The parameter block carries the buffer address, maximum
    /// length, and the inclusive byte range of acceptable characters.
    fn osword_read_line(&mut self, ptr: u16) {
        let buf = self.cpu.memory.read_u16(ptr);
        let max_len = self.cpu.memory.read(ptr.wrapping_add(2)) as usize;
        let min = self.cpu.memory.read(ptr.wrapping_add(3));
        let max = self.cpu.memory.read(ptr.wrapping_add(4));

        // None is a transient end-of-input (ctrl-D); keep asking.
        let line = loop {
            if let Some(line) = self.console.read_line() {
                break line;
            }
        };
        if line.is_empty() {
            self.console.write(b'\n');
        }

        let mut count: usize = 0;
        for ch in line.bytes() {
            if ch < min || ch > max {
                continue;
            }
            if ch == ESCAPE_KEY {
                self.raise_escape();
                self.set_y(count as u8);
                self.set_carry();
                return;
            }
            self.cpu.memory.write(buf.wrapping_add(count as u16), ch);
            count += 1;
            if count == max_len {
                // The limit overwrites the final character with the
                // terminator and the count stays at the limit.
                self.cpu.memory.write(buf.wrapping_add(count as u16 - 1), 0x0D);
                self.set_y(count as u8);
                self.clear_carry();
                return;
            }
        }
        self.cpu.memory.write(buf.wrapping_add(count as u16), 0x0D);
        self.set_y(count as u8 + 1);
        self.clear_carry();
    }

    // ==================== OSBYTE ====================

    fn osbyte(&mut self) -> MosResult<()> {
        match self.a() {
            0x7E => {
                // Acknowledge escape condition
                let pending = self.cpu.memory.read(addr::ESCFLG) != 0;
                self.cpu.memory.write(addr::ESCFLG, 0);
                self.set_x(if pending { 0xFF } else { 0x00 });
            }
            0x7F => self.osbyte_eof_check(),
            0x80 => {
                // ADVAL / buffer status, nothing behind it
                self.set_x(0);
                self.set_y(0);
            }
            0x81 => self.osbyte_inkey(),
            0x82 => {
                // Machine high order address
                self.set_x(0xFF);
                self.set_y(0xFF);
            }
            0x83 => {
                self.set_x((addr::LOMEM & 0xFF) as u8);
                self.set_y((addr::LOMEM >> 8) as u8);
            }
            0x84 | 0x85 => {
                // HIMEM / bottom of display memory for a given mode
                self.set_x((addr::HIMEM & 0xFF) as u8);
                self.set_y((addr::HIMEM >> 8) as u8);
            }
            0x86 => {
                // POS and VPOS, not tracked
                self.set_x(0);
                self.set_y(0);
            }
            0xDA => {} // read/write VDU queue
            a => {
                return Err(MosError::UnhandledOsByte {
                    a,
                    x: self.x(),
                    y: self.y(),
                })
            }
        }
        Ok(())
    }

    /// OSBYTE 0x7F: EOF query on the handle in X.
    fn osbyte_eof_check(&mut self) {
        let handle = self.x();
        let result = match self.files.get_mut(handle) {
            None => None,
            Some(open) => {
                let mut byte = [0u8; 1];
                match open.file.read(&mut byte) {
                    Ok(0) | Err(_) => Some(0xFF),
                    Ok(_) => {
                        // Put the peeked byte back
                        let _ = open.file.seek(SeekFrom::Current(-1));
                        Some(0x00)
                    }
                }
            }
        };
        match result {
            Some(x) => self.set_x(x),
            None => self.report("Channel"),
        }
    }

    /// OSBYTE 0x81: INKEY - wait for a key with a centisecond timeout
    /// in YX.
    fn osbyte_inkey(&mut self) {
        let timeout = self.param_ptr() as u64;
        let start = self.clock.read();
        loop {
            if let Some(key) = self.console.get_key() {
                let key = key & 0x7F;
                self.set_x(key);
                self.set_y(0);
                if key == ESCAPE_KEY {
                    self.set_y(ESCAPE_KEY);
                    self.raise_escape();
                    self.set_carry();
                } else {
                    self.clear_carry();
                }
                return;
            }
            if self.clock.elapsed_since(start) > timeout {
                self.set_y(0xFF);
                self.set_carry();
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    // ==================== File Services ====================

    /// OSFIND: open (A = 0x40/0x80/0xC0) or close (A = 0) a file.
    fn osfind(&mut self) {
        let a = self.a();
        if a == 0 {
            let handle = self.y();
            if handle == 0 {
                // Close everything; a no-op when nothing is open
                self.files.close_all();
            } else if !self.files.close(handle) {
                self.report("Channel");
            }
            return;
        }

        let mode = match a {
            0x40 => AccessMode::Read,
            0x80 => AccessMode::Write,
            0xC0 => AccessMode::Update,
            _ => return,
        };
        let filename = self.cpu.memory.read_cr_string(self.param_ptr());

        let Some(slot) = self.files.free_slot() else {
            self.report("Too many open files");
            self.set_a(0);
            return;
        };
        match mode.open(&filename) {
            Ok(file) => {
                let handle = self.files.insert(slot, file, mode);
                self.set_a(handle);
            }
            Err(_) => {
                self.report(&format!("Unable to open file '{}'", filename));
                self.set_a(0);
            }
        }
    }

    /// OSBPUT: write the byte in A to the handle in Y.
    fn osbput(&mut self) {
        let handle = self.y();
        let a = self.a();
        let ok = match self.files.get_mut(handle) {
            Some(open) if open.mode != AccessMode::Read => {
                let _ = open.file.write_all(&[a]);
                true
            }
            _ => false,
        };
        if !ok {
            self.report("Channel");
        }
    }

    /// OSBGET: read one byte from the handle in Y into A; carry signals
    /// end of file.
    fn osbget(&mut self) {
        enum Outcome {
            Channel,
            Eof,
            Byte(u8),
        }
        let handle = self.y();
        let outcome = match self.files.get_mut(handle) {
            Some(open) if open.mode != AccessMode::Write => {
                let mut byte = [0u8; 1];
                match open.file.read(&mut byte) {
                    Ok(n) if n > 0 => Outcome::Byte(byte[0]),
                    _ => Outcome::Eof,
                }
            }
            _ => Outcome::Channel,
        };
        match outcome {
            Outcome::Channel => self.report("Channel"),
            Outcome::Eof => {
                self.set_a(0xFF);
                self.set_carry();
            }
            Outcome::Byte(b) => {
                self.set_a(b);
                self.clear_carry();
            }
        }
    }

    /// OSARGS: file position and extent, selected by A, on the handle
    /// in Y, result through 4 bytes of zero page at X.
    fn osargs(&mut self) {
        let handle = self.y();
        if handle == 0 {
            self.report("unhandled OSARGS Y==0");
            return;
        }
        let zp = self.x() as u16;
        match self.a() {
            0x00 => {
                // PTR# read
                let pos = match self.files.get_mut(handle) {
                    Some(open) => open.file.stream_position().ok(),
                    None => None,
                };
                match pos {
                    Some(pos) => self.cpu.memory.write_u32(zp, pos as u32),
                    None => self.report("Channel"),
                }
            }
            0x01 => {
                // PTR# set
                let target = self.cpu.memory.read_u32(zp);
                let ok = match self.files.get_mut(handle) {
                    Some(open) => open.file.seek(SeekFrom::Start(target as u64)).is_ok(),
                    None => false,
                };
                if !ok {
                    self.report("Channel");
                }
            }
            0x02 => {
                // EXT# read
                let len = match self.files.get_mut(handle) {
                    Some(open) => file_extent(&mut open.file).ok(),
                    None => None,
                };
                match len {
                    Some(len) => self.cpu.memory.write_u32(zp, len as u32),
                    None => self.report("Channel"),
                }
            }
            _ => self.report("unhandled OSARGS operation"),
        }
    }

    /// OSFILE: whole-file save or load through a parameter block.
    fn osfile(&mut self) -> MosResult<()> {
        let a = self.a();
        let pb = FileBlock::read(&self.cpu.memory, self.param_ptr());
        match a {
            0x00 => self.osfile_save(&pb),
            0xFF => self.osfile_load(&pb),
            a => return Err(MosError::UnhandledOsFile { a }),
        }
        Ok(())
    }

    /// Save the RAM range [save, end) - exclusive, unlike *SAVE.
    fn osfile_save(&mut self, pb: &FileBlock) {
        self.set_a(0);
        let mut file = match File::create(&pb.filename) {
            Ok(f) => f,
            Err(_) => {
                self.report(&format!("Unable to open file '{}'", pb.filename));
                return;
            }
        };
        let start = pb.save as usize;
        let end = pb.end as usize;
        let data = if end > start {
            &self.cpu.memory.ram()[start..end]
        } else {
            &[][..]
        };
        match file.write_all(data) {
            Ok(()) => self.set_a(1),
            Err(_) => self.report("Error writing file"),
        }
    }

    /// Load a whole file at exec (if nonzero) or load address.
    fn osfile_load(&mut self, pb: &FileBlock) {
        self.set_a(0);
        let data = match fs::read(&pb.filename) {
            Ok(d) => d,
            Err(_) => {
                self.report(&format!("Unable to open file '{}'", pb.filename));
                return;
            }
        };
        let target = pb.load_target() as usize;
        let ram = self.cpu.memory.ram_mut();
        let end = (target + data.len()).min(ram.len());
        ram[target..end].copy_from_slice(&data[..end - target]);
        self.set_a(1);
    }

    // ==================== Command Line ====================

    /// OSCLI: interpret the CR-terminated command line at YX.
    fn oscli(&mut self) -> MosResult<Option<ExitInfo>> {
        let line = self.cpu.memory.read_cr_string(self.param_ptr());
        match command::parse(&line) {
            Ok(Some(StarCommand::Quit)) => {
                return Ok(Some(ExitInfo {
                    pc: self.cpu.registers.program_counter,
                }));
            }
            Ok(Some(StarCommand::Save {
                filename,
                start,
                end,
            })) => self.star_save(&filename, start, end),
            Ok(Some(StarCommand::Load { filename, start })) => self.star_load(&filename, start),
            Ok(Some(StarCommand::Shell(cmd))) => {
                let _ = Command::new("sh").arg("-c").arg(&cmd).status();
            }
            Ok(None) => {}
            Err(e) => self.report(&e.to_string()),
        }
        Ok(None)
    }

    /// *SAVE: write the inclusive RAM range [start, end].
    fn star_save(&mut self, filename: &str, start: u16, end: u16) {
        let data = self.cpu.memory.ram()[start as usize..=end as usize].to_vec();
        if fs::write(filename, data).is_err() {
            self.report("unable to open file");
        }
    }

    /// *LOAD: read a file into RAM at start, clipped to the top of
    /// memory.
    fn star_load(&mut self, filename: &str, start: u16) {
        let data = match fs::read(filename) {
            Ok(d) => d,
            Err(_) => {
                self.report("unable to open file");
                return;
            }
        };
        let start = start as usize;
        let ram = self.cpu.memory.ram_mut();
        let end = (start + data.len()).min(ram.len());
        ram[start..end].copy_from_slice(&data[..end - start]);
    }
}

/// File length via a seek-to-end and restore dance.
fn file_extent(file: &mut File) -> std::io::Result<u64> {
    let pos = file.stream_position()?;
    let len = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(pos))?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::HeadlessConsole;
    use std::path::PathBuf;

    fn emu() -> MosEmulator<HeadlessConsole> {
        MosEmulator::new(HeadlessConsole::new())
    }

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("mos-emu-{}-{}", std::process::id(), name));
        p
    }

    /// Place a CR-terminated string in guest memory.
    fn put_cr_string(emu: &mut MosEmulator<HeadlessConsole>, addr: u16, s: &str) {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0x0D);
        emu.load_at(addr, &bytes);
    }

    /// Point YX at `addr`.
    fn point_yx(emu: &mut MosEmulator<HeadlessConsole>, addr: u16) {
        emu.set_x((addr & 0xFF) as u8);
        emu.set_y((addr >> 8) as u8);
    }

    #[test]
    fn test_oswrch_printable_and_controls() {
        let mut emu = emu();
        for a in [b'A', 0x08, 0x0C, 0x01, 0x0D] {
            emu.set_a(a);
            emu.oswrch();
        }
        let mut expected = vec![b'A', 0x7F];
        expected.extend_from_slice(b"\x1b[2J\x1b[H");
        expected.push(0x0D); // CR passes through OSWRCH unmapped
        assert_eq!(emu.console().output(), &expected[..]);
    }

    #[test]
    fn test_osasci_maps_cr_to_newline() {
        let mut emu = emu();
        emu.set_a(0x0D);
        emu.osasci();
        assert_eq!(emu.console().output(), b"\n");
    }

    #[test]
    fn test_osrdch_masks_and_flags() {
        let mut emu = MosEmulator::new(HeadlessConsole::with_keys(&[b'A' | 0x80, 0x1B]));
        emu.osrdch();
        assert_eq!(emu.a(), b'A');
        assert!(!emu.carry());

        emu.osrdch();
        assert_eq!(emu.a(), 0x1B);
        assert!(emu.carry());
        assert_eq!(emu.memory().read(addr::ESCFLG), ESCAPE_SET);
    }

    fn line_input_pblock(emu: &mut MosEmulator<HeadlessConsole>, max_len: u8, min: u8, max: u8) {
        // Block at 0x0F00, buffer at 0x0E00
        emu.load_at(0x0F00, &[0x00, 0x0E, max_len, min, max]);
        emu.set_a(0x00);
        point_yx(emu, 0x0F00);
    }

    #[test]
    fn test_line_input_short_line() {
        let mut emu = emu();
        emu.console_mut().queue_line("HELLO");
        line_input_pblock(&mut emu, 10, 0x20, 0xFF);
        emu.osword().unwrap();

        assert_eq!(&emu.memory().ram()[0x0E00..0x0E06], b"HELLO\r");
        assert_eq!(emu.y(), 6);
        assert!(!emu.carry());
    }

    #[test]
    fn test_line_input_exact_fill() {
        let mut emu = emu();
        emu.console_mut().queue_line("HELLO");
        line_input_pblock(&mut emu, 5, 0x20, 0xFF);
        emu.osword().unwrap();

        // CR overwrites the final character
        assert_eq!(&emu.memory().ram()[0x0E00..0x0E05], b"HELL\r");
        assert_eq!(emu.y(), 5);
        assert!(!emu.carry());
    }

    #[test]
    fn test_line_input_escape_aborts() {
        let mut emu = emu();
        emu.console_mut().queue_line("AB\x1bCD");
        line_input_pblock(&mut emu, 10, 0x01, 0xFF);
        emu.osword().unwrap();

        assert_eq!(&emu.memory().ram()[0x0E00..0x0E02], b"AB");
        // No terminator was written
        assert_eq!(emu.memory().ram()[0x0E02], 0);
        assert_eq!(emu.y(), 2);
        assert!(emu.carry());
        assert_eq!(emu.memory().read(addr::ESCFLG), ESCAPE_SET);
    }

    #[test]
    fn test_line_input_filters_out_of_range() {
        let mut emu = emu();
        emu.console_mut().queue_line("A\tB");
        line_input_pblock(&mut emu, 10, 0x20, 0x7E);
        emu.osword().unwrap();

        assert_eq!(&emu.memory().ram()[0x0E00..0x0E03], b"AB\r");
        assert_eq!(emu.y(), 3);
    }

    #[test]
    fn test_clock_round_trip() {
        let mut emu = emu();
        let value: u64 = 99_999;
        for i in 0..5u16 {
            emu.memory_mut().write(0x0B00 + i, (value >> (8 * i)) as u8);
        }
        emu.set_a(0x02);
        point_yx(&mut emu, 0x0B00);
        emu.osword().unwrap();

        emu.set_a(0x01);
        point_yx(&mut emu, 0x0B10);
        emu.osword().unwrap();

        let mut read = 0u64;
        for i in 0..5u16 {
            read |= (emu.memory().read(0x0B10 + i) as u64) << (8 * i);
        }
        assert!((value..value + 2).contains(&read), "read back {read}");
    }

    #[test]
    fn test_osword_unknown_is_fatal() {
        let mut emu = emu();
        emu.set_a(0x42);
        assert!(matches!(
            emu.osword(),
            Err(MosError::UnhandledOsWord { a: 0x42 })
        ));
    }

    #[test]
    fn test_osbyte_memory_queries() {
        let mut emu = emu();
        emu.set_a(0x83);
        emu.osbyte().unwrap();
        assert_eq!((emu.x(), emu.y()), (0x00, 0x08));

        emu.set_a(0x84);
        emu.osbyte().unwrap();
        assert_eq!((emu.x(), emu.y()), (0x00, 0xB8));

        emu.set_a(0x82);
        emu.osbyte().unwrap();
        assert_eq!((emu.x(), emu.y()), (0xFF, 0xFF));
    }

    #[test]
    fn test_osbyte_escape_acknowledge() {
        let mut emu = emu();
        emu.memory_mut().write(addr::ESCFLG, ESCAPE_SET);
        emu.set_a(0x7E);
        emu.osbyte().unwrap();
        assert_eq!(emu.x(), 0xFF);
        assert_eq!(emu.memory().read(addr::ESCFLG), 0);

        // Second acknowledge reports nothing pending
        emu.set_a(0x7E);
        emu.osbyte().unwrap();
        assert_eq!(emu.x(), 0x00);
    }

    #[test]
    fn test_osbyte_unknown_is_fatal() {
        let mut emu = emu();
        emu.set_a(0x42);
        assert!(matches!(
            emu.osbyte(),
            Err(MosError::UnhandledOsByte { a: 0x42, .. })
        ));
    }

    #[test]
    fn test_inkey_key_and_timeout() {
        let mut emu = MosEmulator::new(HeadlessConsole::with_keys(&[b'Z']));
        emu.set_a(0x81);
        point_yx(&mut emu, 0x0005); // 5 centiseconds
        emu.osbyte().unwrap();
        assert_eq!(emu.x(), b'Z');
        assert_eq!(emu.y(), 0);
        assert!(!emu.carry());

        // No key queued: times out
        emu.set_a(0x81);
        point_yx(&mut emu, 0x0000);
        emu.osbyte().unwrap();
        assert_eq!(emu.y(), 0xFF);
        assert!(emu.carry());
    }

    #[test]
    fn test_inkey_escape() {
        let mut emu = MosEmulator::new(HeadlessConsole::with_keys(&[0x1B]));
        emu.set_a(0x81);
        point_yx(&mut emu, 0x0005);
        emu.osbyte().unwrap();
        assert_eq!(emu.x(), 0x1B);
        assert_eq!(emu.y(), 0x1B);
        assert!(emu.carry());
        assert_eq!(emu.memory().read(addr::ESCFLG), ESCAPE_SET);
    }

    fn open_guest_file(emu: &mut MosEmulator<HeadlessConsole>, path: &str, mode: u8) -> u8 {
        put_cr_string(emu, 0x0C00, path);
        emu.set_a(mode);
        point_yx(emu, 0x0C00);
        emu.osfind();
        emu.a()
    }

    #[test]
    fn test_osfind_open_to_capacity() {
        let mut emu = emu();
        for want in 1..=6u8 {
            let path = temp_path(&format!("cap{want}"));
            let h = open_guest_file(&mut emu, path.to_str().unwrap(), 0x80);
            assert_eq!(h, want);
        }
        // Seventh open fails without disturbing the table
        let path = temp_path("cap7");
        let h = open_guest_file(&mut emu, path.to_str().unwrap(), 0x80);
        assert_eq!(h, 0);
        assert!(emu.console().output_string().contains("Too many open files"));

        // Close-all frees every slot
        emu.set_a(0);
        emu.set_y(0);
        emu.osfind();
        let path = temp_path("cap1");
        let h = open_guest_file(&mut emu, path.to_str().unwrap(), 0x80);
        assert_eq!(h, 1);
    }

    #[test]
    fn test_osfind_open_missing_file() {
        let mut emu = emu();
        let h = open_guest_file(&mut emu, "/nonexistent/nope", 0x40);
        assert_eq!(h, 0);
        assert!(emu.console().output_string().contains("Unable to open file"));
    }

    #[test]
    fn test_osfind_close_errors() {
        let mut emu = emu();
        // Close of a never-opened handle
        emu.set_a(0);
        emu.set_y(3);
        emu.osfind();
        assert!(emu.console().output_string().contains("Channel"));

        // Out of range
        emu.console_mut().clear_output();
        emu.set_a(0);
        emu.set_y(9);
        emu.osfind();
        assert!(emu.console().output_string().contains("Channel"));

        // Close-all with nothing open is a no-op
        emu.console_mut().clear_output();
        emu.set_a(0);
        emu.set_y(0);
        emu.osfind();
        assert!(emu.console().output_string().is_empty());
    }

    #[test]
    fn test_bget_bput_mode_enforcement() {
        let mut emu = emu();
        let path = temp_path("modes");
        std::fs::write(&path, b"Q").unwrap();

        let rh = open_guest_file(&mut emu, path.to_str().unwrap(), 0x40);
        let wpath = temp_path("modes-w");
        let wh = open_guest_file(&mut emu, wpath.to_str().unwrap(), 0x80);

        // Write to a read handle
        emu.console_mut().clear_output();
        emu.set_a(b'x');
        emu.set_y(rh);
        emu.osbput();
        assert!(emu.console().output_string().contains("Channel"));

        // Read from a write handle
        emu.console_mut().clear_output();
        emu.set_y(wh);
        emu.osbget();
        assert!(emu.console().output_string().contains("Channel"));

        // Legitimate read sees the data then EOF with carry
        emu.set_y(rh);
        emu.osbget();
        assert_eq!(emu.a(), b'Q');
        assert!(!emu.carry());
        emu.osbget();
        assert_eq!(emu.a(), 0xFF);
        assert!(emu.carry());
    }

    #[test]
    fn test_bput_then_bget_round_trip() {
        let mut emu = emu();
        let path = temp_path("rt");
        let wh = open_guest_file(&mut emu, path.to_str().unwrap(), 0x80);
        for b in b"MOS" {
            emu.set_a(*b);
            emu.set_y(wh);
            emu.osbput();
        }
        emu.set_a(0);
        emu.set_y(wh);
        emu.osfind(); // close flushes

        let rh = open_guest_file(&mut emu, path.to_str().unwrap(), 0x40);
        let mut got = Vec::new();
        loop {
            emu.set_y(rh);
            emu.osbget();
            if emu.carry() {
                break;
            }
            got.push(emu.a());
        }
        assert_eq!(got, b"MOS");
    }

    #[test]
    fn test_osbyte_eof_query() {
        let mut emu = emu();
        let path = temp_path("eof");
        std::fs::write(&path, b"a").unwrap();
        let h = open_guest_file(&mut emu, path.to_str().unwrap(), 0x40);

        emu.set_a(0x7F);
        emu.set_x(h);
        emu.osbyte().unwrap();
        assert_eq!(emu.x(), 0x00);

        // Consume the byte; now at EOF
        emu.set_y(h);
        emu.osbget();
        emu.set_a(0x7F);
        emu.set_x(h);
        emu.osbyte().unwrap();
        assert_eq!(emu.x(), 0xFF);

        // The peek did not move the file position
        emu.set_a(0x7F);
        emu.set_x(h);
        emu.osbyte().unwrap();
        assert_eq!(emu.x(), 0xFF);
    }

    #[test]
    fn test_osargs_ptr_and_ext() {
        let mut emu = emu();
        let path = temp_path("args");
        std::fs::write(&path, b"0123456789").unwrap();
        let h = open_guest_file(&mut emu, path.to_str().unwrap(), 0x40);

        // EXT#
        emu.set_a(0x02);
        emu.set_y(h);
        emu.set_x(0x70);
        emu.osargs();
        assert_eq!(emu.memory().read_u32(0x70), 10);

        // PTR# set then read back
        emu.memory_mut().write_u32(0x70, 4);
        emu.set_a(0x01);
        emu.set_y(h);
        emu.set_x(0x70);
        emu.osargs();

        emu.memory_mut().write_u32(0x70, 0);
        emu.set_a(0x00);
        emu.set_y(h);
        emu.set_x(0x70);
        emu.osargs();
        assert_eq!(emu.memory().read_u32(0x70), 4);

        // The seek dance left the position alone for reads
        emu.set_y(h);
        emu.osbget();
        assert_eq!(emu.a(), b'4');
    }

    #[test]
    fn test_osargs_channel_error() {
        let mut emu = emu();
        emu.set_a(0x00);
        emu.set_y(2);
        emu.set_x(0x70);
        emu.osargs();
        assert!(emu.console().output_string().contains("Channel"));
    }

    #[test]
    fn test_osfile_save_load_round_trip() {
        let mut emu = emu();
        let path = temp_path("blk");
        let pattern: Vec<u8> = (0..=255).collect();
        emu.load_at(0x2000, &pattern);

        // Parameter block: filename ptr, load, exec, save, end
        put_cr_string(&mut emu, 0x0A00, path.to_str().unwrap());
        emu.load_at(0x0900, &[0x00, 0x0A]);
        emu.memory_mut().write_u32(0x0902, 0x2000); // load
        emu.memory_mut().write_u32(0x0906, 0x0000); // exec
        emu.memory_mut().write_u32(0x090A, 0x2000); // save
        emu.memory_mut().write_u32(0x090E, 0x2100); // end (exclusive)

        emu.set_a(0x00);
        point_yx(&mut emu, 0x0900);
        emu.osfile().unwrap();
        assert_eq!(emu.a(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), pattern);

        // Wipe and load back
        emu.load_at(0x2000, &[0u8; 256]);
        emu.set_a(0xFF);
        point_yx(&mut emu, 0x0900);
        emu.osfile().unwrap();
        assert_eq!(emu.a(), 1);
        assert_eq!(&emu.memory().ram()[0x2000..0x2100], &pattern[..]);
    }

    #[test]
    fn test_osfile_load_missing_reports() {
        let mut emu = emu();
        put_cr_string(&mut emu, 0x0A00, "/nonexistent/nope");
        emu.load_at(0x0900, &[0x00, 0x0A]);
        emu.set_a(0xFF);
        point_yx(&mut emu, 0x0900);
        emu.osfile().unwrap();
        assert_eq!(emu.a(), 0);
        assert!(emu.console().output_string().contains("Unable to open file"));
    }

    #[test]
    fn test_osfile_unknown_op_is_fatal() {
        let mut emu = emu();
        put_cr_string(&mut emu, 0x0A00, "X");
        emu.load_at(0x0900, &[0x00, 0x0A]);
        emu.set_a(0x05);
        point_yx(&mut emu, 0x0900);
        assert!(matches!(
            emu.osfile(),
            Err(MosError::UnhandledOsFile { a: 0x05 })
        ));
    }

    #[test]
    fn test_oscli_quit() {
        let mut emu = emu();
        put_cr_string(&mut emu, 0x0C00, "*QUIT");
        point_yx(&mut emu, 0x0C00);
        let exit = emu.oscli().unwrap();
        assert!(exit.is_some());
        assert!(emu.console().output_string().is_empty());
    }

    #[test]
    fn test_oscli_save_inclusive_then_load() {
        let mut emu = emu();
        let path = temp_path("star");
        emu.load_at(0x5000, b"INCLUSIVE");

        let cmd = format!("*SAVE \"{}\" 5000 5008", path.display());
        put_cr_string(&mut emu, 0x0C00, &cmd);
        point_yx(&mut emu, 0x0C00);
        emu.oscli().unwrap();
        // Inclusive end: all nine bytes written
        assert_eq!(std::fs::read(&path).unwrap(), b"INCLUSIVE");

        emu.load_at(0x5000, &[0u8; 9]);
        let cmd = format!("*LOAD \"{}\" 5000", path.display());
        put_cr_string(&mut emu, 0x0C00, &cmd);
        point_yx(&mut emu, 0x0C00);
        emu.oscli().unwrap();
        assert_eq!(&emu.memory().ram()[0x5000..0x5009], b"INCLUSIVE");
    }

    #[test]
    fn test_oscli_high_bit_command_byte() {
        let mut emu = emu();
        // First byte above 0x7F, followed by the shell no-op ':'
        emu.load_at(0x0C00, &[0xA3, b':', 0x0D]);
        point_yx(&mut emu, 0x0C00);
        let exit = emu.oscli().unwrap();
        assert!(exit.is_none());
    }

    #[test]
    fn test_oscli_syntax_error_writes_nothing() {
        let mut emu = emu();
        let path = temp_path("never");
        let cmd = format!("*SAVE \"{} 5000 5008", path.display()); // no closing quote
        put_cr_string(&mut emu, 0x0C00, &cmd);
        point_yx(&mut emu, 0x0C00);
        emu.oscli().unwrap();
        assert!(emu.console().output_string().contains("Syntax error"));
        assert!(!path.exists());
    }
}
