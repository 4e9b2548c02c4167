//! Fixed-capacity file handle table.
//!
//! The guest sees handles 1..=6; slot index is handle minus one. A slot
//! holds an open host file plus the access mode it was opened with, so
//! the byte-level services can reject reads on write-only channels and
//! vice versa. Dropping the table closes every remaining handle, which
//! is what guarantees no descriptor leaks at process exit.

use std::fs::{File, OpenOptions};
use std::io;

/// Number of handle slots.
pub const MAX_HANDLES: usize = 6;

/// Access mode a file was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// OPENIN - read only
    Read,
    /// OPENOUT - write only, truncating
    Write,
    /// OPENUP - random access update ("a+": reads anywhere, writes
    /// append, created if missing)
    Update,
}

impl AccessMode {
    /// Open `path` with this mode's host semantics.
    pub fn open(self, path: &str) -> io::Result<File> {
        match self {
            AccessMode::Read => File::open(path),
            AccessMode::Write => File::create(path),
            AccessMode::Update => OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .open(path),
        }
    }
}

/// An open slot in the handle table.
pub struct OpenFile {
    pub file: File,
    pub mode: AccessMode,
}

/// Fixed-capacity table mapping guest handles to host files.
#[derive(Default)]
pub struct FileTable {
    slots: [Option<OpenFile>; MAX_HANDLES],
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first empty slot, if any.
    pub fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    /// Store an opened file in `slot` and return its guest handle.
    pub fn insert(&mut self, slot: usize, file: File, mode: AccessMode) -> u8 {
        self.slots[slot] = Some(OpenFile { file, mode });
        slot as u8 + 1
    }

    /// Look up a handle. None for out-of-range or closed handles.
    pub fn get_mut(&mut self, handle: u8) -> Option<&mut OpenFile> {
        Self::slot_index(handle).and_then(|i| self.slots[i].as_mut())
    }

    /// True if `handle` is in range and open.
    pub fn is_open(&self, handle: u8) -> bool {
        Self::slot_index(handle).is_some_and(|i| self.slots[i].is_some())
    }

    /// Close one handle. Returns false if it was out of range or
    /// already closed.
    pub fn close(&mut self, handle: u8) -> bool {
        match Self::slot_index(handle) {
            Some(i) => self.slots[i].take().is_some(),
            None => false,
        }
    }

    /// Close every open handle. Idempotent.
    pub fn close_all(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    fn slot_index(handle: u8) -> Option<usize> {
        if (1..=MAX_HANDLES as u8).contains(&handle) {
            Some(handle as usize - 1)
        } else {
            None
        }
    }
}
