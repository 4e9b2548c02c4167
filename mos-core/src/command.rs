//! Star command parser.
//!
//! OSCLI hands us a command line such as `*SAVE "PROG" 1900 1A2F`.
//! A few directives are built in; anything else is passed through to
//! the host shell. Note the asymmetry inherited from the original
//! interface: `*SAVE`'s end address is inclusive, while OSFILE's save
//! treats its end address as exclusive.

use thiserror::Error;

/// A recognised command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StarCommand {
    /// *QUIT - leave the emulator.
    Quit,
    /// *SAVE "file" start end - write the inclusive range [start, end].
    Save {
        filename: String,
        start: u16,
        end: u16,
    },
    /// *LOAD "file" start - read a file into memory at start.
    Load { filename: String, start: u16 },
    /// Anything else: hand to the host shell, leading `*` stripped.
    Shell(String),
}

/// Command parse failures, worded as the guest sees them.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("Syntax error")]
    Syntax,

    #[error("start out of range")]
    StartRange,

    #[error("end out of range")]
    EndRange,
}

/// Parse one command line. `Ok(None)` means the line is too short to
/// mean anything (a bare `*` or an empty line) and is ignored.
pub fn parse(line: &str) -> Result<Option<StarCommand>, CommandError> {
    if line == "*QUIT" || line == "*quit" {
        return Ok(Some(StarCommand::Quit));
    }
    if let Some(args) = line.strip_prefix("*SAVE") {
        let (filename, addrs) = parse_transfer(args, 2)?;
        let start = addrs[0];
        let end = addrs[1];
        if start > 0xFFFF {
            return Err(CommandError::StartRange);
        }
        if end > 0xFFFF || end < start {
            return Err(CommandError::EndRange);
        }
        return Ok(Some(StarCommand::Save {
            filename,
            start: start as u16,
            end: end as u16,
        }));
    }
    if let Some(args) = line.strip_prefix("*LOAD") {
        let (filename, addrs) = parse_transfer(args, 1)?;
        let start = addrs[0];
        if start > 0xFFFF {
            return Err(CommandError::StartRange);
        }
        return Ok(Some(StarCommand::Load {
            filename,
            start: start as u16,
        }));
    }
    // Guest bytes above 0x7F arrive as multi-byte chars, so strip the
    // leading character, not the leading byte.
    let mut chars = line.chars();
    if chars.next().is_some() && !chars.as_str().is_empty() {
        return Ok(Some(StarCommand::Shell(chars.as_str().to_string())));
    }
    Ok(None)
}

/// Parse `"filename"` followed by exactly `count` hex addresses.
fn parse_transfer(args: &str, count: usize) -> Result<(String, Vec<u32>), CommandError> {
    let rest = args.trim_start();
    let rest = rest.strip_prefix('"').ok_or(CommandError::Syntax)?;
    let close = rest.find('"').ok_or(CommandError::Syntax)?;
    let filename = rest[..close].to_string();
    let rest = &rest[close + 1..];

    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.len() != count {
        return Err(CommandError::Syntax);
    }

    let mut addrs = Vec::with_capacity(count);
    for t in tokens {
        addrs.push(u32::from_str_radix(t, 16).map_err(|_| CommandError::Syntax)?);
    }
    Ok((filename, addrs))
}
