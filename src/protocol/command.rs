//! Command grammar: one text line in, one [`Command`] out.
//!
//! ```text
//! VERSION
//! PRINT
//! READ     <dev> [INPUT|OUTPUT <chan> | DEBUG | BUFFER] [<attr>]
//! WRITE    <dev> [INPUT|OUTPUT <chan> | DEBUG | BUFFER] [<attr>] <bytes>
//! OPEN     <dev> <samples> <hex-mask>
//! CLOSE    <dev>
//! READBUF  <dev> <bytes>
//! WRITEBUF <dev> <bytes>
//! TIMEOUT  <ms>
//! EXIT
//! GETTRIG  [<dev>]
//! ```
//!
//! Tokens are separated by ASCII whitespace. Verbs and scope keywords are
//! case-sensitive; device, channel and attribute names are opaque. Numbers
//! are digits only: no sign, no radix prefix. An omitted attribute name
//! addresses every attribute of the scope.

use crate::error::{ProtocolError, Result};

/// Which attribute table a READ/WRITE addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrScope {
    Device,
    Channel { name: String, output: bool },
    Debug,
    Buffer,
}

/// Attribute addressed by READ or WRITE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrTarget {
    pub device: String,
    pub scope: AttrScope,
    /// Empty for "all attributes of the scope".
    pub attr: String,
}

/// A parsed protocol command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line; produces no response.
    Noop,
    Version,
    Print,
    Read(AttrTarget),
    Write { target: AttrTarget, len: usize },
    Open { device: String, samples: usize, mask: u32 },
    Close { device: String },
    ReadBuf { device: String, len: usize },
    WriteBuf { device: String, len: usize },
    Timeout { ms: u32 },
    Exit,
    GetTrig,
}

impl Command {
    /// Verb as it appears on the wire (empty for `Noop`).
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Noop => "",
            Self::Version => "VERSION",
            Self::Print => "PRINT",
            Self::Read(_) => "READ",
            Self::Write { .. } => "WRITE",
            Self::Open { .. } => "OPEN",
            Self::Close { .. } => "CLOSE",
            Self::ReadBuf { .. } => "READBUF",
            Self::WriteBuf { .. } => "WRITEBUF",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Exit => "EXIT",
            Self::GetTrig => "GETTRIG",
        }
    }
}

/// Parse raw line bytes. Non-UTF-8 input is an invalid command.
pub fn parse_bytes(line: &[u8]) -> Result<Command> {
    let text = core::str::from_utf8(line).map_err(|_| ProtocolError::InvalidCommand)?;
    parse(text)
}

/// Parse one command line (terminator already stripped).
pub fn parse(line: &str) -> Result<Command> {
    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    let Some((&verb, args)) = tokens.split_first() else {
        return Ok(Command::Noop);
    };

    match verb {
        "VERSION" => no_operands(args, Command::Version),
        "PRINT" => no_operands(args, Command::Print),
        "EXIT" => no_operands(args, Command::Exit),
        "GETTRIG" if args.len() <= 1 => Ok(Command::GetTrig),
        "READ" => parse_read(args),
        "WRITE" => parse_write(args),
        "OPEN" => match args {
            [device, samples, mask] => Ok(Command::Open {
                device: (*device).to_owned(),
                samples: decimal(samples)?,
                mask: hex_mask(mask)?,
            }),
            _ => Err(ProtocolError::InvalidCommand),
        },
        "CLOSE" => match args {
            [device] => Ok(Command::Close {
                device: (*device).to_owned(),
            }),
            _ => Err(ProtocolError::InvalidCommand),
        },
        "READBUF" | "WRITEBUF" => {
            let [device, len] = args else {
                return Err(ProtocolError::InvalidCommand);
            };
            let device = (*device).to_owned();
            let len = decimal(len)?;
            Ok(if verb == "READBUF" {
                Command::ReadBuf { device, len }
            } else {
                Command::WriteBuf { device, len }
            })
        }
        "TIMEOUT" => match args {
            [ms] => Ok(Command::Timeout {
                ms: u32::try_from(decimal(ms)?).map_err(|_| ProtocolError::InvalidCommand)?,
            }),
            _ => Err(ProtocolError::InvalidCommand),
        },
        _ => Err(ProtocolError::InvalidCommand),
    }
}

fn no_operands(args: &[&str], cmd: Command) -> Result<Command> {
    if args.is_empty() {
        Ok(cmd)
    } else {
        Err(ProtocolError::InvalidCommand)
    }
}

/// Split `<dev> [scope]` off the front, returning the remaining operands.
fn device_and_scope<'a>(args: &'a [&'a str]) -> Result<(String, AttrScope, &'a [&'a str])> {
    let [device, rest @ ..] = args else {
        return Err(ProtocolError::InvalidCommand);
    };
    let (scope, rest) = match rest {
        ["INPUT", name, rest @ ..] => (
            AttrScope::Channel {
                name: (*name).to_owned(),
                output: false,
            },
            rest,
        ),
        ["OUTPUT", name, rest @ ..] => (
            AttrScope::Channel {
                name: (*name).to_owned(),
                output: true,
            },
            rest,
        ),
        ["INPUT" | "OUTPUT"] => return Err(ProtocolError::InvalidCommand),
        ["DEBUG", rest @ ..] => (AttrScope::Debug, rest),
        ["BUFFER", rest @ ..] => (AttrScope::Buffer, rest),
        rest => (AttrScope::Device, rest),
    };
    Ok(((*device).to_owned(), scope, rest))
}

fn parse_read(args: &[&str]) -> Result<Command> {
    let (device, scope, rest) = device_and_scope(args)?;
    let attr = match rest {
        [] => String::new(),
        // A byte count has no place in READ.
        [tok] if is_decimal(tok) => return Err(ProtocolError::InvalidCommand),
        [attr] => (*attr).to_owned(),
        _ => return Err(ProtocolError::InvalidCommand),
    };
    Ok(Command::Read(AttrTarget {
        device,
        scope,
        attr,
    }))
}

fn parse_write(args: &[&str]) -> Result<Command> {
    let (device, scope, rest) = device_and_scope(args)?;
    let (attr, len) = match rest {
        [len] => (String::new(), decimal(len)?),
        [attr, len] => ((*attr).to_owned(), decimal(len)?),
        _ => return Err(ProtocolError::InvalidCommand),
    };
    Ok(Command::Write {
        target: AttrTarget {
            device,
            scope,
            attr,
        },
        len,
    })
}

fn is_decimal(tok: &str) -> bool {
    !tok.is_empty() && tok.bytes().all(|b| b.is_ascii_digit())
}

fn decimal(tok: &str) -> Result<usize> {
    if !is_decimal(tok) {
        return Err(ProtocolError::InvalidCommand);
    }
    tok.parse().map_err(|_| ProtocolError::InvalidCommand)
}

fn hex_mask(tok: &str) -> Result<u32> {
    if tok.is_empty() || !tok.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProtocolError::InvalidCommand);
    }
    u32::from_str_radix(tok, 16).map_err(|_| ProtocolError::InvalidCommand)
}
