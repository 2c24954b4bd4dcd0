//! Fuzz target: `command::parse_bytes`
//!
//! Arbitrary bytes must parse to a command or `InvalidCommand`, never panic.
//! Anything accepted must carry a verb that re-parses to the same variant.
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use iiod::error::ProtocolError;
use iiod::protocol::command::{self, Command};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match command::parse_bytes(data) {
        Ok(Command::Noop) => {
            let text = core::str::from_utf8(data).expect("accepted input is UTF-8");
            assert!(text.trim_ascii().is_empty(), "Noop for non-blank line");
        }
        Ok(cmd) => {
            let text = core::str::from_utf8(data).expect("accepted input is UTF-8");
            assert!(text.split_ascii_whitespace().next() == Some(cmd.verb()));
        }
        Err(e) => assert_eq!(e, ProtocolError::InvalidCommand),
    }
});
