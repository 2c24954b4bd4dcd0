//! Fuzz target: a whole session over scripted input
//!
//! Feeds arbitrary bytes to a session backed by an in-memory registry with
//! one open-able device. The session must terminate (input is finite) and
//! must never leave a sampling context open behind it.
//!
//! cargo fuzz run fuzz_session

#![no_main]

use iiod::backend::{AttrValue, ChannelDescriptor, DeviceDescriptor, DeviceRegistry};
use iiod::config::EngineConfig;
use iiod::protocol::{MemoryTransport, Session, SessionId};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reg = DeviceRegistry::new();
    reg.register(
        "adc0",
        DeviceDescriptor::new()
            .channel(ChannelDescriptor::input("voltage0").attribute("raw", AttrValue::stored("0")))
            .attribute("name", AttrValue::read_only("adc0"))
            .buffer_capacity(512),
    )
    .expect("fresh registry");

    let config = EngineConfig {
        max_line_len: 64,
        attr_buf_size: 256,
        chunk_size: 32,
        ..EngineConfig::default()
    };
    let mut session = Session::new(SessionId::SINGLE, MemoryTransport::with_input(data), config);
    let _ = session.run(&mut reg);

    assert!(session.is_closed());
    assert!(session.contexts().is_empty());
    assert!(!reg.is_open("adc0"));
});
