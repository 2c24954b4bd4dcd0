//! Whole sessions against the in-memory device registry.

use std::thread;

use iiod::backend::{AttrValue, ChannelDescriptor, DeviceDescriptor, DeviceRegistry, SharedBackend};
use iiod::protocol::session::SessionTable;
use iiod::protocol::{MemoryTransport, Session};

fn ramp(_mask: u32, buf: &mut [u8]) {
    for (i, b) in buf.iter_mut().enumerate() {
        *b = (i * 3) as u8;
    }
}

fn registry() -> DeviceRegistry {
    let mut reg = DeviceRegistry::new();
    reg.register(
        "adc0",
        DeviceDescriptor::new()
            .channel(
                ChannelDescriptor::input("voltage0")
                    .attribute("raw", AttrValue::stored("512"))
                    .attribute("scale", AttrValue::read_only("0.5")),
            )
            .channel(ChannelDescriptor::input("voltage1"))
            .attribute("sampling_frequency", AttrValue::stored("1000"))
            .attribute("name", AttrValue::read_only("adc0"))
            .debug_attribute("direct_reg_access", AttrValue::stored([0u8]))
            .buffer_capacity(256)
            .capture_with(ramp),
    )
    .unwrap();
    reg
}

fn run(input: &[u8], reg: &mut DeviceRegistry) -> Vec<u8> {
    let mut s = Session::single(MemoryTransport::with_input(input));
    s.run(reg).unwrap();
    s.into_transport().take_output()
}

#[test]
fn write_then_read_round_trip() {
    let mut reg = registry();
    let out = run(
        b"WRITE adc0 INPUT voltage0 raw 4\n2048READ adc0 INPUT voltage0 raw\n",
        &mut reg,
    );
    assert_eq!(out, b"4\n4\n2048\r\n");
}

#[test]
fn debug_register_round_trip() {
    let mut reg = registry();
    let out = run(
        b"WRITE adc0 DEBUG direct_reg_access 1\n\x05READ adc0 DEBUG direct_reg_access\n",
        &mut reg,
    );
    assert_eq!(out, b"1\n1\n\x05\r\n");
}

#[test]
fn read_all_device_attributes() {
    let mut reg = registry();
    let out = run(b"READ adc0\n", &mut reg);
    let mut expected = b"16\n".to_vec();
    expected.extend_from_slice(&[0, 0, 0, 4]);
    expected.extend_from_slice(b"1000");
    expected.extend_from_slice(&[0, 0, 0, 4]);
    expected.extend_from_slice(b"adc0");
    expected.extend_from_slice(b"\r\n");
    assert_eq!(out, expected);
}

#[test]
fn unknown_names_map_to_errno() {
    let mut reg = registry();
    let out = run(
        b"READ dac0 name\nREAD adc0 nope\nREAD adc0 OUTPUT voltage0 raw\nWRITE adc0 name 1\nx",
        &mut reg,
    );
    assert_eq!(out, b"-19\n-2\n-2\n-13\n");
}

#[test]
fn capture_streams_through_readbuf() {
    let mut reg = registry();
    let out = run(b"OPEN adc0 4 3\nREADBUF adc0 6\nCLOSE adc0\n", &mut reg);
    let mut expected = b"0\n6\n00000003\n".to_vec();
    expected.extend_from_slice(&[0, 3, 6, 9, 12, 15]);
    expected.extend_from_slice(b"0\n");
    assert_eq!(out, expected);
    assert!(!reg.is_open("adc0"));
}

#[test]
fn writebuf_past_capacity_keeps_stream_in_sync() {
    let mut reg = DeviceRegistry::new();
    reg.register(
        "dac0",
        DeviceDescriptor::new()
            .channel(ChannelDescriptor::output("voltage0"))
            .buffer_capacity(64),
    )
    .unwrap();
    let mut input = b"OPEN dac0 1 1\nWRITEBUF dac0 100\n".to_vec();
    input.extend_from_slice(&[0x5a; 100]);
    input.extend_from_slice(b"GETTRIG\nVERSION\n");

    let out = run(&input, &mut reg);
    assert_eq!(out, b"0\n100\n-12\n-19\n0.1.0000000\n");
    assert!(reg.samples("dac0").unwrap().is_empty());
}

#[test]
fn mask_beyond_channel_count_is_rejected() {
    let mut reg = registry();
    assert_eq!(run(b"OPEN adc0 4 4\n", &mut reg), b"-2\n");
}

#[test]
fn sessions_share_one_registry_across_threads() {
    let shared = SharedBackend::new(registry());
    let mut table = SessionTable::new(4);

    let handles: Vec<_> = (0..3)
        .map(|n| {
            let sid = table.attach().unwrap();
            let mut backend = shared.clone();
            let input = format!("WRITE adc0 sampling_frequency 4\n{}000READ adc0 name\n", n + 1);
            thread::spawn(move || {
                let mut s = Session::new(
                    sid,
                    MemoryTransport::with_input(input),
                    Default::default(),
                );
                s.run(&mut backend).unwrap();
                s.into_transport().take_output()
            })
        })
        .collect();

    for h in handles {
        assert_eq!(h.join().unwrap(), b"4\n4\nadc0\r\n");
    }
    assert_eq!(table.len(), 3);

    let mut out = [0u8; 8];
    let n = shared
        .with(|reg| {
            use iiod::backend::{AttrKind, Backend};
            use iiod::protocol::SessionId;
            reg.read_attr(SessionId::SINGLE, "adc0", "sampling_frequency", &mut out, AttrKind::Device)
        })
        .unwrap();
    assert!(matches!(&out[..n], b"1000" | b"2000" | b"3000"));
}
