//! READBUF / WRITEBUF streaming against the mock backend.

use iiod::config::EngineConfig;
use iiod::error::{Errno, ProtocolError};
use iiod::protocol::buffer::TransferState;
use iiod::protocol::{MemoryTransport, Session, SessionId};
use proptest::prelude::*;

use super::mock_backend::{Call, MockBackend};

const OPEN: &[u8] = b"OPEN adc0 64 f\n";

fn session_with_chunk(input: &[u8], chunk_size: usize) -> Session<MemoryTransport> {
    let mut t = MemoryTransport::with_input(OPEN);
    t.push_input(input);
    Session::new(
        SessionId::SINGLE,
        t,
        EngineConfig {
            chunk_size,
            ..EngineConfig::default()
        },
    )
}

/// Run OPEN plus one buffer command, returning the buffer command's output.
fn buffer_exchange(input: &[u8], chunk_size: usize, mock: &mut MockBackend) -> Vec<u8> {
    let mut s = session_with_chunk(input, chunk_size);
    s.step(mock).unwrap();
    assert_eq!(s.transport_mut().take_output(), b"0\n");
    s.step(mock).unwrap();
    s.transport_mut().take_output()
}

/// Split a READBUF response into (counts, mask lines, payload bytes).
fn parse_readbuf(mut out: &[u8]) -> (Vec<i64>, usize, Vec<u8>) {
    let mut counts = Vec::new();
    let mut masks = 0;
    let mut payload = Vec::new();
    while !out.is_empty() {
        let nl = out.iter().position(|b| *b == b'\n').unwrap();
        let count: i64 = std::str::from_utf8(&out[..nl]).unwrap().parse().unwrap();
        out = &out[nl + 1..];
        counts.push(count);
        if count <= 0 {
            break;
        }
        if counts.len() == 1 {
            assert_eq!(out[8], b'\n', "mask line follows first count");
            masks += 1;
            out = &out[9..];
        }
        let n = count as usize;
        payload.extend_from_slice(&out[..n]);
        out = &out[n..];
    }
    (counts, masks, payload)
}

#[test]
fn readbuf_mask_once_and_counts_sum() {
    let mut mock = MockBackend::new();
    mock.mask = 0xab;
    let out = buffer_exchange(b"READBUF adc0 10\n", 4, &mut mock);
    assert!(out.starts_with(b"4\n000000ab\n"));
    let (counts, masks, payload) = parse_readbuf(&out);
    assert_eq!(counts, [4, 4, 2]);
    assert_eq!(masks, 1);
    assert_eq!(payload, (0u8..10).collect::<Vec<_>>());
}

proptest! {
    /// Whatever the mask, it is echoed once as eight lowercase hex digits
    /// right after the first count.
    #[test]
    fn readbuf_echoes_any_mask(mask in any::<u32>(), len in 1usize..64, chunk in 1usize..16) {
        let mut mock = MockBackend::new();
        mock.mask = mask;
        let out = buffer_exchange(format!("READBUF adc0 {len}\n").as_bytes(), chunk, &mut mock);
        let (counts, masks, payload) = parse_readbuf(&out);
        let first = format!("{}\n{mask:08x}\n", counts[0]);
        prop_assert!(out.starts_with(first.as_bytes()));
        prop_assert_eq!(masks, 1);
        prop_assert_eq!(counts.iter().sum::<i64>(), len as i64);
        prop_assert_eq!(payload.len(), len);
    }
}

#[test]
fn readbuf_follows_backend_progress() {
    let mut mock = MockBackend::new();
    mock.read_cap = Some(3);
    let out = buffer_exchange(b"READBUF adc0 7\n", 4, &mut mock);
    let (counts, _, payload) = parse_readbuf(&out);
    assert_eq!(counts, [3, 3, 1]);
    assert_eq!(payload.len(), 7);
    let offsets: Vec<usize> = mock
        .calls
        .iter()
        .filter_map(|c| match c {
            Call::ReadData { offset, .. } => Some(*offset),
            _ => None,
        })
        .collect();
    assert_eq!(offsets, [0, 3, 6]);
}

#[test]
fn readbuf_clamps_overreported_counts() {
    let mut mock = MockBackend::new();
    mock.read_overreport = true;
    let out = buffer_exchange(b"READBUF adc0 6\n", 4, &mut mock);
    let (counts, _, payload) = parse_readbuf(&out);
    assert_eq!(counts, [4, 2]);
    assert_eq!(payload.len(), 6);
}

#[test]
fn readbuf_stalled_backend_answers_eio() {
    let mut mock = MockBackend::new();
    mock.read_cap = Some(0);
    let mut s = session_with_chunk(b"READBUF adc0 8\nGETTRIG\n", 4);
    s.step(&mut mock).unwrap();
    s.step(&mut mock).unwrap();
    assert_eq!(s.last_transfer().unwrap().state, TransferState::Failed);
    s.step(&mut mock).unwrap();
    assert_eq!(s.transport().output(), b"0\n-5\n-19\n");
}

#[test]
fn readbuf_mask_failure_is_only_line() {
    let mut mock = MockBackend::new();
    mock.mask_result = Some(Errno::ENODEV);
    let out = buffer_exchange(b"READBUF adc0 8\n", 4, &mut mock);
    assert_eq!(out, b"-19\n");
    assert_eq!(mock.count(|c| matches!(c, Call::ReadData { .. })), 0);
}

#[test]
fn readbuf_capture_hook_runs_once_with_full_length() {
    let mut mock = MockBackend::new();
    mock.transfer_hooks = Some(Ok(0));
    buffer_exchange(b"READBUF adc0 12\n", 4, &mut mock);
    assert_eq!(
        mock.count(|c| *c == Call::TransferDevToMem { bytes: 12 }),
        1
    );

    let mut failing = MockBackend::new();
    failing.transfer_hooks = Some(Err(Errno::ENOMEM));
    let out = buffer_exchange(b"READBUF adc0 12\n", 4, &mut failing);
    assert_eq!(out, b"-12\n");
}

#[test]
fn writebuf_acks_stages_and_reports() {
    let mut mock = MockBackend::new();
    mock.transfer_hooks = Some(Ok(0));
    let mut input = b"WRITEBUF adc0 10\n".to_vec();
    input.extend_from_slice(b"0123456789");
    let out = buffer_exchange(&input, 4, &mut mock);
    assert_eq!(out, b"10\n10\n");
    assert_eq!(mock.written_data(), b"0123456789");
    assert_eq!(
        mock.calls.last(),
        Some(&Call::TransferMemToDev { bytes: 10 })
    );
}

#[test]
fn writebuf_short_writes_lose_unconsumed_bytes() {
    let mut mock = MockBackend::new();
    mock.write_cap = Some(2);
    let mut input = b"WRITEBUF adc0 6\n".to_vec();
    input.extend_from_slice(b"abcdefghij");
    let mut s = session_with_chunk(&input, 4);
    s.step(&mut mock).unwrap();
    s.step(&mut mock).unwrap();
    // Reads of 4, 4 and 2 bytes; the backend keeps at most 2 of each.
    assert_eq!(mock.written_data(), b"abefij");
    assert_eq!(s.transport().output(), b"0\n6\n6\n");
    assert_eq!(s.transport().pending_input(), 0);
}

#[test]
fn writebuf_clamps_overreported_consumption() {
    let mut mock = MockBackend::new();
    mock.write_overreport = true;
    let mut s = session_with_chunk(b"WRITEBUF adc0 8\nabc", 4);
    s.step(&mut mock).unwrap();
    let err = s.step(&mut mock).unwrap_err();
    assert_eq!(
        err,
        ProtocolError::IncompleteTransfer {
            expected: 8,
            transferred: 3
        }
    );
    assert_eq!(mock.written_data(), b"abc");
    assert_eq!(s.transport().output(), b"0\n8\n");
}

#[test]
fn writebuf_overreport_stops_at_declared_length() {
    let mut mock = MockBackend::new();
    mock.write_overreport = true;
    let mut s = session_with_chunk(b"WRITEBUF adc0 6\nabcdefGETTRIG\n", 4);
    s.run(&mut mock).unwrap();
    assert_eq!(mock.written_data(), b"abcdef");
    assert_eq!(s.transport().output(), b"0\n6\n6\n-19\n");
}

#[test]
fn writebuf_peer_hangup_is_incomplete_transfer() {
    let mut mock = MockBackend::new();
    let mut s = session_with_chunk(b"WRITEBUF adc0 8\nabc", 4);
    s.step(&mut mock).unwrap();
    let err = s.step(&mut mock).unwrap_err();
    assert_eq!(
        err,
        ProtocolError::IncompleteTransfer {
            expected: 8,
            transferred: 3
        }
    );
    assert!(err.is_fatal());
    assert_eq!(err.errno(), Errno::EIO);
}

#[test]
fn writebuf_backend_error_drains_and_continues() {
    let mut mock = MockBackend::new();
    mock.write_error = Some(Errno::EIO);
    let mut input = b"WRITEBUF adc0 6\n".to_vec();
    input.extend_from_slice(b"xxxxxx");
    input.extend_from_slice(b"GETTRIG\n");
    let mut s = session_with_chunk(&input, 4);
    s.run(&mut mock).unwrap();
    assert_eq!(s.transport().output(), b"0\n6\n-5\n-19\n");
}

#[test]
fn writebuf_zero_length_reports_zero() {
    let mut mock = MockBackend::new();
    let out = buffer_exchange(b"WRITEBUF adc0 0\n", 4, &mut mock);
    assert_eq!(out, b"0\n0\n");
}
