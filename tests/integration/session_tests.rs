//! Dispatcher behaviour: one command in, one response out.

use iiod::backend::AttrKind;
use iiod::config::EngineConfig;
use iiod::error::{Errno, ProtocolError};
use iiod::protocol::{Flow, MemoryTransport, Session, SessionId};

use super::mock_backend::{Call, MockBackend};

fn run_script(input: &[u8], mock: &mut MockBackend) -> Vec<u8> {
    let mut session = Session::single(MemoryTransport::with_input(input));
    session.run(mock).unwrap();
    session.into_transport().take_output()
}

#[test]
fn version_line_shape() {
    let mut mock = MockBackend::new();
    let out = String::from_utf8(run_script(b"VERSION\n", &mut mock)).unwrap();
    let line = out.strip_suffix('\n').unwrap();
    let parts: Vec<&str> = line.splitn(3, '.').collect();
    assert_eq!(parts.len(), 3, "{line}");
    assert!(parts[0].bytes().all(|b| b.is_ascii_digit()));
    assert!(parts[1].bytes().all(|b| b.is_ascii_digit()));
    assert!((1..=7).contains(&parts[2].len()));
    assert!(!parts[2].contains(char::is_whitespace));
    assert!(mock.calls.is_empty(), "VERSION never reaches the backend");
}

#[test]
fn configured_version_is_reported() {
    let mut mock = MockBackend::new();
    let mut config = EngineConfig::default();
    config.version.major = 3;
    config.version.minor = 14;
    config.version.tag = heapless::String::try_from("abc1234").unwrap();
    let mut session = Session::new(
        SessionId::SINGLE,
        MemoryTransport::with_input(b"VERSION\n"),
        config,
    );
    session.run(&mut mock).unwrap();
    assert_eq!(session.transport().output(), b"3.14.abc1234\n");
}

#[test]
fn print_frames_discovery_text() {
    let mut mock = MockBackend::new();
    mock.discovery = "<context name=\"x\"/>".into();
    assert_eq!(
        run_script(b"PRINT\n", &mut mock),
        b"19\n<context name=\"x\"/>\n"
    );
}

#[test]
fn debug_write_reaches_backend_once() {
    let mut mock = MockBackend::new();
    let out = run_script(b"WRITE adc0 DEBUG direct_reg 1\n\x05", &mut mock);
    assert_eq!(out, b"1\n");
    assert_eq!(
        mock.calls,
        vec![Call::WriteAttr {
            device: "adc0".into(),
            attr: "direct_reg".into(),
            data: vec![0x05],
            kind: AttrKind::Debug,
        }]
    );
}

#[test]
fn scope_prefixes_select_backend_entry_point() {
    let mut mock = MockBackend::new();
    mock.attr_value = b"7".to_vec();
    let out = run_script(
        b"READ adc0 raw\nREAD adc0 OUTPUT altvoltage0 frequency\nREAD adc0 BUFFER length\nREAD adc0\n",
        &mut mock,
    );
    assert_eq!(out, b"1\n7\r\n1\n7\r\n1\n7\r\n1\n7\r\n");
    assert_eq!(
        mock.calls,
        vec![
            Call::ReadAttr {
                device: "adc0".into(),
                attr: "raw".into(),
                kind: AttrKind::Device,
            },
            Call::ChReadAttr {
                channel: "altvoltage0".into(),
                output: true,
                attr: "frequency".into(),
            },
            Call::ReadAttr {
                device: "adc0".into(),
                attr: "length".into(),
                kind: AttrKind::Buffer,
            },
            Call::ReadAttr {
                device: "adc0".into(),
                attr: String::new(),
                kind: AttrKind::Device,
            },
        ]
    );
}

#[test]
fn channel_write_carries_payload() {
    let mut mock = MockBackend::new();
    let out = run_script(b"WRITE adc0 INPUT voltage0 raw 3\n123", &mut mock);
    assert_eq!(out, b"3\n");
    assert_eq!(
        mock.calls,
        vec![Call::ChWriteAttr {
            channel: "voltage0".into(),
            output: false,
            attr: "raw".into(),
            data: b"123".to_vec(),
        }]
    );
}

#[test]
fn grammar_errors_answer_einval_and_continue() {
    let mut mock = MockBackend::new();
    let out = run_script(
        b"FROB\nversion\nREAD adc0 raw 4\nWRITE adc0 raw\nOPEN adc0 -1 f\nOPEN adc0 1 0x1\nREADBUF adc0 4 extra\nGETTRIG\n",
        &mut mock,
    );
    assert_eq!(out, b"-22\n-22\n-22\n-22\n-22\n-22\n-22\n-19\n");
    assert!(mock.calls.is_empty());
}

#[test]
fn blank_lines_change_nothing() {
    let mut mock = MockBackend::new();
    let mut session = Session::single(MemoryTransport::with_input(b"\n \t \r\n"));
    assert_eq!(session.step(&mut mock), Ok(Flow::Continue));
    assert!(session.transport().output().is_empty());
    assert!(mock.calls.is_empty());
}

#[test]
fn open_close_readbuf_after_close_is_negative() {
    let mut mock = MockBackend::new();
    let out = run_script(b"OPEN adc0 100 f\nCLOSE adc0\nREADBUF adc0 10\n", &mut mock);
    assert_eq!(out, b"0\n0\n-9\n");
    assert_eq!(
        mock.calls,
        vec![
            Call::Open {
                device: "adc0".into(),
                sample_size: 100,
                mask: 0xf,
            },
            Call::Close {
                device: "adc0".into(),
            },
        ]
    );
}

#[test]
fn failed_open_leaves_no_context() {
    let mut mock = MockBackend::new();
    mock.open_result = Err(Errno::from_code(-1));
    let out = run_script(b"OPEN adc0 8 1\nREADBUF adc0 4\n", &mut mock);
    assert_eq!(out, b"-1\n-9\n");
    // Teardown has nothing to close.
    assert_eq!(mock.count(|c| matches!(c, Call::Close { .. })), 0);
}

#[test]
fn close_is_forwarded_without_context() {
    let mut mock = MockBackend::new();
    assert_eq!(run_script(b"CLOSE adc0\n", &mut mock), b"0\n");
    assert_eq!(mock.count(|c| matches!(c, Call::Close { .. })), 1);
}

#[test]
fn timeout_without_hook_is_zero() {
    let mut mock = MockBackend::new();
    assert_eq!(run_script(b"TIMEOUT 250\n", &mut mock), b"0\n");
    assert!(mock.calls.is_empty());

    mock.timeout_hook = Some(Err(Errno::EINVAL));
    assert_eq!(run_script(b"TIMEOUT 250\n", &mut mock), b"-22\n");
    assert_eq!(mock.calls, vec![Call::SetTimeout { ms: 250 }]);
}

#[test]
fn disconnect_closes_every_open_context() {
    let mut mock = MockBackend::new();
    let out = run_script(b"OPEN adc0 4 1\nOPEN dac0 4 1\n", &mut mock);
    assert_eq!(out, b"0\n0\n");
    let mut closed: Vec<String> = mock
        .calls
        .iter()
        .filter_map(|c| match c {
            Call::Close { device } => Some(device.clone()),
            _ => None,
        })
        .collect();
    closed.sort();
    assert_eq!(closed, ["adc0", "dac0"]);
}

#[test]
fn session_id_is_threaded_through_every_call() {
    let mut mock = MockBackend::new();
    let sid = SessionId::new(42);
    let mut session = Session::new(
        sid,
        MemoryTransport::with_input(b"PRINT\nREAD adc0 raw\nOPEN adc0 1 1\nEXIT\n"),
        EngineConfig::default(),
    );
    session.run(&mut mock).unwrap();
    assert!(!mock.sessions_seen.is_empty());
    assert!(mock.sessions_seen.iter().all(|s| *s == sid));
}

#[test]
fn write_payload_cut_short_ends_session() {
    let mut mock = MockBackend::new();
    let mut session = Session::single(MemoryTransport::with_input(b"WRITE adc0 raw 10\nabc"));
    assert_eq!(session.step(&mut mock), Err(ProtocolError::Disconnected));
    assert!(mock.calls.is_empty());
    assert!(session.transport().output().is_empty());
}
