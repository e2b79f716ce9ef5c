//! Catalog, value file, edits and device commands working together
//!
//! The device is a scripted line stream. No hardware is involved.

use std::{
    collections::VecDeque,
    io::{self, Read},
    path::Path,
    sync::{mpsc, Arc, Mutex},
    time::Duration,
};

use indoc::indoc;
use regscope::{
    Ack, CommandState, EditPolicy, FieldSelector, LineTransport, ProtocolError, Session,
    SessionConfig, Transport, WorkingSet,
};

const WAIT: Duration = Duration::from_secs(5);

fn demo_catalog() -> regscope::Catalog {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/vl6180x.json");
    regscope::load_catalog(&path).unwrap()
}

/// Device end of the line: answers each received line with the next scripted response
struct ScriptedDevice {
    responses: VecDeque<String>,
    received: Arc<Mutex<Vec<String>>>,
    pending: Vec<u8>,
    to_host: mpsc::Sender<Vec<u8>>,
}

impl io::Write for ScriptedDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            self.received
                .lock()
                .unwrap()
                .push(String::from_utf8(line).unwrap());
            if let Some(response) = self.responses.pop_front() {
                // Host may have hung up, nothing to answer then
                let _ = self.to_host.send(response.into_bytes());
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Host end of the line, blocks until the device answers
struct HostReader {
    from_device: mpsc::Receiver<Vec<u8>>,
    chunk: io::Cursor<Vec<u8>>,
}

impl io::Read for HostReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.chunk.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            match self.from_device.recv() {
                Ok(chunk) => self.chunk = io::Cursor::new(chunk),
                Err(_) => return Ok(0),
            }
        }
    }
}

/// Session whose device answers with `responses`, one line per command
///
/// Also returns every line the device received.
fn scripted_session(
    responses: &str,
    config: SessionConfig,
) -> (Session<LineTransport<ScriptedDevice>>, Arc<Mutex<Vec<String>>>) {
    let (tx, rx) = mpsc::channel();
    let received = Arc::new(Mutex::new(vec![]));
    let device = ScriptedDevice {
        responses: responses.lines().map(|line| format!("{line}\r\n")).collect(),
        received: Arc::clone(&received),
        pending: vec![],
        to_host: tx,
    };
    let reader = HostReader {
        from_device: rx,
        chunk: io::Cursor::new(vec![]),
    };
    let session = Session::new(LineTransport::new(reader, device), config);
    (session, received)
}

#[test]
fn demo_catalog_loads() {
    let catalog = demo_catalog();
    let slave_addr = catalog.get(0x212).unwrap();
    assert_eq!(slave_addr.name, "I2C_SLAVE__DEVICE_ADDRESS");
    assert_eq!(slave_addr.reset_value, 0x29);
    assert!(catalog.iter().all(|reg| reg.bits <= 32));
    assert!(catalog.windows(2).all(|w| w[0].address < w[1].address));

    let als = catalog.get(0x50).unwrap();
    assert_eq!(als.fields().len(), 1);
    for i in 0..8u64 {
        let history = catalog.get(0x52 + 2 * i).unwrap();
        assert_eq!(history.name, format!("RESULT__HISTORY_BUFFER_{i}"));
        assert_eq!(history.bits, 16);
        let field = &history.fields()[0];
        assert_eq!(field.name, format!("result__history_buffer_{i}"));
        assert_eq!(field.access, regscope::Access::ReadOnly);
    }
}

#[test]
fn value_file_edit_round_trip() {
    let catalog = demo_catalog();
    let text = indoc! {"
        00000212,29
        0000001E,0000
        0000006C,00000000
        DEADBEEF,01
    "};
    let mut set = WorkingSet::from_entries(&catalog, regscope::parse_value_lines(text));
    assert_eq!(set.len(), 3);

    // Move the sensor to I2C address 0x2A, keep the reserved bit
    set.edit_field(
        0x212,
        &FieldSelector::Name("super_i2c_slave__device_address".to_owned()),
        0x2a,
        EditPolicy::RejectReadOnly,
    )
    .unwrap();
    assert!(set
        .edit_field(0x212, &"RESERVED".parse().unwrap(), 1, EditPolicy::RejectReadOnly)
        .is_err());
    set.set_register(0x6c, 0xdead_beef).unwrap();

    let rendered = regscope::render_value_lines(set.iter());
    assert_eq!(
        rendered,
        indoc! {"
            0000001E,0000
            0000006C,DEADBEEF
            00000212,2A
        "}
    );

    let reloaded = WorkingSet::from_entries(&catalog, regscope::parse_value_lines(&rendered));
    let values: Vec<_> = reloaded.iter().map(|reg| reg.value()).collect();
    let original: Vec<_> = set.iter().map(|reg| reg.value()).collect();
    assert_eq!(values, original);
}

#[test]
fn read_then_write_back_edited_field() {
    let catalog = demo_catalog();
    let spec = catalog.get(0x212).unwrap();
    let (mut session, received) = scripted_session(
        indoc! {"
            RWI2C 1,0,0,1,82,530,41
            RWI2C 1,0
        "},
        SessionConfig::default().timeout(WAIT),
    );

    let value = session.read_register(spec).unwrap();
    assert_eq!(session.state(), CommandState::Decoded);

    let mut set = WorkingSet::new(&catalog);
    set.insert(0x212).unwrap();
    set.set_register(0x212, value).unwrap();
    set.edit_field(0x212, &FieldSelector::Index(0), 0x2a, EditPolicy::RejectReadOnly)
        .unwrap();
    let edited = set.get(0x212).unwrap().value();
    assert_eq!(edited, 0x2a);

    assert_eq!(session.write_register(spec, edited).unwrap(), Ack::Success);
    session.close();

    assert_eq!(
        *received.lock().unwrap(),
        ["RWI2C 1,0,1,82,530\n", "RWI2C 1,1,1,82,530,42\n"]
    );
}

#[test]
fn wide_register_is_checked_before_sending() {
    let catalog = demo_catalog();
    let spec = catalog.get(0x6c).unwrap();
    assert_eq!(spec.bits, 32);

    let (mut session, received) =
        scripted_session("RWI2C 1,0\n", SessionConfig::default().timeout(WAIT));
    assert!(matches!(
        session.write_register(spec, 0x1_0000),
        Err(ProtocolError::Bounds(_))
    ));
    assert_eq!(session.state(), CommandState::Idle);
    assert!(received.lock().unwrap().is_empty());
    assert_eq!(session.write_register(spec, 0xffff).unwrap(), Ack::Success);
    assert_eq!(*received.lock().unwrap(), ["RWI2C 1,1,1,82,108,65535\n"]);
}

#[test]
fn silent_device_times_out() {
    let catalog = demo_catalog();
    let spec = catalog.get(0x212).unwrap();
    let timeout = Duration::from_millis(50);
    let (mut session, received) =
        scripted_session("", SessionConfig::default().timeout(timeout).board_id(3));

    assert!(matches!(
        session.read_register(spec),
        Err(ProtocolError::Timeout(t)) if t == timeout
    ));
    assert_eq!(session.state(), CommandState::Timeout);
    assert_eq!(*received.lock().unwrap(), ["RWI2C 3,0,1,82,530\n"]);
}

#[test]
fn version_queries() {
    let (mut session, received) = scripted_session(
        indoc! {"
            RHVER 1,0,1.0.0
            RFVER 1,0,0.1.3
        "},
        SessionConfig::default().timeout(WAIT),
    );
    assert_eq!(session.hardware_version().unwrap(), "1.0.0");
    assert_eq!(session.firmware_version().unwrap(), "0.1.3");
    assert_eq!(*received.lock().unwrap(), ["RHVER 1\n", "RFVER 1\n"]);
}

#[test]
fn transport_writes_frames() {
    let reader = io::Cursor::new(b"RHVER 1,0,1.0.0\n".to_vec());
    let mut transport = LineTransport::new(reader, vec![]);
    transport.send_line("RHVER 1\n").unwrap();
    assert_eq!(transport.writer().unwrap(), b"RHVER 1\n");
    assert_eq!(
        transport.recv_line(WAIT).unwrap(),
        "RHVER 1,0,1.0.0"
    );
}
