//! Line channel to the device
//!
//! The serial device itself is opened and configured outside of this crate (baud rate etc. via
//! the OS). A transport only moves `\n`-terminated lines in both directions.

use std::{
    io::{self, BufRead, BufReader, Write},
    sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError},
    thread,
    time::Duration,
};

use log::debug;

use crate::error::{ChannelError, ProtocolError};

/// A half-duplex line channel
///
/// Responses are matched to commands by arrival order only.
pub trait Transport {
    /// Write one line, terminator included
    fn send_line(&mut self, line: &str) -> Result<(), ChannelError>;

    /// Wait at most `timeout` for the next line, terminator stripped
    fn recv_line(&mut self, timeout: Duration) -> Result<String, ProtocolError>;

    /// Remove and return every line that has already arrived
    fn drain(&mut self) -> Vec<String>;

    /// Close the channel. Any later call fails with [`ChannelError::NotOpen`].
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Transport over a writer and a reader, e.g., two handles of one serial device file
///
/// The reader is consumed by a background thread that forwards lines over a channel, so that
/// waiting for a response can time out.
pub struct LineTransport<W: Write> {
    writer: Option<W>,
    lines: Receiver<io::Result<String>>,
    reader: Option<thread::JoinHandle<()>>,
}

impl<W: Write> LineTransport<W> {
    pub fn new<R>(reader: R, writer: W) -> Self
    where
        R: io::Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || {
            for line in BufReader::new(reader).lines() {
                let failed = line.is_err();
                // Receiver gone means the transport was dropped
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
            debug!("reader thread exits");
        });
        Self {
            writer: Some(writer),
            lines: rx,
            reader: Some(reader),
        }
    }

    /// Writer end, `None` once closed
    pub fn writer(&self) -> Option<&W> {
        self.writer.as_ref()
    }
}

impl<W: Write> Transport for LineTransport<W> {
    fn send_line(&mut self, line: &str) -> Result<(), ChannelError> {
        let writer = self.writer.as_mut().ok_or(ChannelError::NotOpen)?;
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn recv_line(&mut self, timeout: Duration) -> Result<String, ProtocolError> {
        if self.writer.is_none() {
            return Err(ChannelError::NotOpen.into());
        }
        match self.lines.recv_timeout(timeout) {
            Ok(Ok(line)) => Ok(line.trim_end_matches('\r').to_owned()),
            Ok(Err(e)) => {
                self.close();
                Err(ChannelError::Io(e).into())
            }
            Err(RecvTimeoutError::Timeout) => Err(ProtocolError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                self.close();
                Err(ChannelError::Closed.into())
            }
        }
    }

    fn drain(&mut self) -> Vec<String> {
        let mut stale = vec![];
        loop {
            match self.lines.try_recv() {
                Ok(Ok(line)) => stale.push(line.trim_end_matches('\r').to_owned()),
                Ok(Err(_)) | Err(TryRecvError::Disconnected) => {
                    self.close();
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        stale
    }

    /// Close the writer and release the reader thread
    ///
    /// A reader thread that already hit end-of-file is joined. One still blocked on the device
    /// cannot be interrupted from here: it is detached and exits on its first read after the
    /// transport is dropped, or with the process.
    fn close(&mut self) {
        if self.writer.take().is_some() {
            debug!("transport closed");
        }
        match self.reader.take() {
            Some(reader) if reader.is_finished() => {
                if reader.join().is_err() {
                    debug!("reader thread panicked");
                }
            }
            Some(_) => debug!("reader thread still blocked on the device, detached"),
            None => {}
        }
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

/// Reader fed byte chunks from a channel, blocks until a chunk arrives
#[cfg(test)]
struct ChunkReader(Receiver<Vec<u8>>, io::Cursor<Vec<u8>>);

#[cfg(test)]
impl io::Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;

        loop {
            let n = self.1.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            match self.0.recv() {
                Ok(chunk) => self.1 = io::Cursor::new(chunk),
                // Sender gone, report end-of-file
                Err(_) => return Ok(0),
            }
        }
    }
}

#[cfg(test)]
fn chunk_transport() -> (mpsc::Sender<Vec<u8>>, LineTransport<Vec<u8>>) {
    let (tx, rx) = mpsc::channel();
    let reader = ChunkReader(rx, io::Cursor::new(vec![]));
    (tx, LineTransport::new(reader, vec![]))
}

#[cfg(test)]
const WAIT: Duration = Duration::from_secs(5);

#[test]
fn line_transport_moves_lines() {
    let (device, mut transport) = chunk_transport();
    transport.send_line("RHVER 1\n").unwrap();
    assert_eq!(transport.writer().unwrap(), b"RHVER 1\n");

    device.send(b"RHVER 1,0,1.0".to_vec()).unwrap();
    device.send(b".0\r\n".to_vec()).unwrap();
    assert_eq!(transport.recv_line(WAIT).unwrap(), "RHVER 1,0,1.0.0");
}

#[test]
fn line_transport_times_out() {
    let (_device, mut transport) = chunk_transport();
    let timeout = Duration::from_millis(20);
    assert!(matches!(
        transport.recv_line(timeout),
        Err(ProtocolError::Timeout(t)) if t == timeout
    ));
    assert!(transport.is_open());
}

#[test]
fn line_transport_closes_on_end_of_file() {
    let (device, mut transport) = chunk_transport();
    drop(device);
    assert!(matches!(
        transport.recv_line(WAIT),
        Err(ProtocolError::Channel(ChannelError::Closed))
    ));
    assert!(!transport.is_open());
    assert!(matches!(
        transport.send_line("RHVER 1\n"),
        Err(ChannelError::NotOpen)
    ));
}

#[test]
fn line_transport_drains_stale_lines() {
    let (device, mut transport) = chunk_transport();
    device.send(b"RWI2C 1,0\nRWI2C 1,1\nRWI2C 1,0,0,1,82,46,5\n".to_vec()).unwrap();
    assert_eq!(transport.recv_line(WAIT).unwrap(), "RWI2C 1,0");

    let mut stale = vec![];
    for _ in 0..500 {
        stale.extend(transport.drain());
        if stale.len() == 2 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(stale, ["RWI2C 1,1", "RWI2C 1,0,0,1,82,46,5"]);
    assert!(transport.is_open());
}

#[test]
fn close_joins_finished_reader() {
    let (device, mut transport) = chunk_transport();
    drop(device);
    for _ in 0..500 {
        if transport.reader.as_ref().is_some_and(thread::JoinHandle::is_finished) {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    transport.close();
    assert!(transport.reader.is_none());
    assert!(!transport.is_open());
}

#[test]
fn close_detaches_blocked_reader() {
    let (device, mut transport) = chunk_transport();
    transport.close();
    assert!(transport.reader.is_none());
    // Lines arriving after close are not handed out
    device.send(b"RWI2C 1,0\n".to_vec()).unwrap();
    assert!(matches!(
        transport.recv_line(WAIT),
        Err(ProtocolError::Channel(ChannelError::NotOpen))
    ));
}
