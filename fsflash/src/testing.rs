//! In-memory ports and log capture for unit tests.

use {
    crate::{
        error::TransportError,
        port::Port,
        protocol::{
            checksum::checksum,
            command::{Opcode, request_write_ack, write_chunk_ack},
            frame::encode_device_frame,
        },
    },
    log::{Level, LevelFilter, Log, Metadata, Record},
    std::{
        cell::RefCell,
        collections::VecDeque,
        io::{self, Read, Write},
        sync::Once,
        time::Duration,
    },
};

thread_local! {
    static EVENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Append to this thread's event list.
pub(crate) fn record_event(event: impl Into<String>) {
    EVENTS.with(|events| events.borrow_mut().push(event.into()));
}

/// Take and clear this thread's event list.
pub(crate) fn take_events() -> Vec<String> {
    EVENTS.with(|events| std::mem::take(&mut *events.borrow_mut()))
}

/// Records warnings and errors as events, then hands every record to
/// `env_logger`.
struct CaptureLogger {
    inner: env_logger::Logger,
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        if record.level() <= Level::Warn {
            record_event(format!("{}: {}", record.level(), record.args()));
        }
        if self.inner.matches(record) {
            self.inner.log(record);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the capturing test logger once per test binary.
pub(crate) fn init_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let inner = env_logger::Builder::from_default_env()
            .is_test(true)
            .build();
        let logger: &'static CaptureLogger = Box::leak(Box::new(CaptureLogger { inner }));
        if log::set_logger(logger).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
}

/// Mock serial port with separate read/write buffers.
///
/// Reads from an empty buffer fail with `TimedOut`, like a serial port whose
/// read timeout elapsed.
pub(crate) struct MockPort {
    read_buf: VecDeque<u8>,
    write_buf: Vec<u8>,
    write_limit: Option<usize>,
    read_limit: Option<usize>,
    timeout: Duration,
    read_calls: usize,
}

impl MockPort {
    pub(crate) fn new() -> Self {
        Self {
            read_buf: VecDeque::new(),
            write_buf: Vec::new(),
            write_limit: None,
            read_limit: None,
            timeout: Duration::from_secs(1),
            read_calls: 0,
        }
    }

    /// Accept at most `limit` bytes per write call.
    pub(crate) fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Return at most `limit` bytes per read call.
    pub(crate) fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = Some(limit);
        self
    }

    pub(crate) fn push_input(&mut self, data: &[u8]) {
        self.read_buf.extend(data.iter().copied());
    }

    pub(crate) fn written(&self) -> &[u8] {
        &self.write_buf
    }

    pub(crate) fn read_calls(&self) -> usize {
        self.read_calls
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_calls += 1;
        if self.read_buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf
            .len()
            .min(self.read_buf.len())
            .min(self.read_limit.unwrap_or(usize::MAX));
        for b in buf.iter_mut().take(n) {
            *b = self.read_buf.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.write_limit.unwrap_or(usize::MAX));
        self.write_buf.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn bytes_to_read(&mut self) -> Result<usize, TransportError> {
        Ok(self.read_buf.len())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) {}
}

/// How a simulated device misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FaultKind {
    /// Answer a request-write with a wrong acknowledgement.
    RejectRequestWrite,
    /// Answer a write-chunk with a wrong opcode.
    RejectChunk,
    /// Answer a write-chunk with a frame whose checksum is broken.
    CorruptChunkAck,
    /// Do not answer a request-write at all.
    SilentRequestWrite,
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    kind: FaultKind,
    address: u16,
    remaining: u32,
}

/// Simulated boot loader speaking the device side of the protocol.
pub(crate) struct SimDevice {
    input: VecDeque<u8>,
    pending: Vec<u8>,
    ping_reply: Vec<u8>,
    faults: Vec<Fault>,
    timeout: Duration,
    /// Every request payload received, in order.
    pub(crate) requests: Vec<Vec<u8>>,
    /// Device flash, indexed by address.
    pub(crate) flash: Vec<u8>,
    pub(crate) restarted: bool,
    pub(crate) closed: bool,
}

impl SimDevice {
    pub(crate) fn new() -> Self {
        Self {
            input: VecDeque::new(),
            pending: Vec::new(),
            ping_reply: vec![Opcode::Ping.byte(), 0x80],
            faults: Vec::new(),
            timeout: Duration::from_secs(1),
            requests: Vec::new(),
            flash: vec![0xFF; 0x1_0000],
            restarted: false,
            closed: false,
        }
    }

    pub(crate) fn with_ping_reply(mut self, reply: &[u8]) -> Self {
        self.ping_reply = reply.to_vec();
        self
    }

    /// Misbehave `times` times for exchanges targeting `address`.
    pub(crate) fn with_fault(mut self, kind: FaultKind, address: u16, times: u32) -> Self {
        self.faults.push(Fault {
            kind,
            address,
            remaining: times,
        });
        self
    }

    /// Queue raw bytes as if the device had sent them unprompted.
    pub(crate) fn push_noise(&mut self, data: &[u8]) {
        self.input.extend(data.iter().copied());
    }

    /// Opcodes of all requests received, in order.
    pub(crate) fn opcodes(&self) -> Vec<u8> {
        self.requests
            .iter()
            .map(|r| r[0])
            .collect()
    }

    /// Addresses of all request-write requests, in order.
    pub(crate) fn request_write_addresses(&self) -> Vec<u16> {
        self.requests
            .iter()
            .filter(|r| r[0] == Opcode::RequestWrite.byte())
            .map(|r| u16::from_le_bytes([r[1], r[2]]))
            .collect()
    }

    fn take_fault(&mut self, kinds: &[FaultKind], address: u16) -> Option<FaultKind> {
        let fault = self
            .faults
            .iter_mut()
            .find(|f| f.address == address && f.remaining > 0 && kinds.contains(&f.kind))?;
        fault.remaining -= 1;
        Some(fault.kind)
    }

    fn reply(&mut self, payload: &[u8]) {
        let frame = encode_device_frame(payload).unwrap();
        self.input.extend(frame);
    }

    fn handle(&mut self, payload: Vec<u8>) {
        let opcode = payload[0];
        let address = if payload.len() >= 3 {
            u16::from_le_bytes([payload[1], payload[2]])
        } else {
            0
        };
        self.requests.push(payload.clone());

        match opcode {
            0xC0 => {
                let reply = self.ping_reply.clone();
                self.reply(&reply);
            },
            0xC1 => self.restarted = true,
            0xC2 => match self.take_fault(
                &[FaultKind::RejectRequestWrite, FaultKind::SilentRequestWrite],
                address,
            ) {
                Some(FaultKind::SilentRequestWrite) => {},
                Some(_) => {
                    let mut ack = request_write_ack(address);
                    ack[1] = 0x00;
                    self.reply(&ack);
                },
                None => self.reply(&request_write_ack(address)),
            },
            0xC3 => match self.take_fault(&[FaultKind::RejectChunk, FaultKind::CorruptChunkAck], address) {
                Some(FaultKind::CorruptChunkAck) => {
                    let mut frame = encode_device_frame(&write_chunk_ack()).unwrap();
                    let last = frame.len() - 1;
                    frame[last] ^= 0xFF;
                    self.input.extend(frame);
                },
                Some(_) => self.reply(&[0xEE, 0x00, 0x00, 0x00, 0x00]),
                None => {
                    let start = usize::from(address);
                    self.flash[start..start + 256].copy_from_slice(&payload[7..7 + 256]);
                    self.reply(&write_chunk_ack());
                },
            },
            other => panic!("unexpected opcode 0x{other:02X}"),
        }
    }

    fn process_frames(&mut self) {
        while self.pending.len() >= 2 {
            let len = usize::from(u16::from_le_bytes([self.pending[0], self.pending[1]]));
            if self.pending.len() < len {
                break;
            }
            let frame: Vec<u8> = self.pending.drain(..len).collect();
            let (body, trailer) = frame.split_at(len - 2);
            assert_eq!(
                u16::from_le_bytes([trailer[0], trailer[1]]),
                checksum(body),
                "host frame checksum"
            );
            self.handle(body[2..].to_vec());
        }
    }
}

impl Read for SimDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.input.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.input.len());
        for b in buf.iter_mut().take(n) {
            *b = self.input.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for SimDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.process_frames();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for SimDevice {
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn bytes_to_read(&mut self) -> Result<usize, TransportError> {
        Ok(self.input.len())
    }

    fn name(&self) -> &str {
        "sim"
    }

    fn close(&mut self) {
        if !self.closed {
            record_event("port closed");
        }
        self.closed = true;
    }
}
