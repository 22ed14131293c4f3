//! Byte-level channel over a [`Port`].
//!
//! The transport knows nothing about frames. It writes exact byte runs, reads
//! exact byte counts within a timeout, and drains stale input after a failed
//! exchange. It never retries.

use {
    crate::{error::TransportError, port::Port},
    log::{debug, trace},
    std::{io::ErrorKind, time::Duration},
};

/// Transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Timeout applied to each read when none is given explicitly.
    pub read_timeout: Duration,
    /// Log every byte run written and read at `debug` level.
    pub log_traffic: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_timeout: crate::port::DEFAULT_TIMEOUT,
            log_traffic: false,
        }
    }
}

/// Exclusive byte channel over a port.
pub struct Transport<P: Port> {
    port: P,
    config: TransportConfig,
}

impl<P: Port> Transport<P> {
    /// Wrap an open port.
    pub fn new(port: P, config: TransportConfig) -> Self {
        Self { port, config }
    }

    /// Transport settings.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the transport and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Write all of `bytes` in a single write call.
    ///
    /// A port that accepts fewer bytes fails with
    /// [`TransportError::ShortWrite`]; the remainder is not resent.
    pub fn write_exact(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.config.log_traffic {
            debug!("Write {bytes:02X?}");
        }

        let written = self.port.write(bytes)?;
        if written != bytes.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: bytes.len(),
            });
        }
        self.port.flush()?;

        Ok(())
    }

    /// Read exactly `n` bytes, accumulating partial reads.
    ///
    /// Each underlying read may wait up to `timeout`; a read that returns no
    /// data fails the whole call with [`TransportError::Timeout`].
    pub fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if self.port.timeout() != timeout {
            self.port.set_timeout(timeout)?;
        }

        let mut buf = vec![0u8; n];
        let mut received = 0;

        while received < n {
            match self.port.read(&mut buf[received..]) {
                Ok(0) => {
                    return Err(TransportError::Timeout {
                        expected: n,
                        received,
                    });
                },
                Ok(count) => {
                    trace!("Received {count} bytes");
                    received += count;
                },
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout {
                        expected: n,
                        received,
                    });
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(TransportError::Io(e)),
            }
        }

        if self.config.log_traffic {
            debug!("Read {buf:02X?}");
        }

        Ok(buf)
    }

    /// [`read_exact`](Self::read_exact) with the configured read timeout.
    pub fn read_exact_default(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let timeout = self.config.read_timeout;
        self.read_exact(n, timeout)
    }

    /// Discard all input that is available right now.
    ///
    /// Only reads what the port reports as pending, so this never waits.
    /// Returns the number of bytes discarded.
    pub fn drain(&mut self) -> Result<usize, TransportError> {
        let mut discarded = 0;
        let mut buf = [0u8; 1024];

        loop {
            let pending = self.port.bytes_to_read()?;
            if pending == 0 {
                break;
            }

            let take = pending.min(buf.len());
            let count = self.port.read(&mut buf[..take])?;
            if count == 0 {
                break;
            }
            discarded += count;
        }

        if discarded > 0 {
            debug!("Drained {discarded} stale bytes");
        }

        Ok(discarded)
    }

    /// Close the underlying port.
    pub fn close(&mut self) {
        self.port.close();
    }
}
