//! Boot loader command vocabulary.
//!
//! Every request is an opcode byte followed by a fixed-shape body. The
//! expected device answers are built here too, so the session only compares.
//!
//! ```text
//! Ping:          C0
//! Restart:       C1 00
//! RequestWrite:  C2 lo hi 00 09 00 00 00 00 00 00 00 00        (13 bytes)
//!   ack:         C2 80 lo hi 00 09 00 00 00 00 00 00 00 00     (14 bytes)
//! WriteChunk:    C3 lo hi 00 00 00 01 <256 data bytes>         (263 bytes)
//!   ack:         C3 xx xx xx xx                                (5 bytes)
//! ```

use byteorder::{ByteOrder, LittleEndian};

/// Size of one chunk written by [`Command::WriteChunk`].
pub const CHUNK_SIZE: usize = 256;

/// Length of the request-write body.
pub const REQUEST_WRITE_LEN: usize = 13;

/// Length of the request-write acknowledgement.
pub const REQUEST_WRITE_ACK_LEN: usize = 14;

/// Length of the write-chunk header preceding the data.
pub const WRITE_CHUNK_HEADER_LEN: usize = 7;

/// Length of the write-chunk confirmation.
pub const WRITE_CHUNK_ACK_LEN: usize = 5;

/// Command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Ping (0xC0).
    Ping = 0xC0,
    /// Restart the device (0xC1).
    Restart = 0xC1,
    /// Ask permission to write a block (0xC2).
    RequestWrite = 0xC2,
    /// Write one chunk (0xC3).
    WriteChunk = 0xC3,
}

impl Opcode {
    /// Opcode byte.
    pub fn byte(self) -> u8 {
        self as u8
    }
}

/// A request sent to the boot loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Check the device is listening.
    Ping,
    /// Ask permission to write the block at `address`.
    RequestWrite {
        /// Flash address of the block.
        address: u16,
    },
    /// Write one chunk at `address`.
    WriteChunk {
        /// Flash address of the chunk.
        address: u16,
        /// Chunk contents.
        data: &'a [u8; CHUNK_SIZE],
    },
    /// Restart into the application.
    Restart,
}

impl Command<'_> {
    /// Opcode of this command.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Ping => Opcode::Ping,
            Self::RequestWrite { .. } => Opcode::RequestWrite,
            Self::WriteChunk { .. } => Opcode::WriteChunk,
            Self::Restart => Opcode::Restart,
        }
    }

    /// Build the frame payload for this command.
    pub fn payload(&self) -> Vec<u8> {
        match *self {
            Self::Ping => vec![Opcode::Ping.byte()],
            Self::Restart => vec![Opcode::Restart.byte(), 0x00],
            Self::RequestWrite { address } => {
                let mut body = vec![
                    Opcode::RequestWrite.byte(),
                    0x00,
                    0x00,
                    0x00,
                    0x09,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                    0x00,
                ];
                LittleEndian::write_u16(&mut body[1..3], address);
                body
            },
            Self::WriteChunk { address, data } => {
                let mut body = Vec::with_capacity(WRITE_CHUNK_HEADER_LEN + CHUNK_SIZE);
                body.extend_from_slice(&[Opcode::WriteChunk.byte(), 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
                LittleEndian::write_u16(&mut body[1..3], address);
                body.extend_from_slice(data);
                body
            },
        }
    }
}

/// Acknowledgement the device sends for a request-write at `address`.
pub fn request_write_ack(address: u16) -> [u8; REQUEST_WRITE_ACK_LEN] {
    let mut ack = [
        Opcode::RequestWrite.byte(),
        0x80,
        0x00,
        0x00,
        0x00,
        0x09,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
    ];
    LittleEndian::write_u16(&mut ack[2..4], address);
    ack
}

/// Confirmation template for a chunk write.
///
/// Only the opcode byte is checked; the device does not echo the address.
pub fn write_chunk_ack() -> [u8; WRITE_CHUNK_ACK_LEN] {
    [Opcode::WriteChunk.byte(), 0x00, 0x00, 0x00, 0x00]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_payload() {
        assert_eq!(Command::Ping.payload(), vec![0xC0]);
    }

    #[test]
    fn test_restart_payload() {
        assert_eq!(Command::Restart.payload(), vec![0xC1, 0x00]);
    }

    #[test]
    fn test_request_write_payload() {
        let body = Command::RequestWrite { address: 0x1C00 }.payload();
        assert_eq!(body.len(), REQUEST_WRITE_LEN);
        assert_eq!(&body[..5], &[0xC2, 0x00, 0x1C, 0x00, 0x09]);
        assert!(body[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_request_write_ack() {
        let ack = request_write_ack(0x1C00);
        assert_eq!(&ack[..6], &[0xC2, 0x80, 0x00, 0x1C, 0x00, 0x09]);
        assert!(ack[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_chunk_payload() {
        let data = [0x5A; CHUNK_SIZE];
        let body = Command::WriteChunk {
            address: 0x1900,
            data: &data,
        }
        .payload();

        assert_eq!(body.len(), WRITE_CHUNK_HEADER_LEN + CHUNK_SIZE);
        assert_eq!(&body[..7], &[0xC3, 0x00, 0x19, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&body[7..], &data[..]);
    }

    #[test]
    fn test_opcodes() {
        assert_eq!(Command::Ping.opcode().byte(), 0xC0);
        assert_eq!(Command::Restart.opcode().byte(), 0xC1);
        assert_eq!(Command::RequestWrite { address: 0 }.opcode().byte(), 0xC2);
        assert_eq!(
            Command::WriteChunk {
                address: 0,
                data: &[0; CHUNK_SIZE]
            }
            .opcode()
            .byte(),
            0xC3
        );
    }
}
