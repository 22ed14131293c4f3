//! Frame encoding and decoding.
//!
//! ## Frame Format
//!
//! Frames sent by the host:
//!
//! ```text
//! +--------+---------------+----------+
//! | Length |    Payload    | Checksum |
//! +--------+---------------+----------+
//! | 2 bytes|   variable    | 2 bytes  |
//! +--------+---------------+----------+
//! |  total |  opcode+body  |    LE    |
//! +--------+---------------+----------+
//! ```
//!
//! Frames sent by the device carry an extra marker byte:
//!
//! ```text
//! +--------+--------+---------------+----------+
//! | Marker |  Size  |    Payload    | Checksum |
//! +--------+--------+---------------+----------+
//! | 1 byte | 2 bytes|   variable    | 2 bytes  |
//! +--------+--------+---------------+----------+
//! |  0x55  |  total |  opcode+body  |    LE    |
//! +--------+--------+---------------+----------+
//! ```
//!
//! In both shapes the checksum covers every byte before it.

use {
    crate::{
        error::{ProtocolError, TransportError},
        protocol::checksum::{checksum, checksum_update},
    },
    byteorder::{LittleEndian, WriteBytesExt},
};

/// Marker byte that starts every device frame.
pub const DEVICE_MARKER: u8 = 0x55;

/// Size of the host frame header (length field).
pub const HOST_HEADER_LEN: usize = 2;

/// Size of the device frame header (marker + size field).
pub const DEVICE_HEADER_LEN: usize = 3;

/// Size of the checksum trailer.
pub const CHECKSUM_LEN: usize = 2;

/// The two frame shapes used on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Host to device: no marker.
    Host,
    /// Device to host: `0x55` marker before the size field.
    Device,
}

impl FrameKind {
    /// Header length for this frame kind.
    pub fn header_len(self) -> usize {
        match self {
            Self::Host => HOST_HEADER_LEN,
            Self::Device => DEVICE_HEADER_LEN,
        }
    }

    /// Total wire size of a frame carrying `payload_len` bytes.
    pub fn frame_len(self, payload_len: usize) -> usize {
        self.header_len() + payload_len + CHECKSUM_LEN
    }

    /// Encode `payload` as a frame of this kind.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(self, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let total = self.frame_len(payload.len());
        let size =
            u16::try_from(total).map_err(|_| ProtocolError::PayloadTooLarge(payload.len()))?;

        let mut buf = Vec::with_capacity(total);
        if self == Self::Device {
            buf.push(DEVICE_MARKER);
        }
        buf.write_u16::<LittleEndian>(size)
            .unwrap();
        buf.extend_from_slice(payload);

        let chk = checksum(&buf);
        buf.write_u16::<LittleEndian>(chk)
            .unwrap();

        Ok(buf)
    }
}

/// Encode a host frame: `len ++ payload ++ checksum`.
pub fn encode_host_frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    FrameKind::Host.encode(payload)
}

/// Encode a device frame: `0x55 ++ size ++ payload ++ checksum`.
///
/// The host never sends these; simulated devices and tests do.
pub fn encode_device_frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    FrameKind::Device.encode(payload)
}

/// Read and validate one device frame, returning its payload.
///
/// `read_exact(n)` must return exactly `n` bytes or fail. It is called twice:
/// once for the 3-byte header and once for the rest of the frame. A shorter
/// answer is reported as a timeout.
pub fn decode_device_frame<R>(mut read_exact: R) -> Result<Vec<u8>, ProtocolError>
where
    R: FnMut(usize) -> Result<Vec<u8>, TransportError>,
{
    let head = read_counted(&mut read_exact, DEVICE_HEADER_LEN)?;
    if head[0] != DEVICE_MARKER {
        return Err(ProtocolError::BadMarker(head[0]));
    }

    let size = u16::from_le_bytes([head[1], head[2]]);
    let size_usize = usize::from(size);
    if size_usize < DEVICE_HEADER_LEN + CHECKSUM_LEN {
        return Err(ProtocolError::InvalidLength(size));
    }

    let mut body = read_counted(&mut read_exact, size_usize - DEVICE_HEADER_LEN)?;
    let split = body.len() - CHECKSUM_LEN;
    let actual = u16::from_le_bytes([body[split], body[split + 1]]);
    body.truncate(split);

    let expected = checksum_update(checksum(&head), &body);
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }

    Ok(body)
}

fn read_counted<R>(read_exact: &mut R, n: usize) -> Result<Vec<u8>, TransportError>
where
    R: FnMut(usize) -> Result<Vec<u8>, TransportError>,
{
    let buf = read_exact(n)?;
    if buf.len() != n {
        return Err(TransportError::Timeout {
            expected: n,
            received: buf.len(),
        });
    }
    Ok(buf)
}

/// Decode a complete device frame held in memory.
pub fn decode_device_frame_bytes(frame: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut pos = 0;
    decode_device_frame(|n| {
        let end = pos + n;
        if end > frame.len() {
            return Err(TransportError::Timeout {
                expected: n,
                received: frame.len().saturating_sub(pos),
            });
        }
        let out = frame[pos..end].to_vec();
        pos = end;
        Ok(out)
    })
}
