//! Command/response exchanges with the boot loader.
//!
//! Every operation writes one host frame and reads at most one device frame.
//! Nothing here retries; a failed exchange is reported to the caller, which
//! decides whether to drain and try again.

use {
    crate::{
        error::{ProtocolError, TransportError},
        port::Port,
        protocol::{
            command::{
                CHUNK_SIZE, Command, Opcode, WRITE_CHUNK_ACK_LEN, request_write_ack,
                write_chunk_ack,
            },
            frame::{decode_device_frame, encode_host_frame},
        },
        transport::Transport,
    },
    log::{debug, trace},
};

/// A protocol session over an exclusively owned transport.
pub struct ProtocolSession<P: Port> {
    transport: Transport<P>,
}

impl<P: Port> ProtocolSession<P> {
    /// Start a session on `transport`.
    pub fn new(transport: Transport<P>) -> Self {
        Self { transport }
    }

    /// Get a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut Transport<P> {
        &mut self.transport
    }

    /// Get a reference to the transport.
    pub fn transport(&self) -> &Transport<P> {
        &self.transport
    }

    /// End the session and return the transport.
    pub fn into_transport(self) -> Transport<P> {
        self.transport
    }

    /// Check that the boot loader is listening.
    pub fn ping(&mut self) -> Result<(), ProtocolError> {
        let reply = self.exchange(&Command::Ping)?;
        if reply.first() != Some(&Opcode::Ping.byte()) {
            return Err(ProtocolError::UnexpectedResponse {
                command: Opcode::Ping.byte(),
                expected: vec![Opcode::Ping.byte()],
                actual: reply,
            });
        }
        debug!("Ping answered: {reply:02X?}");
        Ok(())
    }

    /// Ask permission to write the block at `address`.
    ///
    /// The acknowledgement must match the expected body byte for byte.
    pub fn request_write(&mut self, address: u16) -> Result<(), ProtocolError> {
        let reply = self.exchange(&Command::RequestWrite { address })?;
        let expected = request_write_ack(address);
        if reply != expected {
            return Err(ProtocolError::UnexpectedResponse {
                command: Opcode::RequestWrite.byte(),
                expected: expected.to_vec(),
                actual: reply,
            });
        }
        trace!("Write permission granted at 0x{address:04X}");
        Ok(())
    }

    /// Write one 256-byte chunk at `address`.
    ///
    /// Only the confirmation's length and opcode are checked.
    pub fn write_chunk(&mut self, address: u16, data: &[u8; CHUNK_SIZE]) -> Result<(), ProtocolError> {
        let reply = self.exchange(&Command::WriteChunk { address, data })?;
        if reply.len() != WRITE_CHUNK_ACK_LEN || reply[0] != Opcode::WriteChunk.byte() {
            return Err(ProtocolError::UnexpectedResponse {
                command: Opcode::WriteChunk.byte(),
                expected: write_chunk_ack().to_vec(),
                actual: reply,
            });
        }
        trace!("Chunk written at 0x{address:04X}");
        Ok(())
    }

    /// Restart the device. No response is read.
    pub fn restart(&mut self) -> Result<(), TransportError> {
        #[allow(clippy::unwrap_used)] // Two-byte payload always fits the length field
        let frame = encode_host_frame(&Command::Restart.payload()).unwrap();
        self.transport.write_exact(&frame)?;
        debug!("Restart sent");
        Ok(())
    }

    fn exchange(&mut self, command: &Command<'_>) -> Result<Vec<u8>, ProtocolError> {
        let frame = encode_host_frame(&command.payload())?;
        trace!(
            "Sending {:?}: {} bytes",
            command.opcode(),
            frame.len()
        );
        self.transport.write_exact(&frame)?;

        let transport = &mut self.transport;
        decode_device_frame(|n| transport.read_exact_default(n))
    }
}
