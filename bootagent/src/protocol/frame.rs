//! Request and response frames and the codec between them and wire bytes.

use crate::error::FramingError;
use crate::protocol::table::{
    self, BLOCK_SIZE, CMD_STATUS, CMD_TRANSFER, CommandKind, Lookup, SEL_EXIT, SEL_HANDSHAKE,
    SEL_RUN, SEL_WRITE_BIN, SEL_WRITE_INFO,
};
use crate::protocol::{ACK, NAK, ProtocolConfig, STATUS_FRAME_ADDRESS, Status};
use byteorder::{BigEndian, ByteOrder};

/// Bytes before the payload: id, command, two selector bytes.
pub const HEADER_LEN: usize = 4;

/// Trailing checksum bytes of every request.
pub const CHECKSUM_LEN: usize = 2;

/// Length of every reply.
pub const RESPONSE_LEN: usize = 8;

/// Offset of the image address inside a write-info payload.
const WRITE_INFO_ADDRESS: usize = 2;

/// Offset of the image size inside a write-info payload.
const WRITE_INFO_SIZE: usize = 6;

/// A decoded request, one variant per command table kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Liveness check.
    Handshake,
    /// Begin a transfer of `size` bytes to `address`.
    WriteInfo {
        /// First flash address of the image.
        address: u32,
        /// Image length in bytes.
        size: u32,
    },
    /// Ask for the status frame.
    StatusQuery,
    /// Hand control to the image at `address`.
    Run {
        /// Entry address.
        address: u32,
    },
    /// Next block of image data.
    WriteBin {
        /// Block contents.
        block: [u8; BLOCK_SIZE],
    },
    /// Abort the session and reset.
    Exit,
    /// Selector not in the command table.
    Unknown,
}

impl Request {
    /// Command table kind, `None` for unknown selectors.
    pub fn kind(&self) -> Option<CommandKind> {
        match self {
            Self::Handshake => Some(CommandKind::Handshake),
            Self::WriteInfo { .. } => Some(CommandKind::WriteInfo),
            Self::StatusQuery => Some(CommandKind::StatusQuery),
            Self::Run { .. } => Some(CommandKind::Run),
            Self::WriteBin { .. } => Some(CommandKind::WriteBin),
            Self::Exit => Some(CommandKind::Exit),
            Self::Unknown => None,
        }
    }

    /// Canonical command byte, selector and payload that carry this request.
    ///
    /// Returns `None` for [`Request::Unknown`], which has no wire form of its own.
    pub fn wire_parts(&self) -> Option<(u8, u16, Vec<u8>)> {
        let parts = match self {
            Self::Handshake => (0x00, SEL_HANDSHAKE, vec![0x00, 0x00]),
            Self::WriteInfo { address, size } => {
                let mut payload = vec![0u8; 10];
                BigEndian::write_u32(&mut payload[WRITE_INFO_ADDRESS..], *address);
                BigEndian::write_u32(&mut payload[WRITE_INFO_SIZE..], *size);
                (CMD_TRANSFER, SEL_WRITE_INFO, payload)
            },
            Self::StatusQuery => (CMD_STATUS, SEL_WRITE_INFO, vec![0x00, 0x00]),
            Self::Run { address } => {
                let mut payload = vec![0u8; 3];
                BigEndian::write_u24(&mut payload, *address & 0x00FF_FFFF);
                (0x00, SEL_RUN, payload)
            },
            Self::WriteBin { block } => (CMD_TRANSFER, SEL_WRITE_BIN, block.to_vec()),
            Self::Exit => (0x00, SEL_EXIT, Vec::new()),
            Self::Unknown => return None,
        };
        Some(parts)
    }
}

/// A request frame as received from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Protocol/session identifier byte.
    pub id: u8,
    /// Command byte.
    pub command: u8,
    /// Selector field.
    pub selector: u16,
    /// Decoded meaning.
    pub request: Request,
    /// Checksum carried by the frame.
    pub checksum: u16,
}

/// An 8-byte reply frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Identifier byte.
    pub id: u8,
    /// Command byte.
    pub command: u8,
    /// Address field, sent high byte first.
    pub address: u16,
    /// Two payload bytes.
    pub payload: [u8; 2],
    /// Checksum, filled in by [`Codec::seal`] or [`Codec::encode`].
    pub checksum: u16,
}

impl ResponseFrame {
    /// Acknowledge a request, reporting `status`.
    pub fn ack(request: &RequestFrame, status: Status) -> Self {
        Self {
            id: request.id,
            command: request.command,
            address: request.selector,
            payload: [ACK, status.code()],
            checksum: 0,
        }
    }

    /// The fixed reply to a handshake.
    pub fn handshake_ack(id: u8, command: u8) -> Self {
        Self {
            id,
            command,
            address: SEL_HANDSHAKE,
            payload: [ACK, 0x00],
            checksum: 0,
        }
    }

    /// The status frame.
    pub fn status(id: u8, status: Status) -> Self {
        Self {
            id,
            command: CMD_STATUS,
            address: STATUS_FRAME_ADDRESS,
            payload: [status.code(), 0x00],
            checksum: 0,
        }
    }

    /// Reject a frame that could not be decoded.
    pub fn nak(id: u8, command: u8, selector: u16) -> Self {
        Self {
            id,
            command,
            address: selector,
            payload: [NAK, 0x00],
            checksum: 0,
        }
    }

    /// Whether this reply acknowledges its request.
    pub fn is_ack(&self) -> bool {
        self.payload[0] == ACK
    }

    /// Status carried by an acknowledgement, if any.
    pub fn ack_status(&self) -> Option<Status> {
        if self.is_ack() {
            Status::from_code(self.payload[1])
        } else {
            None
        }
    }
}

/// Converts between frames and wire bytes for one protocol variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    config: ProtocolConfig,
}

impl Codec {
    /// Create a codec for the given variant.
    pub fn new(config: ProtocolConfig) -> Self {
        Self { config }
    }

    /// Variant settings.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Split a header into id, command and selector.
    pub fn parse_header(&self, header: &[u8; HEADER_LEN]) -> (u8, u8, u16) {
        let selector = self
            .config
            .selector_order
            .read([header[2], header[3]]);
        (header[0], header[1], selector)
    }

    /// Total length of the frame that starts with `header`.
    pub fn frame_len(&self, header: &[u8; HEADER_LEN]) -> Result<usize, FramingError> {
        let (_, command, selector) = self.parse_header(header);
        let lookup = table::lookup(selector, command)?;
        Ok(HEADER_LEN + lookup.payload_len() + CHECKSUM_LEN)
    }

    /// Decode one complete request frame.
    pub fn decode(&self, frame: &[u8]) -> Result<RequestFrame, FramingError> {
        let Some(header) = frame
            .first_chunk::<HEADER_LEN>()
        else {
            return Err(FramingError::Truncated {
                expected: HEADER_LEN + CHECKSUM_LEN,
                actual: frame.len(),
            });
        };
        let (id, command, selector) = self.parse_header(header);
        let lookup = table::lookup(selector, command)?;

        let expected = HEADER_LEN + lookup.payload_len() + CHECKSUM_LEN;
        if frame.len() < expected {
            return Err(FramingError::Truncated {
                expected,
                actual: frame.len(),
            });
        }
        if frame.len() > expected {
            return Err(FramingError::Oversized {
                expected,
                actual: frame.len(),
            });
        }

        let body_end = expected - CHECKSUM_LEN;
        let checksum = BigEndian::read_u16(&frame[body_end..]);
        if let Some(computed) = self
            .config
            .checksum
            .expected(&frame[..body_end])
        {
            if computed != checksum {
                return Err(FramingError::ChecksumMismatch {
                    expected: computed,
                    actual: checksum,
                });
            }
        }

        let payload = &frame[HEADER_LEN..body_end];
        let request = match lookup {
            Lookup::UnknownSelector => Request::Unknown,
            Lookup::Known(shape) => match shape.kind {
                CommandKind::Handshake => Request::Handshake,
                CommandKind::WriteInfo => Request::WriteInfo {
                    address: BigEndian::read_u32(&payload[WRITE_INFO_ADDRESS..]),
                    size: BigEndian::read_u32(&payload[WRITE_INFO_SIZE..]),
                },
                CommandKind::StatusQuery => Request::StatusQuery,
                CommandKind::Run => Request::Run {
                    address: BigEndian::read_u24(payload),
                },
                CommandKind::WriteBin => {
                    let mut block = [0u8; BLOCK_SIZE];
                    block.copy_from_slice(payload);
                    Request::WriteBin { block }
                },
                CommandKind::Exit => Request::Exit,
            },
        };

        Ok(RequestFrame {
            id,
            command,
            selector,
            request,
            checksum,
        })
    }

    /// Encode a request from raw fields, as the host-side tool does.
    ///
    /// The payload length must match the command table for the header.
    pub fn encode_request(
        &self,
        id: u8,
        command: u8,
        selector: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>, FramingError> {
        let expected = table::lookup(selector, command)?.payload_len();
        if payload.len() < expected {
            return Err(FramingError::Truncated {
                expected: HEADER_LEN + expected + CHECKSUM_LEN,
                actual: HEADER_LEN + payload.len() + CHECKSUM_LEN,
            });
        }
        if payload.len() > expected {
            return Err(FramingError::Oversized {
                expected: HEADER_LEN + expected + CHECKSUM_LEN,
                actual: HEADER_LEN + payload.len() + CHECKSUM_LEN,
            });
        }

        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + CHECKSUM_LEN);
        buf.push(id);
        buf.push(command);
        buf.extend_from_slice(
            &self
                .config
                .selector_order
                .write(selector),
        );
        buf.extend_from_slice(payload);
        let checksum = self
            .config
            .checksum
            .compute(&buf);
        buf.extend_from_slice(&checksum.to_be_bytes());
        Ok(buf)
    }

    /// Encode a typed request with its canonical command byte.
    ///
    /// Returns `None` for [`Request::Unknown`].
    pub fn encode_typed(&self, id: u8, request: &Request) -> Option<Vec<u8>> {
        let (command, selector, payload) = request.wire_parts()?;
        self.encode_request(id, command, selector, &payload)
            .ok()
    }

    /// Fill in the checksum of a reply.
    pub fn seal(&self, mut response: ResponseFrame) -> ResponseFrame {
        let bytes = Self::reply_body(&response);
        response.checksum = self
            .config
            .checksum
            .compute(&bytes);
        response
    }

    /// Encode a reply to its 8 wire bytes, computing the checksum.
    pub fn encode(&self, response: &ResponseFrame) -> [u8; RESPONSE_LEN] {
        let sealed = self.seal(*response);
        let mut out = [0u8; RESPONSE_LEN];
        out[..6].copy_from_slice(&Self::reply_body(&sealed));
        BigEndian::write_u16(&mut out[6..], sealed.checksum);
        out
    }

    /// Decode an 8-byte reply, validating its checksum where the variant has one.
    pub fn decode_response(&self, bytes: &[u8]) -> Result<ResponseFrame, FramingError> {
        if bytes.len() < RESPONSE_LEN {
            return Err(FramingError::Truncated {
                expected: RESPONSE_LEN,
                actual: bytes.len(),
            });
        }
        if bytes.len() > RESPONSE_LEN {
            return Err(FramingError::Oversized {
                expected: RESPONSE_LEN,
                actual: bytes.len(),
            });
        }

        let checksum = BigEndian::read_u16(&bytes[6..]);
        if let Some(computed) = self
            .config
            .checksum
            .expected(&bytes[..6])
        {
            if computed != checksum {
                return Err(FramingError::ChecksumMismatch {
                    expected: computed,
                    actual: checksum,
                });
            }
        }

        Ok(ResponseFrame {
            id: bytes[0],
            command: bytes[1],
            address: BigEndian::read_u16(&bytes[2..4]),
            payload: [bytes[4], bytes[5]],
            checksum,
        })
    }

    fn reply_body(response: &ResponseFrame) -> [u8; 6] {
        let [hi, lo] = response
            .address
            .to_be_bytes();
        [
            response.id,
            response.command,
            hi,
            lo,
            response.payload[0],
            response.payload[1],
        ]
    }
}
