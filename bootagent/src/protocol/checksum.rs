//! Frame checksums.
//!
//! The reference host tool never checked request checksums and stamped replies
//! with a fixed sentinel, so [`ChecksumMode::None`] stays the default. The two
//! computed modes cover every byte of the frame that precedes the checksum.

/// Sentinel checksum carried by replies when no checksum is computed.
pub const SENTINEL: u16 = 0x1122;

/// How frame checksums are produced and validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ChecksumMode {
    /// Request checksums are read and ignored; replies carry [`SENTINEL`].
    #[default]
    None,
    /// 16-bit wrapping sum of all preceding bytes.
    Sum16,
    /// CRC16-XMODEM of all preceding bytes.
    Crc16,
}

impl ChecksumMode {
    /// Checksum to place after `data` in an outgoing frame.
    pub fn compute(self, data: &[u8]) -> u16 {
        match self {
            Self::None => SENTINEL,
            Self::Sum16 => sum16(data),
            Self::Crc16 => crc16_xmodem(data),
        }
    }

    /// Checksum an incoming frame must carry, or `None` when not validated.
    pub fn expected(self, data: &[u8]) -> Option<u16> {
        match self {
            Self::None => None,
            Self::Sum16 | Self::Crc16 => Some(self.compute(data)),
        }
    }
}

/// 16-bit wrapping byte sum.
pub fn sum16(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

/// CRC16-XMODEM (poly 0x1021, init 0x0000, no reflection).
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
