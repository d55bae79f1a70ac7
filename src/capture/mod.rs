//! Capture-file container readers.
//!
//! Detects legacy pcap or pcapng from the first four bytes and yields raw
//! packet records lazily, so a caller can stop between records. A bounds
//! failure inside the container ends the stream; records already yielded stay
//! valid and [`CaptureReader::truncated`] reports the early stop.

pub mod legacy;
pub mod pcapng;

use crate::protocol::link::LinkType;
use serde::Serialize;
use std::fmt;

/// Largest captured length accepted for a single record.
pub const MAX_PACKET_LEN: usize = 65535;

pub const PCAPNG_SHB_MAGIC: u32 = 0x0A0D_0D0A;
pub const PCAP_MAGIC_MICROS: u32 = 0xA1B2_C3D4;
pub const PCAP_MAGIC_MICROS_SWAPPED: u32 = 0xD4C3_B2A1;
pub const PCAP_MAGIC_NANOS: u32 = 0xA1B2_3C4D;
pub const PCAP_MAGIC_NANOS_SWAPPED: u32 = 0x4D3C_B2A1;

/// Errors that stop a capture from being read at all.
#[derive(Debug)]
pub enum CaptureError {
    /// The leading magic matched neither pcap nor pcapng.
    UnknownFormat(Option<u32>),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::UnknownFormat(Some(magic)) => {
                write!(f, "unknown capture format (magic 0x{:08x})", magic)
            }
            CaptureError::UnknownFormat(None) => {
                write!(f, "unknown capture format (file shorter than 4 bytes)")
            }
        }
    }
}

impl std::error::Error for CaptureError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    #[inline]
    pub fn u16_at(self, data: &[u8], offset: usize) -> Option<u16> {
        let b = data.get(offset..offset.checked_add(2)?)?;
        let bytes = [b[0], b[1]];
        Some(match self {
            ByteOrder::Big => u16::from_be_bytes(bytes),
            ByteOrder::Little => u16::from_le_bytes(bytes),
        })
    }

    #[inline]
    pub fn u32_at(self, data: &[u8], offset: usize) -> Option<u32> {
        let b = data.get(offset..offset.checked_add(4)?)?;
        let bytes = [b[0], b[1], b[2], b[3]];
        Some(match self {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        })
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Big => write!(f, "big-endian"),
            ByteOrder::Little => write!(f, "little-endian"),
        }
    }
}

/// Fractional-second unit of a legacy pcap file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TimestampResolution {
    Micro,
    Nano,
}

impl TimestampResolution {
    pub fn units_per_second(self) -> f64 {
        match self {
            TimestampResolution::Micro => 1e6,
            TimestampResolution::Nano => 1e9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "container", rename_all = "camelCase")]
pub enum CaptureFormat {
    #[serde(rename_all = "camelCase")]
    Legacy {
        byte_order: ByteOrder,
        resolution: TimestampResolution,
    },
    #[serde(rename_all = "camelCase")]
    NextGen { byte_order: ByteOrder },
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureFormat::Legacy {
                byte_order,
                resolution,
            } => {
                let unit = match resolution {
                    TimestampResolution::Micro => "microsecond",
                    TimestampResolution::Nano => "nanosecond",
                };
                write!(f, "pcap ({}, {} timestamps)", byte_order, unit)
            }
            CaptureFormat::NextGen { byte_order } => write!(f, "pcapng ({})", byte_order),
        }
    }
}

/// One packet record as stored in the container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRecord<'a> {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub data: &'a [u8],
    /// On-the-wire length, never smaller than `data.len()`.
    pub original_length: u32,
    pub link_type: LinkType,
}

/// Identify the container from its first four bytes (read big-endian).
pub fn detect_format(data: &[u8]) -> Result<CaptureFormat, CaptureError> {
    let magic = ByteOrder::Big
        .u32_at(data, 0)
        .ok_or(CaptureError::UnknownFormat(None))?;

    let legacy = |byte_order, resolution| {
        Ok(CaptureFormat::Legacy {
            byte_order,
            resolution,
        })
    };

    match magic {
        PCAPNG_SHB_MAGIC => Ok(CaptureFormat::NextGen {
            byte_order: pcapng::section_byte_order(data, 0).unwrap_or(ByteOrder::Little),
        }),
        PCAP_MAGIC_MICROS => legacy(ByteOrder::Big, TimestampResolution::Micro),
        PCAP_MAGIC_MICROS_SWAPPED => legacy(ByteOrder::Little, TimestampResolution::Micro),
        PCAP_MAGIC_NANOS => legacy(ByteOrder::Big, TimestampResolution::Nano),
        PCAP_MAGIC_NANOS_SWAPPED => legacy(ByteOrder::Little, TimestampResolution::Nano),
        other => Err(CaptureError::UnknownFormat(Some(other))),
    }
}

enum Inner<'a> {
    Legacy(legacy::LegacyReader<'a>),
    NextGen(pcapng::PcapngReader<'a>),
}

/// Lazy record iterator over an in-memory capture.
pub struct CaptureReader<'a> {
    format: CaptureFormat,
    inner: Inner<'a>,
}

impl<'a> CaptureReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, CaptureError> {
        let format = detect_format(data)?;
        let inner = match format {
            CaptureFormat::Legacy {
                byte_order,
                resolution,
            } => Inner::Legacy(legacy::LegacyReader::new(data, byte_order, resolution)),
            CaptureFormat::NextGen { .. } => Inner::NextGen(pcapng::PcapngReader::new(data)),
        };
        tracing::debug!(format = %format, bytes = data.len(), "capture opened");
        Ok(CaptureReader { format, inner })
    }

    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    /// True once the reader stopped on a bounds failure rather than at the
    /// end of the buffer.
    pub fn truncated(&self) -> bool {
        match &self.inner {
            Inner::Legacy(r) => r.truncated(),
            Inner::NextGen(r) => r.truncated(),
        }
    }

    /// Link types declared so far, in first-seen order.
    pub fn link_types(&self) -> &[LinkType] {
        match &self.inner {
            Inner::Legacy(r) => r.link_types(),
            Inner::NextGen(r) => r.link_types(),
        }
    }
}

impl<'a> Iterator for CaptureReader<'a> {
    type Item = RawRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Legacy(r) => r.next(),
            Inner::NextGen(r) => r.next(),
        }
    }
}
