//! Legacy pcap reader.
//!
//! Global header (24 bytes):
//!   magic (4) | version major (2) | version minor (2) | thiszone (4) |
//!   sigfigs (4) | snaplen (4) | link type (4)
//!
//! Record header (16 bytes):
//!   ts_sec (4) | ts_frac (4) | incl_len (4) | orig_len (4)

use super::{ByteOrder, RawRecord, TimestampResolution, MAX_PACKET_LEN};
use crate::protocol::link::LinkType;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

pub struct LegacyReader<'a> {
    data: &'a [u8],
    offset: usize,
    byte_order: ByteOrder,
    resolution: TimestampResolution,
    link_types: Vec<LinkType>,
    done: bool,
    truncated: bool,
}

impl<'a> LegacyReader<'a> {
    pub fn new(data: &'a [u8], byte_order: ByteOrder, resolution: TimestampResolution) -> Self {
        let mut reader = LegacyReader {
            data,
            offset: GLOBAL_HEADER_LEN,
            byte_order,
            resolution,
            link_types: Vec::new(),
            done: false,
            truncated: false,
        };

        match byte_order.u32_at(data, 20) {
            Some(raw) => reader.link_types.push(LinkType::from(raw)),
            None => {
                tracing::warn!(
                    bytes = data.len(),
                    "pcap global header is truncated, no packets read"
                );
                reader.done = true;
                reader.truncated = true;
            }
        }
        reader
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn link_types(&self) -> &[LinkType] {
        &self.link_types
    }

    fn stop(&mut self, reason: &'static str) -> Option<RawRecord<'a>> {
        tracing::debug!(offset = self.offset, reason, "pcap stream ended early");
        self.done = true;
        self.truncated = true;
        None
    }
}

impl<'a> Iterator for LegacyReader<'a> {
    type Item = RawRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.offset >= self.data.len() {
            self.done = true;
            return None;
        }

        let order = self.byte_order;
        let header_end = self.offset + RECORD_HEADER_LEN;
        if header_end > self.data.len() {
            return self.stop("partial record header");
        }
        let field = |i: usize| order.u32_at(self.data, self.offset + i * 4).unwrap_or(0);
        let ts_sec = field(0);
        let ts_frac = field(1);
        let incl_len = field(2) as usize;
        let orig_len = field(3);

        if incl_len > MAX_PACKET_LEN {
            return self.stop("record length above 65535");
        }
        if incl_len > self.data.len() - header_end {
            return self.stop("record runs past end of file");
        }

        let data = &self.data[header_end..header_end + incl_len];
        self.offset = header_end + incl_len;

        Some(RawRecord {
            timestamp: ts_sec as f64 + ts_frac as f64 / self.resolution.units_per_second(),
            data,
            original_length: orig_len.max(incl_len as u32),
            link_type: self.link_types[0],
        })
    }
}
