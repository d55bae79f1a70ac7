//! pcapng block walker.
//!
//! Every block starts with `type (4) | total length (4)` and ends with a
//! repeat of the total length. Handled blocks:
//!
//! - Section Header (0x0A0D0D0A): byte-order magic at +8, resets interfaces.
//! - Interface Description (1): link type u16 at +8, snap length at +12,
//!   options from +16. Option 9 (`if_tsresol`) sets the timestamp unit.
//! - Enhanced Packet (6): interface id at +8, timestamp high/low at +12/+16,
//!   captured length at +20, original length at +24, data at +28.
//!
//! Everything else is skipped by its total length.

use super::{ByteOrder, RawRecord, MAX_PACKET_LEN, PCAPNG_SHB_MAGIC};
use crate::protocol::link::LinkType;

pub const BLOCK_IDB: u32 = 1;
pub const BLOCK_EPB: u32 = 6;
pub const BYTE_ORDER_MAGIC: u32 = 0x1A2B_3C4D;

const OPT_END: u16 = 0;
const OPT_IF_TSRESOL: u16 = 9;
const MIN_BLOCK_LEN: usize = 12;
const EPB_FIXED_LEN: usize = 28;
const DEFAULT_UNITS_PER_SEC: f64 = 1e6;

/// Byte order declared by the section header starting at `offset`.
pub fn section_byte_order(data: &[u8], offset: usize) -> Option<ByteOrder> {
    match ByteOrder::Big.u32_at(data, offset + 8)? {
        BYTE_ORDER_MAGIC => Some(ByteOrder::Big),
        m if m.swap_bytes() == BYTE_ORDER_MAGIC => Some(ByteOrder::Little),
        _ => None,
    }
}

/// Decode an `if_tsresol` byte into timestamp units per second.
pub fn tsresol_units(value: u8) -> f64 {
    let exponent = (value & 0x7F) as i32;
    if value & 0x80 != 0 {
        2f64.powi(exponent)
    } else {
        10f64.powi(exponent)
    }
}

#[derive(Debug, Clone, Copy)]
struct Interface {
    link_type: LinkType,
    units_per_sec: f64,
}

impl Default for Interface {
    fn default() -> Self {
        Interface {
            link_type: LinkType::Ethernet,
            units_per_sec: DEFAULT_UNITS_PER_SEC,
        }
    }
}

pub struct PcapngReader<'a> {
    data: &'a [u8],
    offset: usize,
    byte_order: ByteOrder,
    interfaces: Vec<Interface>,
    link_types: Vec<LinkType>,
    done: bool,
    truncated: bool,
}

impl<'a> PcapngReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        PcapngReader {
            data,
            offset: 0,
            byte_order: section_byte_order(data, 0).unwrap_or(ByteOrder::Little),
            interfaces: Vec::new(),
            link_types: Vec::new(),
            done: false,
            truncated: false,
        }
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn link_types(&self) -> &[LinkType] {
        &self.link_types
    }

    fn stop(&mut self, reason: &'static str) -> Option<RawRecord<'a>> {
        tracing::debug!(offset = self.offset, reason, "pcapng stream ended early");
        self.done = true;
        self.truncated = true;
        None
    }

    fn read_interface(&mut self, block: &[u8]) {
        let order = self.byte_order;
        let mut iface = Interface::default();
        if let Some(raw) = order.u16_at(block, 8) {
            iface.link_type = LinkType::from(raw as u32);
        }
        let snap_len = order.u32_at(block, 12).unwrap_or(0);

        // Options run up to the trailing length field.
        let end = block.len().saturating_sub(4);
        let mut pos = 16;
        while pos + 4 <= end {
            let (Some(code), Some(len)) = (order.u16_at(block, pos), order.u16_at(block, pos + 2))
            else {
                break;
            };
            let len = len as usize;
            if code == OPT_END || pos + 4 + len > end {
                break;
            }
            if code == OPT_IF_TSRESOL && len >= 1 {
                iface.units_per_sec = tsresol_units(block[pos + 4]);
            }
            pos += 4 + ((len + 3) & !3);
        }

        tracing::debug!(
            interface = self.interfaces.len(),
            link_type = %iface.link_type,
            snap_len,
            units_per_sec = iface.units_per_sec,
            "pcapng interface"
        );
        if !self.link_types.contains(&iface.link_type) {
            self.link_types.push(iface.link_type);
        }
        self.interfaces.push(iface);
    }
}

impl<'a> Iterator for PcapngReader<'a> {
    type Item = RawRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if self.offset >= self.data.len() {
                self.done = true;
                return None;
            }

            let block_type = match self.byte_order.u32_at(self.data, self.offset) {
                Some(t) => t,
                None => return self.stop("partial block header"),
            };
            if block_type == PCAPNG_SHB_MAGIC {
                match section_byte_order(self.data, self.offset) {
                    Some(order) => self.byte_order = order,
                    None => return self.stop("section header without byte-order magic"),
                }
                self.interfaces.clear();
            }

            let total_len = match self.byte_order.u32_at(self.data, self.offset + 4) {
                Some(len) => len as usize,
                None => return self.stop("partial block header"),
            };
            if total_len < MIN_BLOCK_LEN {
                return self.stop("block length below 12");
            }
            if total_len > self.data.len() - self.offset {
                return self.stop("block runs past end of file");
            }

            let data = self.data;
            let block = &data[self.offset..self.offset + total_len];
            self.offset += total_len;

            match block_type {
                BLOCK_IDB => self.read_interface(block),
                BLOCK_EPB => {
                    let order = self.byte_order;
                    let field = |at: usize| order.u32_at(block, at);
                    let (Some(iface_id), Some(ts_hi), Some(ts_lo), Some(cap_len), Some(orig_len)) =
                        (field(8), field(12), field(16), field(20), field(24))
                    else {
                        return self.stop("enhanced packet block too short");
                    };
                    let cap_len = cap_len as usize;
                    if cap_len > MAX_PACKET_LEN {
                        return self.stop("captured length above 65535");
                    }
                    if EPB_FIXED_LEN + cap_len > block.len() {
                        return self.stop("packet data runs past block end");
                    }

                    let iface = self
                        .interfaces
                        .get(iface_id as usize)
                        .copied()
                        .unwrap_or_default();
                    let ticks = ((ts_hi as u64) << 32) | ts_lo as u64;
                    return Some(RawRecord {
                        timestamp: ticks as f64 / iface.units_per_sec,
                        data: &block[EPB_FIXED_LEN..EPB_FIXED_LEN + cap_len],
                        original_length: orig_len.max(cap_len as u32),
                        link_type: iface.link_type,
                    });
                }
                other => {
                    tracing::trace!(block_type = other, len = total_len, "skipping pcapng block");
                }
            }
        }
    }
}
