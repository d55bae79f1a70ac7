//! Frame and capture-file builders shared by the unit tests.

use std::net::Ipv4Addr;

pub const MAC_A: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
pub const MAC_B: [u8; 6] = [0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb];
pub const BROADCAST: [u8; 6] = [0xff; 6];

/// Base timestamp used by [`capture`].
pub const T0: u32 = 1_700_000_000;

pub fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

pub fn ethernet(src: [u8; 6], dst: [u8; 6], ether_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + payload.len());
    frame.extend_from_slice(&dst);
    frame.extend_from_slice(&src);
    frame.extend_from_slice(&ether_type.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

fn checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for pair in header.chunks(2) {
        let hi = pair[0] as u32;
        let lo = pair.get(1).copied().unwrap_or(0) as u32;
        sum += (hi << 8) | lo;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// IPv4 packet with a valid header checksum.
pub fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, payload: &[u8]) -> Vec<u8> {
    ipv4_frag(src, dst, protocol, payload, false, 0)
}

pub fn ipv4_frag(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: u8,
    payload: &[u8],
    more_fragments: bool,
    offset_units: u16,
) -> Vec<u8> {
    let total = (20 + payload.len()) as u16;
    let frag = offset_units | if more_fragments { 0x2000 } else { 0 };
    let mut pkt = vec![0x45, 0x00];
    pkt.extend_from_slice(&total.to_be_bytes());
    pkt.extend_from_slice(&[0x12, 0x34]);
    pkt.extend_from_slice(&frag.to_be_bytes());
    pkt.extend_from_slice(&[64, protocol, 0, 0]);
    pkt.extend_from_slice(&src.octets());
    pkt.extend_from_slice(&dst.octets());
    let sum = checksum(&pkt);
    pkt[10..12].copy_from_slice(&sum.to_be_bytes());
    pkt.extend_from_slice(payload);
    pkt
}

pub fn udp(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut seg = Vec::with_capacity(8 + payload.len());
    seg.extend_from_slice(&src_port.to_be_bytes());
    seg.extend_from_slice(&dst_port.to_be_bytes());
    seg.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    seg.extend_from_slice(&[0, 0]);
    seg.extend_from_slice(payload);
    seg
}

/// TCP segment builder producing a complete Ethernet/IPv4/TCP frame.
#[derive(Debug, Clone)]
pub struct TcpSeg {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
    pub window: u16,
    pub payload: Vec<u8>,
}

impl TcpSeg {
    pub fn new(src: &str, src_port: u16, dst: &str, dst_port: u16, flags: u8) -> Self {
        TcpSeg {
            src: ip(src),
            dst: ip(dst),
            src_port,
            dst_port,
            seq: 1,
            ack: 0,
            flags,
            window: 64240,
            payload: Vec::new(),
        }
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn segment(&self) -> Vec<u8> {
        let mut seg = Vec::with_capacity(20 + self.payload.len());
        seg.extend_from_slice(&self.src_port.to_be_bytes());
        seg.extend_from_slice(&self.dst_port.to_be_bytes());
        seg.extend_from_slice(&self.seq.to_be_bytes());
        seg.extend_from_slice(&self.ack.to_be_bytes());
        seg.push(0x50);
        seg.push(self.flags);
        seg.extend_from_slice(&self.window.to_be_bytes());
        seg.extend_from_slice(&[0, 0, 0, 0]);
        seg.extend_from_slice(&self.payload);
        seg
    }

    pub fn frame(&self) -> Vec<u8> {
        let ip = ipv4(self.src, self.dst, 6, &self.segment());
        ethernet(MAC_A, MAC_B, 0x0800, &ip)
    }
}

pub fn udp_frame(src: &str, src_port: u16, dst: &str, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let ip = ipv4(ip(src), ip(dst), 17, &udp(src_port, dst_port, payload));
    ethernet(MAC_A, MAC_B, 0x0800, &ip)
}

pub fn arp_frame(
    opcode: u16,
    sender_mac: [u8; 6],
    sender_ip: &str,
    target_ip: &str,
    dst_mac: [u8; 6],
) -> Vec<u8> {
    let mut arp = vec![0x00, 0x01, 0x08, 0x00, 6, 4];
    arp.extend_from_slice(&opcode.to_be_bytes());
    arp.extend_from_slice(&sender_mac);
    arp.extend_from_slice(&ip(sender_ip).octets());
    arp.extend_from_slice(&[0u8; 6]);
    arp.extend_from_slice(&ip(target_ip).octets());
    ethernet(sender_mac, dst_mac, 0x0806, &arp)
}

pub fn icmp_frame(src: &str, dst: &str, icmp_type: u8, code: u8) -> Vec<u8> {
    let body = [icmp_type, code, 0, 0, 0, 0, 0, 0];
    let ip = ipv4(ip(src), ip(dst), 1, &body);
    ethernet(MAC_A, MAC_B, 0x0800, &ip)
}

pub fn encode_name(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for label in name.split('.').filter(|l| !l.is_empty()) {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out
}

pub fn dns_query(id: u16, name: &str, qtype: u16) -> Vec<u8> {
    let mut msg = id.to_be_bytes().to_vec();
    msg.extend_from_slice(&[0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0]);
    msg.extend(encode_name(name));
    msg.extend_from_slice(&qtype.to_be_bytes());
    msg.extend_from_slice(&[0, 1]);
    msg
}

/// Response echoing the question, with one A record per address.
pub fn dns_response(id: u16, name: &str, rcode: u8, answers: &[Ipv4Addr]) -> Vec<u8> {
    let mut msg = id.to_be_bytes().to_vec();
    msg.extend_from_slice(&[0x81, 0x80 | (rcode & 0x0F), 0, 1]);
    msg.extend_from_slice(&(answers.len() as u16).to_be_bytes());
    msg.extend_from_slice(&[0, 0, 0, 0]);
    msg.extend(encode_name(name));
    msg.extend_from_slice(&[0, 1, 0, 1]);
    for addr in answers {
        msg.extend_from_slice(&[0xC0, 0x0C, 0, 1, 0, 1, 0, 0, 0x0e, 0x10, 0, 4]);
        msg.extend_from_slice(&addr.octets());
    }
    msg
}

/// Legacy pcap writer with a selectable magic.
pub struct LegacyWriter {
    big: bool,
    out: Vec<u8>,
}

impl LegacyWriter {
    pub fn new(big: bool, nanos: bool, link_type: u32) -> Self {
        let mut w = LegacyWriter {
            big,
            out: Vec::new(),
        };
        let magic: u32 = if nanos { 0xA1B2_3C4D } else { 0xA1B2_C3D4 };
        w.u32(magic);
        w.u16(2);
        w.u16(4);
        w.u32(0);
        w.u32(0);
        w.u32(65535);
        w.u32(link_type);
        w
    }

    fn u16(&mut self, v: u16) {
        let bytes = if self.big { v.to_be_bytes() } else { v.to_le_bytes() };
        self.out.extend_from_slice(&bytes);
    }

    fn u32(&mut self, v: u32) {
        let bytes = if self.big { v.to_be_bytes() } else { v.to_le_bytes() };
        self.out.extend_from_slice(&bytes);
    }

    pub fn record(&mut self, ts_sec: u32, ts_frac: u32, data: &[u8], orig_len: u32) {
        self.u32(ts_sec);
        self.u32(ts_frac);
        self.u32(data.len() as u32);
        self.u32(orig_len);
        self.out.extend_from_slice(data);
    }

    pub fn finish(self) -> Vec<u8> {
        self.out
    }
}

/// Little-endian microsecond Ethernet capture, one millisecond apart.
pub fn capture(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut w = LegacyWriter::new(false, false, 1);
    for (i, frame) in frames.iter().enumerate() {
        w.record(T0, (i as u32) * 1000, frame, frame.len() as u32);
    }
    w.finish()
}

/// Like [`capture`] with explicit offsets (seconds after [`T0`]).
pub fn capture_timed(frames: &[(f64, Vec<u8>)]) -> Vec<u8> {
    let mut w = LegacyWriter::new(false, false, 1);
    for (offset, frame) in frames {
        let micros = (offset * 1e6).round() as u64;
        let sec = T0 + (micros / 1_000_000) as u32;
        let frac = (micros % 1_000_000) as u32;
        w.record(sec, frac, frame, frame.len() as u32);
    }
    w.finish()
}

pub struct PcapngWriter {
    big: bool,
    out: Vec<u8>,
}

impl PcapngWriter {
    pub fn new(big: bool) -> Self {
        PcapngWriter {
            big,
            out: Vec::new(),
        }
    }

    fn u16_bytes(&self, v: u16) -> [u8; 2] {
        if self.big {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    }

    fn u32_bytes(&self, v: u32) -> [u8; 4] {
        if self.big {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    }

    /// Append a block; the body is padded to four bytes.
    pub fn block(&mut self, block_type: u32, body: &[u8]) {
        let padded = (body.len() + 3) & !3;
        let total = (12 + padded) as u32;
        let type_bytes = self.u32_bytes(block_type);
        let len_bytes = self.u32_bytes(total);
        self.out.extend_from_slice(&type_bytes);
        self.out.extend_from_slice(&len_bytes);
        self.out.extend_from_slice(body);
        self.out.extend(std::iter::repeat(0u8).take(padded - body.len()));
        self.out.extend_from_slice(&len_bytes);
    }

    pub fn section(&mut self) {
        let mut body = self.u32_bytes(0x1A2B_3C4D).to_vec();
        body.extend_from_slice(&self.u16_bytes(1));
        body.extend_from_slice(&self.u16_bytes(0));
        body.extend_from_slice(&[0xff; 8]);
        self.block(0x0A0D_0D0A, &body);
    }

    pub fn interface(&mut self, link_type: u16, tsresol: Option<u8>) {
        let mut body = self.u16_bytes(link_type).to_vec();
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(&self.u32_bytes(65535));
        if let Some(res) = tsresol {
            body.extend_from_slice(&self.u16_bytes(9));
            body.extend_from_slice(&self.u16_bytes(1));
            body.extend_from_slice(&[res, 0, 0, 0]);
            body.extend_from_slice(&[0, 0, 0, 0]);
        }
        self.block(1, &body);
    }

    pub fn packet(&mut self, iface: u32, ticks: u64, data: &[u8], orig_len: u32) {
        let mut body = self.u32_bytes(iface).to_vec();
        body.extend_from_slice(&self.u32_bytes((ticks >> 32) as u32));
        body.extend_from_slice(&self.u32_bytes(ticks as u32));
        body.extend_from_slice(&self.u32_bytes(data.len() as u32));
        body.extend_from_slice(&self.u32_bytes(orig_len));
        body.extend_from_slice(data);
        self.block(6, &body);
    }

    pub fn finish(self) -> Vec<u8> {
        self.out
    }
}
