//! Criterion benchmarks for the pcapdiag hot path:
//! - `packet::decode` (full layer decode of one record)
//! - `FlowTracker::observe` (connection table update)
//! - `Analyzer::analyze` (reader, decode, flows, detectors, stats)

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pcapdiag::analysis::Analyzer;
use pcapdiag::capture::RawRecord;
use pcapdiag::flow::FlowTracker;
use pcapdiag::packet;
use pcapdiag::protocol::link::LinkType;

/// Ethernet + IPv4 + TCP frame with `payload_len` bytes of payload.
fn make_tcp_packet(
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    src_port: u16,
    dst_port: u16,
    flags: u8,
    seq: u32,
    payload_len: usize,
) -> Vec<u8> {
    let mut pkt = vec![0u8; 54 + payload_len];

    // Ethernet header
    pkt[0..6].copy_from_slice(&[0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);
    pkt[6..12].copy_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    pkt[12] = 0x08;
    pkt[13] = 0x00;

    // IPv4 header
    let ip_total = (40 + payload_len) as u16;
    let ip = &mut pkt[14..34];
    ip[0] = 0x45;
    ip[2..4].copy_from_slice(&ip_total.to_be_bytes());
    ip[6] = 0x40; // DF
    ip[8] = 64;
    ip[9] = 6;
    ip[12..16].copy_from_slice(&src_ip);
    ip[16..20].copy_from_slice(&dst_ip);

    // TCP header
    let tcp = &mut pkt[34..54];
    tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
    tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    tcp[4..8].copy_from_slice(&seq.to_be_bytes());
    tcp[12] = 0x50;
    tcp[13] = flags;
    tcp[14..16].copy_from_slice(&65535u16.to_be_bytes());

    for (i, byte) in pkt[54..].iter_mut().enumerate() {
        *byte = (i & 0xFF) as u8;
    }
    pkt
}

/// Ethernet + IPv4 + UDP DNS query for `name` (type A).
fn make_dns_query(id: u16, name: &str, src_port: u16) -> Vec<u8> {
    let mut dns = Vec::new();
    dns.extend_from_slice(&id.to_be_bytes());
    dns.extend_from_slice(&[0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0]);
    for label in name.split('.') {
        dns.push(label.len() as u8);
        dns.extend_from_slice(label.as_bytes());
    }
    dns.extend_from_slice(&[0, 0, 1, 0, 1]);

    let mut pkt = vec![0u8; 42];
    pkt[0..6].copy_from_slice(&[0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);
    pkt[6..12].copy_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    pkt[12] = 0x08;
    let ip = &mut pkt[14..34];
    ip[0] = 0x45;
    ip[2..4].copy_from_slice(&((28 + dns.len()) as u16).to_be_bytes());
    ip[8] = 64;
    ip[9] = 17;
    ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
    ip[16..20].copy_from_slice(&[10, 0, 0, 53]);
    let udp = &mut pkt[34..42];
    udp[0..2].copy_from_slice(&src_port.to_be_bytes());
    udp[2..4].copy_from_slice(&53u16.to_be_bytes());
    udp[4..6].copy_from_slice(&((8 + dns.len()) as u16).to_be_bytes());
    pkt.extend_from_slice(&dns);
    pkt
}

/// Little-endian microsecond pcap file around `frames`.
fn make_capture(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xA1B2_C3D4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    for (i, frame) in frames.iter().enumerate() {
        out.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        out.extend_from_slice(&((i as u32 % 1000) * 1000).to_le_bytes());
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(frame);
    }
    out
}

fn record(data: &[u8]) -> RawRecord<'_> {
    RawRecord {
        timestamp: 1_700_000_000.0,
        data,
        original_length: data.len() as u32,
        link_type: LinkType::Ethernet,
    }
}

fn bench_decode(c: &mut Criterion) {
    let syn_pkt = make_tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 12345, 80, 0x02, 1000, 0);
    let data_pkt = make_tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 12345, 80, 0x18, 1000, 1400);
    let dns_pkt = make_dns_query(0x1234, "www.example.com", 53000);

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("tcp_syn_54B", |b| {
        b.iter(|| packet::decode(0, black_box(&record(&syn_pkt))))
    });
    group.bench_function("tcp_data_1454B", |b| {
        b.iter(|| packet::decode(0, black_box(&record(&data_pkt))))
    });
    group.bench_function("dns_query", |b| {
        b.iter(|| packet::decode(0, black_box(&record(&dns_pkt))))
    });

    group.finish();
}

fn bench_flow_observe(c: &mut Criterion) {
    let data_pkt = make_tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 12345, 80, 0x10, 1000, 100);
    let parsed = packet::decode(0, &record(&data_pkt));

    let mut group = c.benchmark_group("flow_observe");
    group.throughput(Throughput::Elements(1));

    group.bench_function("existing_flow", |b| {
        let mut tracker = FlowTracker::new();
        tracker.observe(&parsed);
        b.iter(|| tracker.observe(black_box(&parsed)))
    });

    group.bench_function("new_flows", |b| {
        let packets: Vec<_> = (0..1000u16)
            .map(|i| {
                let frame =
                    make_tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1024 + i, 80, 0x10, 1, 100);
                packet::decode(i as usize, &record(&frame))
            })
            .collect();
        b.iter(|| {
            let mut tracker = FlowTracker::new();
            for pkt in &packets {
                tracker.observe(black_box(pkt));
            }
            tracker.len()
        })
    });

    group.finish();
}

fn bench_analyze(c: &mut Criterion) {
    let mut frames = Vec::new();
    for i in 0..2000u32 {
        let port = 1024 + (i % 200) as u16;
        frames.push(make_tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], port, 443, 0x18, i * 100, 100));
        if i % 10 == 0 {
            frames.push(make_dns_query(i as u16, "service.internal.example", 53000 + (i % 100) as u16));
        }
    }
    let capture = make_capture(&frames);
    let analyzer = Analyzer::default();

    let mut group = c.benchmark_group("analyze");
    group.throughput(Throughput::Elements(frames.len() as u64));
    group.sample_size(20);

    group.bench_function("mixed_2200_packets", |b| {
        b.iter(|| analyzer.analyze("bench.pcap", black_box(&capture)))
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_flow_observe, bench_analyze);
criterion_main!(benches);
