//! Text report for the CLI.
//!
//! Formatting helpers return strings so they can be tested; the `print_*`
//! functions write them to stdout.

use crate::analysis::finding::Finding;
use crate::analysis::result::AnalysisResult;
use crate::config::{OutputConfig, ReportConfig};
use crate::packet::ParsedPacket;
use crate::protocol::format_ip;
use crate::protocol::http::HttpStartLine;
use std::fmt::Write as _;

/// Print the whole report. With `quiet` only the findings are shown.
pub fn print_report(result: &AnalysisResult, report: &ReportConfig, output: &OutputConfig) {
    if output.quiet {
        print_findings(&result.findings);
        return;
    }

    print_overview(result);
    if output.packets > 0 {
        print_packets(&result.packets, output.packets, output.hex_dump);
    }
    print_breakdown(result);
    print_talkers(result);
    print_connections(result, report.max_connections);
    print_application(result, report.max_connections);
    print_findings(&result.findings);
}

fn section(title: &str) {
    println!();
    println!("{}", title);
    println!("{}", "=".repeat(80));
}

fn print_overview(result: &AnalysisResult) {
    let summary = result.summary();
    println!("pcapdiag v{}", env!("CARGO_PKG_VERSION"));
    println!("File:        {} ({} bytes)", result.file_name, result.file_size);
    println!("Format:      {}", result.format);
    let links: Vec<String> = result.link_types.iter().map(|l| l.to_string()).collect();
    println!("Link types:  {}", links.join(", "));
    println!(
        "Packets:     {} ({})",
        summary.total_packets,
        format_bytes(summary.total_bytes)
    );
    if let (Some(first), Some(last)) = (result.first_timestamp, result.last_timestamp) {
        println!(
            "Time span:   {} to {} ({:.3} s)",
            format_timestamp(first),
            format_timestamp(last),
            summary.duration
        );
    }
    println!("Connections: {}", summary.connection_count);
    if summary.stream_truncated {
        println!("Note:        capture ended early on a damaged record; later data was not read");
    }
}

fn print_packets(packets: &[ParsedPacket], limit: usize, hex_dump: bool) {
    section(&format!("Packets (first {})", limit.min(packets.len())));
    for pkt in packets.iter().take(limit) {
        println!("{}", packet_summary(pkt));
        if hex_dump {
            print!("{}", format_hex_dump(&pkt.data));
        }
    }
}

fn print_breakdown(result: &AnalysisResult) {
    if result.protocol_breakdown.is_empty() {
        return;
    }
    section("Protocols");
    println!("{:<10} {:>10} {:>12} {:>8}", "Protocol", "Packets", "Bytes", "Share");
    for row in &result.protocol_breakdown {
        println!(
            "{:<10} {:>10} {:>12} {:>7.1}%",
            row.protocol, row.packet_count, row.bytes, row.percentage
        );
    }
}

fn print_talkers(result: &AnalysisResult) {
    if result.top_talkers.is_empty() {
        return;
    }
    section("Top talkers");
    println!(
        "{:<40} {:>8} {:>8} {:>12}",
        "Address", "Sent", "Recv", "Bytes"
    );
    for t in &result.top_talkers {
        println!(
            "{:<40} {:>8} {:>8} {:>12}",
            t.ip, t.packets_sent, t.packets_received, t.total_bytes
        );
    }
}

fn print_connections(result: &AnalysisResult, limit: usize) {
    if result.connections.is_empty() {
        return;
    }
    section(&format!("Connections ({})", result.connections.len()));
    for conn in result.connections.iter().take(limit) {
        let state = conn
            .tcp_state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<60} {:>6} pkts {:>10} B {:>9.3} s  {}",
            conn.key, conn.packets, conn.bytes, conn.duration, state
        );
    }
    if result.connections.len() > limit {
        println!("... {} more", result.connections.len() - limit);
    }
}

fn print_application(result: &AnalysisResult, limit: usize) {
    if !result.dns_queries.is_empty() {
        section("DNS queries");
        for q in &result.dns_queries {
            println!("{:>6}  {:<6} {}", q.count, q.query_type, q.domain);
        }
    }

    if !result.tls_connections.is_empty() {
        section("TLS handshakes");
        for t in result.tls_connections.iter().take(limit) {
            println!(
                "#{:<6} {} -> {}  sni={}  client={}  server={}  cipher={}",
                t.packet_index,
                t.client,
                t.server,
                t.sni.as_deref().unwrap_or("-"),
                t.client_version,
                t.server_version.as_deref().unwrap_or("-"),
                t.cipher_suite.as_deref().unwrap_or("-")
            );
        }
    }

    if !result.http_transactions.is_empty() {
        section("HTTP transactions");
        for h in result.http_transactions.iter().take(limit) {
            let status = match (h.status_code, &h.status_text) {
                (Some(code), Some(text)) => format!("{} {}", code, text),
                _ => "(no response)".to_string(),
            };
            println!(
                "#{:<6} {} {} {}  host={}  -> {}",
                h.packet_index,
                h.client,
                h.method,
                h.uri,
                h.host.as_deref().unwrap_or("-"),
                status
            );
        }
    }
}

fn print_findings(findings: &[Finding]) {
    section(&format!("Findings ({})", findings.len()));
    for f in findings {
        print!("{}", format_finding(f));
    }
}

pub fn format_finding(f: &Finding) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}] {} ({})", f.severity, f.title, f.id);
    if !f.description.is_empty() {
        let _ = writeln!(out, "    {}", f.description);
    }
    for line in &f.details {
        let _ = writeln!(out, "    - {}", line);
    }
    for line in &f.recommendations {
        let _ = writeln!(out, "    > {}", line);
    }
    if let Some(affected) = &f.affected_packets {
        let shown: Vec<String> = affected.iter().take(10).map(|i| i.to_string()).collect();
        let more = if affected.len() > 10 { ", ..." } else { "" };
        let _ = writeln!(out, "    packets: {}{}", shown.join(", "), more);
    }
    out
}

/// One-line summary of a decoded packet.
pub fn packet_summary(pkt: &ParsedPacket) -> String {
    let mut summary = format!(
        "#{:<6} {} {:<6} len={}",
        pkt.index,
        format_timestamp(pkt.timestamp),
        pkt.protocol_label(),
        pkt.original_length
    );

    if let Some(arp) = &pkt.arp {
        let _ = write!(summary, " | {}", arp);
        return summary;
    }

    match (pkt.src_ip(), pkt.dst_ip()) {
        (Some(src), Some(dst)) => match pkt.ports() {
            Some((sp, dp)) => {
                let _ = write!(summary, " | {}:{} -> {}:{}", format_ip(&src), sp, format_ip(&dst), dp);
            }
            None => {
                let _ = write!(summary, " | {} -> {}", format_ip(&src), format_ip(&dst));
            }
        },
        _ => {
            if let Some(link) = &pkt.link {
                if let (Some(src), Some(dst)) = (&link.src_mac, &link.dst_mac) {
                    let _ = write!(summary, " | {} -> {}", src, dst);
                }
            }
        }
    }

    if let Some(tcp) = &pkt.tcp {
        let _ = write!(summary, " {} seq={} win={}", tcp.flags, tcp.seq, tcp.window);
    }
    if let Some(icmp) = &pkt.icmp {
        let _ = write!(summary, " {}", icmp);
    }
    if let Some(dns) = &pkt.dns {
        let kind = if dns.is_response() { "response" } else { "query" };
        let name = dns.first_question().map(|q| q.name.as_str()).unwrap_or("");
        let _ = write!(summary, " | DNS {} id={} {}", kind, dns.id, name);
        if dns.is_response() {
            let _ = write!(summary, " {}", dns.rcode());
        }
    }
    if let Some(http) = &pkt.http {
        match http.status_code() {
            Some(code) => {
                let _ = write!(summary, " | HTTP {}", code);
            }
            None => {
                if let HttpStartLine::Request { method, uri, .. } = &http.start {
                    let _ = write!(summary, " | HTTP {} {}", method, uri);
                }
            }
        }
    }
    if let Some(hello) = &pkt.tls_client_hello {
        let _ = write!(summary, " | TLS ClientHello sni={}", hello.sni.as_deref().unwrap_or("-"));
    } else if pkt.tls_server_hello.is_some() {
        summary.push_str(" | TLS ServerHello");
    } else if let Some(record) = &pkt.tls_record {
        let _ = write!(summary, " | TLS {}", record.content_name());
    }

    let payload = pkt.payload().len();
    if payload > 0 {
        let _ = write!(summary, " | payload: {} bytes", payload);
    }
    summary
}

/// Hex dump with offsets, hex values and ASCII, limited to 256 bytes.
pub fn format_hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    let display_len = data.len().min(256);

    for offset in (0..display_len).step_by(16) {
        let end = (offset + 16).min(display_len);
        let chunk = &data[offset..end];

        let _ = write!(out, "    {:04x}  ", offset);
        for (i, byte) in chunk.iter().enumerate() {
            let _ = write!(out, "{:02x} ", byte);
            if i == 7 {
                out.push(' ');
            }
        }
        // Pad short lines
        for i in chunk.len()..16 {
            out.push_str("   ");
            if i == 7 {
                out.push(' ');
            }
        }

        out.push_str(" |");
        for byte in chunk {
            if byte.is_ascii_graphic() || *byte == b' ' {
                out.push(*byte as char);
            } else {
                out.push('.');
            }
        }
        out.push_str("|\n");
    }

    if display_len < data.len() {
        let _ = writeln!(out, "    ... ({} bytes remaining)", data.len() - display_len);
    }
    out
}

/// UTC date and time with microseconds.
pub fn format_timestamp(ts: f64) -> String {
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9).round().min(999_999_999.0) as u32;
    match chrono::DateTime::from_timestamp(secs as i64, nanos) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        None => format!("{:.6}", ts),
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::finding::{Category, Severity};
    use crate::capture::RawRecord;
    use crate::packet;
    use crate::protocol::link::LinkType;
    use crate::protocol::tcp::flags;
    use crate::testutil::*;

    #[test]
    fn hex_dump_layout() {
        let data: Vec<u8> = (0x41..0x41 + 18).collect();
        let dump = format_hex_dump(&data);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("    0000  41 42 43 44 45 46 47 48  49"));
        assert!(lines[0].ends_with("|ABCDEFGHIJKLMNOP|"));
        assert!(lines[1].starts_with("    0010  51 52 "));
        assert!(lines[1].ends_with("|QR|"));
        // Padding keeps the ASCII column aligned.
        assert_eq!(lines[0].find('|'), lines[1].find('|'));
    }

    #[test]
    fn hex_dump_is_capped() {
        let dump = format_hex_dump(&[0u8; 300]);
        assert_eq!(dump.lines().count(), 17);
        assert!(dump.ends_with("... (44 bytes remaining)\n"));
    }

    #[test]
    fn timestamp_is_utc() {
        assert_eq!(format_timestamp(0.5), "1970-01-01 00:00:00.500000");
        assert_eq!(format_timestamp(86_461.25), "1970-01-02 00:01:01.250000");
    }

    #[test]
    fn byte_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
    }

    #[test]
    fn tcp_summary_line() {
        let frame = TcpSeg::new("10.0.0.1", 40000, "10.0.0.2", 22, flags::SYN).frame();
        let pkt = packet::decode(
            3,
            &RawRecord {
                timestamp: 0.0,
                data: &frame,
                original_length: frame.len() as u32,
                link_type: LinkType::Ethernet,
            },
        );
        let line = packet_summary(&pkt);
        assert!(line.starts_with("#3"));
        assert!(line.contains("TCP"));
        assert!(line.contains("10.0.0.1:40000 -> 10.0.0.2:22"));
        assert!(line.contains("[SYN]"));
    }

    #[test]
    fn finding_block() {
        let f = Finding::new("x", Severity::Warning, Category::Network, "Title")
            .description("Desc")
            .details(["d1".to_string()], 10)
            .recommend(&["r1"])
            .affected(&(0..12).collect::<Vec<usize>>(), 100);
        let text = format_finding(&f);
        assert!(text.starts_with("[WARNING] Title (x)\n"));
        assert!(text.contains("    - d1\n"));
        assert!(text.contains("    > r1\n"));
        assert!(text.contains("packets: 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, ..."));
    }
}
