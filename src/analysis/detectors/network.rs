use super::{percent, route, DetectorContext};
use crate::analysis::finding::{Category, Finding, Severity};
use crate::protocol::format_ip;
use crate::protocol::icmp::IcmpKind;
use ahash::{AHashMap, AHashSet};
use std::net::{IpAddr, Ipv4Addr};

#[derive(Debug, Default)]
struct ScanState {
    ports: AHashSet<u16>,
    packets: Vec<usize>,
}

/// Bare SYNs from one source to many distinct destination ports.
pub fn port_scan(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut sources: Vec<(IpAddr, ScanState)> = Vec::new();
    let mut index: AHashMap<IpAddr, usize> = AHashMap::new();
    for pkt in ctx.packets {
        let Some(tcp) = &pkt.tcp else { continue };
        if !tcp.flags.is_bare_syn() {
            continue;
        }
        let Some(src) = pkt.src_ip() else { continue };
        let slot = *index.entry(src).or_insert_with(|| {
            sources.push((src, ScanState::default()));
            sources.len() - 1
        });
        let state = &mut sources[slot].1;
        state.ports.insert(tcp.dst_port);
        state.packets.push(pkt.index);
    }

    sources
        .into_iter()
        .filter(|(_, state)| state.ports.len() > cfg.port_scan_ports)
        .map(|(src, state)| {
            let ip = format_ip(&src);
            let targets: AHashSet<IpAddr> = state
                .packets
                .iter()
                .filter_map(|&i| ctx.packets.get(i).and_then(|p| p.dst_ip()))
                .collect();
            let mut ports: Vec<u16> = state.ports.iter().copied().collect();
            ports.sort_unstable();
            let preview: Vec<String> = ports.iter().take(20).map(|p| p.to_string()).collect();
            Finding::new(
                format!("port-scan-{}", ip),
                Severity::Critical,
                Category::Security,
                format!("Port scan from {}", ip),
            )
            .description(format!(
                "{} sent connection attempts to {} distinct ports on {} host(s).",
                ip,
                state.ports.len(),
                targets.len()
            ))
            .details(
                [
                    format!("SYN packets: {}", state.packets.len()),
                    format!("Ports: {}", preview.join(", ")),
                ],
                cfg.max_details,
            )
            .recommend(&[
                "Identify the scanning host and confirm whether the scan is authorised",
                "Block or rate-limit the source at the firewall",
            ])
            .affected(&state.packets, cfg.max_affected_packets)
        })
        .collect()
}

pub fn gratuitous_arp(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let affected: Vec<usize> = ctx
        .packets
        .iter()
        .filter(|p| p.arp.as_ref().is_some_and(|arp| arp.is_gratuitous()))
        .map(|p| p.index)
        .collect();
    if affected.len() <= cfg.gratuitous_arp {
        return Vec::new();
    }
    vec![Finding::new(
        "arp-gratuitous-flood",
        Severity::Warning,
        Category::Network,
        format!("{} gratuitous ARP packets", affected.len()),
    )
    .description(
        "Hosts repeatedly announced their own addresses. Bursts of gratuitous ARP \
         accompany failovers, address conflicts or ARP spoofing.",
    )
    .recommend(&[
        "Check for flapping high-availability pairs",
        "Enable dynamic ARP inspection on the access switches",
    ])
    .affected(&affected, cfg.max_affected_packets)]
}

pub fn icmp_errors(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut unreachable = Vec::new();
    let mut ttl_exceeded = Vec::new();
    for pkt in ctx.packets {
        let Some(icmp) = &pkt.icmp else { continue };
        match icmp.kind() {
            IcmpKind::DestinationUnreachable => unreachable.push(pkt),
            IcmpKind::TimeExceeded => ttl_exceeded.push(pkt),
            _ => {}
        }
    }

    let mut findings = Vec::new();
    let groups = [
        (
            "icmp-unreachable",
            "ICMP destination unreachable",
            "Routers or hosts reported that destinations, networks or ports could not be reached.",
            unreachable,
        ),
        (
            "icmp-ttl-exceeded",
            "ICMP time exceeded",
            "Packets expired in transit. Routing loops or traceroutes produce these.",
            ttl_exceeded,
        ),
    ];
    for (id, title, description, pkts) in groups {
        if pkts.is_empty() {
            continue;
        }
        let severity = if pkts.len() > cfg.icmp_warning {
            Severity::Warning
        } else {
            Severity::Info
        };
        let affected: Vec<usize> = pkts.iter().map(|p| p.index).collect();
        findings.push(
            Finding::new(
                id,
                severity,
                Category::Network,
                format!("{} {} message(s)", pkts.len(), title),
            )
            .description(description)
            .details(
                pkts.iter().map(|p| {
                    let code = p.icmp.as_ref().map(|i| i.code).unwrap_or_default();
                    format!("#{} {} code {}", p.index, route(p), code)
                }),
                cfg.max_details,
            )
            .recommend(&["Check routing and firewall rules towards the reported destinations"])
            .affected(&affected, cfg.max_affected_packets),
        );
    }
    findings
}

pub fn fragmentation(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let affected: Vec<usize> = ctx
        .packets
        .iter()
        .filter(|p| p.ipv4.as_ref().is_some_and(|ip| ip.is_fragment()))
        .map(|p| p.index)
        .collect();
    if affected.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        "ip-fragmentation",
        Severity::Info,
        Category::Network,
        format!("{} fragmented IPv4 packet(s)", affected.len()),
    )
    .description(
        "IPv4 packets were fragmented in transit or by the sender. Fragmentation \
         points at an MTU mismatch on the path.",
    )
    .recommend(&[
        "Check MTU settings along the path",
        "Make sure path MTU discovery is not blocked by ICMP filtering",
    ])
    .affected(&affected, cfg.max_affected_packets)]
}

pub fn broadcast(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let affected: Vec<usize> = ctx
        .packets
        .iter()
        .filter(|p| p.is_broadcast())
        .map(|p| p.index)
        .collect();
    let share = percent(affected.len(), ctx.packets.len());
    if affected.len() <= cfg.broadcast_min || share <= cfg.broadcast_pct {
        return Vec::new();
    }
    vec![Finding::new(
        "excessive-broadcast",
        Severity::Warning,
        Category::Network,
        format!("{:.1}% of packets are broadcast", share),
    )
    .description(format!(
        "{} of {} packets were sent to the broadcast address. Heavy broadcast \
         traffic wastes bandwidth and CPU on every host in the segment.",
        affected.len(),
        ctx.packets.len()
    ))
    .recommend(&[
        "Split large layer-2 segments into smaller VLANs",
        "Look for misbehaving discovery protocols or broadcast storms",
    ])
    .affected(&affected, cfg.max_affected_packets)]
}

/// One critical finding per IPv4 address claimed by more than one MAC.
pub fn arp_conflicts(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut claims: Vec<(Ipv4Addr, Vec<String>, Vec<usize>)> = Vec::new();
    let mut index: AHashMap<Ipv4Addr, usize> = AHashMap::new();
    for pkt in ctx.packets {
        let Some(arp) = &pkt.arp else { continue };
        // Address probes carry no sender IP.
        if arp.sender_ip.is_unspecified() {
            continue;
        }
        let slot = *index.entry(arp.sender_ip).or_insert_with(|| {
            claims.push((arp.sender_ip, Vec::new(), Vec::new()));
            claims.len() - 1
        });
        let (_, macs, packets) = &mut claims[slot];
        if !macs.contains(&arp.sender_mac) {
            macs.push(arp.sender_mac.clone());
        }
        packets.push(pkt.index);
    }

    claims
        .into_iter()
        .filter(|(_, macs, _)| macs.len() > 1)
        .map(|(ip, macs, packets)| {
            Finding::new(
                format!("arp-ip-conflict-{}", ip),
                Severity::Critical,
                Category::Security,
                format!("{} is claimed by {} MAC addresses", ip, macs.len()),
            )
            .description(
                "Several hardware addresses answered for the same IP address. This is \
                 either a duplicate address assignment or ARP spoofing.",
            )
            .details(macs, cfg.max_details)
            .recommend(&[
                "Find the hosts owning these MAC addresses",
                "Enable dynamic ARP inspection or static ARP entries for gateways",
            ])
            .affected(&packets, cfg.max_affected_packets)
        })
        .collect()
}

pub fn long_lived(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let long: Vec<_> = ctx
        .connections
        .iter()
        .filter(|c| c.duration > cfg.long_lived_secs)
        .collect();
    if long.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        "long-lived-connections",
        Severity::Info,
        Category::General,
        format!("{} long-lived connection(s)", long.len()),
    )
    .description(format!(
        "Connections stayed active for more than {:.0} seconds.",
        cfg.long_lived_secs
    ))
    .details(
        long.iter()
            .map(|c| format!("{} ({:.1} s, {} packets)", c.key, c.duration, c.packets)),
        cfg.max_details,
    )
    .recommend(&["Confirm these sessions are expected (tunnels, streaming, database pools)"])]
}
