use super::DetectorContext;
use crate::analysis::finding::{Category, Finding, Severity};
use crate::analysis::stats::Tally;
use crate::protocol::dns::{DnsMessage, Rcode, RecordType};
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::net::IpAddr;

fn first_name(msg: &DnsMessage) -> String {
    msg.first_question()
        .map(|q| q.name.clone())
        .unwrap_or_else(|| "<no question>".to_string())
}

/// One finding per non-zero response code, in code order.
pub fn response_errors(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut by_code: BTreeMap<u8, (Tally<String>, Vec<usize>)> = BTreeMap::new();
    for pkt in ctx.packets {
        let Some(dns) = &pkt.dns else { continue };
        if !dns.is_response() || dns.flags.rcode == 0 {
            continue;
        }
        let (names, affected) = by_code
            .entry(dns.flags.rcode)
            .or_insert_with(|| (Tally::new(), Vec::new()));
        names.add(first_name(dns), pkt.index);
        affected.push(pkt.index);
    }

    let mut findings = Vec::new();
    for (code, (names, affected)) in by_code {
        let rcode = Rcode::from(code);
        let count = affected.len();
        let (id, severity, description, advice): (String, Severity, &str, &[&str]) = match rcode {
            Rcode::ServFail => (
                "dns-servfail".to_string(),
                Severity::Critical,
                "The resolver failed to answer. Upstream servers are unreachable, \
                 misconfigured or failing DNSSEC validation.",
                &[
                    "Check the health and upstream connectivity of the resolver",
                    "Verify DNSSEC signatures of the affected zones",
                ],
            ),
            Rcode::NxDomain => (
                "dns-nxdomain".to_string(),
                if count > cfg.nxdomain_warning {
                    Severity::Warning
                } else {
                    Severity::Info
                },
                "Queries were answered with \"name does not exist\". Typos, stale \
                 configuration or malware probing generated domains cause this.",
                &[
                    "Fix hostnames in application configuration",
                    "Investigate hosts issuing many random-looking lookups",
                ],
            ),
            Rcode::Refused => (
                "dns-refused".to_string(),
                Severity::Warning,
                "The server refused to answer, usually because of an access policy.",
                &["Check the resolver's allowed client ranges and recursion settings"],
            ),
            _ => (
                format!("dns-rcode-{}", code),
                Severity::Warning,
                "DNS responses carried an error code.",
                &["Inspect the failing queries and the responding server"],
            ),
        };
        let details = names
            .by_count()
            .into_iter()
            .map(|(name, hits)| format!("{} ({}x)", name, hits.len()));
        findings.push(
            Finding::new(
                id,
                severity,
                Category::Protocol,
                format!("{} DNS {} response(s)", count, rcode),
            )
            .description(description)
            .details(details, cfg.max_details)
            .recommend(advice)
            .affected(&affected, cfg.max_affected_packets),
        );
    }
    findings
}

/// Matches responses to queries by transaction id on the same client/server
/// pair.
pub fn slow_responses(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut pending: AHashMap<(u16, IpAddr, IpAddr), f64> = AHashMap::new();
    let mut latencies: Vec<(String, f64, usize)> = Vec::new();
    for pkt in ctx.packets {
        let Some(dns) = &pkt.dns else { continue };
        let (Some(src), Some(dst)) = (pkt.src_ip(), pkt.dst_ip()) else {
            continue;
        };
        if dns.is_response() {
            if let Some(sent) = pending.remove(&(dns.id, dst, src)) {
                let ms = (pkt.timestamp - sent) * 1000.0;
                latencies.push((first_name(dns), ms, pkt.index));
            }
        } else {
            pending.insert((dns.id, src, dst), pkt.timestamp);
        }
    }

    let slow: Vec<&(String, f64, usize)> = latencies
        .iter()
        .filter(|(_, ms, _)| *ms > cfg.dns_slow_ms)
        .collect();
    if slow.is_empty() {
        return Vec::new();
    }

    let mean = latencies.iter().map(|(_, ms, _)| ms).sum::<f64>() / latencies.len() as f64;
    let severity = if mean > cfg.dns_slow_warning_mean_ms {
        Severity::Warning
    } else {
        Severity::Info
    };
    let affected: Vec<usize> = slow.iter().map(|(_, _, idx)| *idx).collect();
    vec![Finding::new(
        "dns-slow-responses",
        severity,
        Category::Performance,
        format!("{} slow DNS response(s)", slow.len()),
    )
    .description(format!(
        "{} of {} answered queries took longer than {:.0} ms; mean latency was {:.0} ms.",
        slow.len(),
        latencies.len(),
        cfg.dns_slow_ms,
        mean
    ))
    .details(
        slow.iter().map(|(name, ms, _)| format!("{}: {:.0} ms", name, ms)),
        cfg.max_details,
    )
    .recommend(&[
        "Use a resolver closer to the clients or enable local caching",
        "Check for packet loss towards the resolver",
    ])
    .affected(&affected, cfg.max_affected_packets)]
}

pub fn tunneling(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut suspicious: Vec<(String, usize)> = Vec::new();
    for pkt in ctx.packets {
        let Some(dns) = &pkt.dns else { continue };
        if dns.is_response() {
            continue;
        }
        let hit = dns.questions.iter().find(|q| {
            q.name.len() > cfg.tunneling_name_len
                || (q.record_type() == RecordType::Txt
                    && q.name.split('.').any(|l| l.len() > cfg.tunneling_txt_label_len))
        });
        if let Some(q) = hit {
            suspicious.push((q.name.clone(), pkt.index));
        }
    }
    if suspicious.len() <= cfg.tunneling_critical {
        return Vec::new();
    }

    let affected: Vec<usize> = suspicious.iter().map(|(_, idx)| *idx).collect();
    vec![Finding::new(
        "dns-tunneling",
        Severity::Critical,
        Category::Security,
        format!("Possible DNS tunneling in {} queries", suspicious.len()),
    )
    .description(
        "Queries with very long names or long TXT labels can carry data out of \
         the network over DNS.",
    )
    .details(
        suspicious.iter().map(|(name, idx)| format!("#{}: {}", idx, name)),
        cfg.max_details,
    )
    .recommend(&[
        "Identify the hosts sending these queries",
        "Restrict outbound DNS to approved resolvers",
    ])
    .affected(&affected, cfg.max_affected_packets)]
}

#[cfg(test)]
mod tests {
    use super::super::harness::*;
    use super::*;
    use crate::testutil::*;

    fn query(id: u16, name: &str, qtype: u16) -> Vec<u8> {
        udp_frame("10.0.0.1", 5000, "10.0.0.53", 53, &dns_query(id, name, qtype))
    }

    fn answer(id: u16, name: &str, rcode: u8) -> Vec<u8> {
        let addrs = if rcode == 0 { vec![ip("93.184.216.34")] } else { vec![] };
        udp_frame("10.0.0.53", 53, "10.0.0.1", 5000, &dns_response(id, name, rcode, &addrs))
    }

    #[test]
    fn servfail_is_critical() {
        let fx = Fixture::new(&[query(1, "a.test", 1), answer(1, "a.test", 2)]);
        let found = fx.run(response_errors);
        assert_eq!(ids(&found), ["dns-servfail"]);
        assert_eq!(found[0].severity, Severity::Critical);
        assert_eq!(found[0].details, ["a.test (1x)"]);
        assert_eq!(found[0].affected_packets, Some(vec![1]));
    }

    #[test]
    fn successful_answer_has_no_error() {
        let fx = Fixture::new(&[query(1, "a.test", 1), answer(1, "a.test", 0)]);
        assert!(fx.packets[1].dns.as_ref().unwrap().answers.len() == 1);
        assert!(fx.run(response_errors).is_empty());
    }

    #[test]
    fn codes_grouped_in_code_order() {
        let fx = Fixture::new(&[
            answer(1, "x.test", 5),
            answer(2, "y.test", 3),
            answer(3, "z.test", 9),
            answer(4, "y.test", 3),
        ]);
        let found = fx.run(response_errors);
        assert_eq!(ids(&found), ["dns-nxdomain", "dns-refused", "dns-rcode-9"]);
        assert_eq!(found[0].severity, Severity::Info);
        assert_eq!(found[1].severity, Severity::Warning);
        assert_eq!(found[2].severity, Severity::Warning);
    }

    #[test]
    fn many_nxdomain_is_warning() {
        let frames: Vec<_> = (0..11).map(|i| answer(i, "gone.test", 3)).collect();
        let found = Fixture::new(&frames).run(response_errors);
        assert_eq!(found[0].severity, Severity::Warning);
    }

    #[test]
    fn slow_answer_is_reported() {
        let fx = Fixture::timed(&[
            (0.0, query(7, "slow.test", 1)),
            (0.6, answer(7, "slow.test", 0)),
            (1.0, query(8, "fast.test", 1)),
            (1.01, answer(8, "fast.test", 0)),
        ]);
        let found = fx.run(slow_responses);
        assert_eq!(ids(&found), ["dns-slow-responses"]);
        // mean (600 + 10) / 2 stays below a second
        assert_eq!(found[0].severity, Severity::Info);
        assert_eq!(found[0].affected_packets, Some(vec![1]));
    }

    #[test]
    fn very_slow_mean_is_warning() {
        let fx = Fixture::timed(&[(0.0, query(7, "slow.test", 1)), (1.5, answer(7, "slow.test", 0))]);
        let found = fx.run(slow_responses);
        assert_eq!(found[0].severity, Severity::Warning);
        assert_eq!(found[0].details, ["slow.test: 1500 ms"]);
    }

    #[test]
    fn fast_answers_are_quiet() {
        let fx = Fixture::new(&[query(7, "a.test", 1), answer(7, "a.test", 0)]);
        assert!(fx.run(slow_responses).is_empty());
    }

    #[test]
    fn long_txt_labels_look_like_tunneling() {
        let label = "a".repeat(40);
        let name = format!("{}.t.example", label);
        // The same name as an A query has no long-name hit.
        let mut frames: Vec<_> = (0..6).map(|i| query(i, &name, 16)).collect();
        frames.push(query(99, &name, 1));
        let found = Fixture::new(&frames).run(tunneling);
        assert_eq!(ids(&found), ["dns-tunneling"]);
        assert_eq!(found[0].severity, Severity::Critical);
        assert_eq!(found[0].affected_packets, Some(vec![0, 1, 2, 3, 4, 5]));
    }

    #[test]
    fn a_few_suspicious_queries_are_quiet() {
        let name = format!("{}.t.example", "a".repeat(40));
        for count in 1..=5 {
            let frames: Vec<_> = (0..count).map(|i| query(i, &name, 16)).collect();
            assert!(Fixture::new(&frames).run(tunneling).is_empty(), "count {}", count);
        }
    }

    #[test]
    fn single_long_name_keeps_all_clear() {
        let name = format!("{}.{}.example", "b".repeat(60), "c".repeat(60));
        let fx = Fixture::new(&[query(1, &name, 1)]);
        assert!(fx.run(tunneling).is_empty());
        let all = super::super::run_all(&fx.ctx());
        assert_eq!(ids(&all), ["no-major-issues"]);
    }

    #[test]
    fn tunneling_threshold_is_above_five() {
        let name = format!("{}.{}.example", "b".repeat(60), "c".repeat(60));
        let five: Vec<_> = (0..5).map(|i| query(i, &name, 1)).collect();
        assert!(Fixture::new(&five).run(tunneling).is_empty());

        let six: Vec<_> = (0..6).map(|i| query(i, &name, 1)).collect();
        let found = Fixture::new(&six).run(tunneling);
        assert_eq!(ids(&found), ["dns-tunneling"]);
        assert_eq!(found[0].severity, Severity::Critical);
    }
}
