use super::{route, DetectorContext};
use crate::analysis::finding::{Category, Finding, Severity};
use crate::analysis::stats::Tally;
use crate::protocol::tls;
use std::collections::BTreeMap;

/// One critical finding per protocol version older than TLS 1.2, oldest
/// first.
pub fn deprecated_versions(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut by_version: BTreeMap<u16, (Tally<String>, Vec<usize>)> = BTreeMap::new();
    for pkt in ctx.packets {
        let mut versions = Vec::with_capacity(2);
        if let Some(hello) = &pkt.tls_client_hello {
            versions.push(hello.version);
        }
        if let Some(hello) = &pkt.tls_server_hello {
            versions.push(hello.negotiated_version());
        }
        for version in versions {
            if !tls::is_deprecated_version(version) {
                continue;
            }
            let (routes, affected) = by_version
                .entry(version)
                .or_insert_with(|| (Tally::new(), Vec::new()));
            routes.add(route(pkt), pkt.index);
            affected.push(pkt.index);
        }
    }

    by_version
        .into_iter()
        .map(|(version, (routes, affected))| {
            let name = tls::version_name(version);
            Finding::new(
                format!("tls-deprecated-{}", tls::version_slug(version)),
                Severity::Critical,
                Category::Security,
                format!("Deprecated {} in use", name),
            )
            .description(format!(
                "{} handshake(s) offered or negotiated {}. Versions before TLS 1.2 \
                 have known weaknesses and are disabled by modern clients.",
                affected.len(),
                name
            ))
            .details(
                routes
                    .by_count()
                    .into_iter()
                    .map(|(r, hits)| format!("{} ({}x)", r, hits.len())),
                cfg.max_details,
            )
            .recommend(&[
                "Disable TLS 1.1 and older on servers and clients",
                "Require TLS 1.2 or TLS 1.3",
            ])
            .affected(&affected, cfg.max_affected_packets)
        })
        .collect()
}

pub fn weak_ciphers(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut ciphers = Tally::new();
    let mut affected = Vec::new();
    for pkt in ctx.packets {
        let Some(hello) = &pkt.tls_server_hello else {
            continue;
        };
        if let Some(name) = tls::weak_cipher_name(hello.cipher_suite) {
            ciphers.add(name, pkt.index);
            affected.push(pkt.index);
        }
    }
    if affected.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        "tls-weak-ciphers",
        Severity::Critical,
        Category::Security,
        format!("{} handshake(s) negotiated a weak cipher", affected.len()),
    )
    .description(
        "Servers selected NULL, export-grade, anonymous, DES or RC4 cipher suites \
         that do not protect the traffic.",
    )
    .details(
        ciphers
            .by_count()
            .into_iter()
            .map(|(name, hits)| format!("{} ({}x)", name, hits.len())),
        cfg.max_details,
    )
    .recommend(&[
        "Remove weak suites from the server cipher configuration",
        "Prefer AEAD suites such as AES-GCM or ChaCha20-Poly1305",
    ])
    .affected(&affected, cfg.max_affected_packets)]
}

pub fn alerts(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut kinds = Tally::new();
    let mut affected = Vec::new();
    for pkt in ctx.packets {
        let Some(record) = pkt.tls_record.as_ref().filter(|r| r.is_alert()) else {
            continue;
        };
        let label = match record.alert {
            Some(alert) => format!("level {} description {}", alert.level, alert.description),
            None => "alert body not captured".to_string(),
        };
        kinds.add(label, pkt.index);
        affected.push(pkt.index);
    }
    if affected.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        "tls-alerts",
        Severity::Warning,
        Category::Protocol,
        format!("{} TLS alert(s)", affected.len()),
    )
    .description(
        "TLS alert records were exchanged. Alerts during the handshake usually \
         mean certificate or protocol negotiation failures.",
    )
    .details(
        kinds
            .by_count()
            .into_iter()
            .map(|(label, hits)| format!("{} ({}x)", label, hits.len())),
        cfg.max_details,
    )
    .recommend(&[
        "Check certificate validity and chain on the server",
        "Compare the client and server protocol and cipher settings",
    ])
    .affected(&affected, cfg.max_affected_packets)]
}

pub fn missing_sni(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let mut routes = Vec::new();
    let mut affected = Vec::new();
    for pkt in ctx.packets {
        if let Some(hello) = &pkt.tls_client_hello {
            if hello.sni.is_none() {
                routes.push(route(pkt));
                affected.push(pkt.index);
            }
        }
    }
    if affected.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        "tls-missing-sni",
        Severity::Info,
        Category::Protocol,
        format!("{} ClientHello(s) without SNI", affected.len()),
    )
    .description(
        "Clients connected without a server name. Servers hosting several \
         certificates may present the wrong one.",
    )
    .details(routes, cfg.max_details)
    .recommend(&["Configure clients to send the server name extension"])
    .affected(&affected, cfg.max_affected_packets)]
}
