use super::{route, DetectorContext};
use crate::analysis::finding::{Category, Finding, Severity};
use crate::analysis::stats::{http_transactions, Tally};
use ahash::AHashMap;
use std::collections::BTreeMap;

/// One finding per HTTP status code ≥ 400, in code order.
pub fn error_statuses(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let requests: AHashMap<usize, String> = http_transactions(ctx.packets)
        .into_iter()
        .filter_map(|t| {
            t.response_packet_index
                .map(|resp| (resp, format!("{} {}", t.method, t.uri)))
        })
        .collect();

    let mut by_code: BTreeMap<u16, (Tally<String>, Vec<usize>)> = BTreeMap::new();
    for pkt in ctx.packets {
        let Some(code) = pkt.http.as_ref().and_then(|h| h.status_code()) else {
            continue;
        };
        if code < 400 {
            continue;
        }
        let label = requests
            .get(&pkt.index)
            .cloned()
            .unwrap_or_else(|| route(pkt));
        let (labels, affected) = by_code
            .entry(code)
            .or_insert_with(|| (Tally::new(), Vec::new()));
        labels.add(label, pkt.index);
        affected.push(pkt.index);
    }

    by_code
        .into_iter()
        .map(|(code, (labels, affected))| {
            let count = affected.len();
            let (severity, category) = match code {
                500..=599 => (Severity::Critical, Category::Performance),
                401 | 403 => (Severity::Warning, Category::Security),
                404 if count > cfg.http_404_warning => (Severity::Warning, Category::Protocol),
                429 => (Severity::Warning, Category::Performance),
                _ => (Severity::Info, Category::Protocol),
            };
            let (description, advice): (&str, &[&str]) = match code {
                500..=599 => (
                    "The server failed while handling requests.",
                    &["Check the server application logs around these requests"],
                ),
                401 | 403 => (
                    "Requests were rejected for missing or insufficient credentials.",
                    &["Verify client credentials and access policies"],
                ),
                404 => (
                    "Requested resources were not found.",
                    &["Fix broken links or client paths"],
                ),
                429 => (
                    "The server throttled clients for sending too many requests.",
                    &["Reduce request rates or raise the server's rate limits"],
                ),
                _ => (
                    "The server rejected requests as invalid.",
                    &["Inspect the failing requests for malformed input"],
                ),
            };
            Finding::new(
                format!("http-error-{}", code),
                severity,
                category,
                format!("{} HTTP {} response(s)", count, code),
            )
            .description(description)
            .details(
                labels
                    .by_count()
                    .into_iter()
                    .map(|(label, hits)| format!("{} ({}x)", label, hits.len())),
                cfg.max_details,
            )
            .recommend(advice)
            .affected(&affected, cfg.max_affected_packets)
        })
        .collect()
}

/// Keyword match on unencrypted TCP payloads. The matched text itself is
/// never copied into the finding.
pub fn cleartext_credentials(ctx: &DetectorContext<'_>) -> Vec<Finding> {
    let cfg = ctx.config;
    let keywords: Vec<String> = cfg
        .credential_keywords
        .iter()
        .map(|k| k.to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return Vec::new();
    }

    let mut details = Vec::new();
    let mut affected = Vec::new();
    for pkt in ctx.packets {
        if pkt.tcp.is_none() || pkt.has_tls() {
            continue;
        }
        let payload = pkt.payload();
        if payload.is_empty() {
            continue;
        }
        let text = String::from_utf8_lossy(payload).to_lowercase();
        if let Some(keyword) = keywords.iter().find(|k| text.contains(k.as_str())) {
            details.push(format!("#{} {} matched \"{}\"", pkt.index, route(pkt), keyword.trim()));
            affected.push(pkt.index);
        }
    }
    if affected.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        "cleartext-credentials",
        Severity::Critical,
        Category::Security,
        format!("Possible cleartext credentials in {} packet(s)", affected.len()),
    )
    .description(
        "Unencrypted TCP payloads contain login or password fields that anyone on \
         the path can read.",
    )
    .details(details, cfg.max_details)
    .recommend(&[
        "Move the affected services to TLS",
        "Rotate any credentials that crossed the network in clear text",
    ])
    .affected(&affected, cfg.max_affected_packets)]
}
