use super::finding::{Finding, Severity};
use super::stats::{
    self, DnsQueryStat, HttpTransaction, ProtocolStat, TlsConnection, TopTalker,
};
use crate::capture::CaptureFormat;
use crate::flow::ConnectionStats;
use crate::packet::ParsedPacket;
use crate::protocol::link::LinkType;
use serde::Serialize;

/// Everything one run over a capture buffer produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub file_name: String,
    pub file_size: usize,
    pub format: CaptureFormat,
    pub link_types: Vec<LinkType>,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
    pub duration: f64,
    pub total_packets: usize,
    pub total_bytes: u64,
    /// The reader stopped on a bounds failure before the end of the buffer.
    pub stream_truncated: bool,
    pub packets: Vec<ParsedPacket>,
    pub findings: Vec<Finding>,
    pub connections: Vec<ConnectionStats>,
    pub protocol_breakdown: Vec<ProtocolStat>,
    pub top_talkers: Vec<TopTalker>,
    pub dns_queries: Vec<DnsQueryStat>,
    pub tls_connections: Vec<TlsConnection>,
    pub http_transactions: Vec<HttpTransaction>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FindingCounts {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
    pub success: usize,
}

impl FindingCounts {
    pub fn tally(findings: &[Finding]) -> Self {
        let mut counts = FindingCounts::default();
        for f in findings {
            match f.severity {
                Severity::Critical => counts.critical += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Info => counts.info += 1,
                Severity::Success => counts.success += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_packets: usize,
    pub total_bytes: u64,
    pub duration: f64,
    pub connection_count: usize,
    pub findings: FindingCounts,
    pub dns_query_count: usize,
    pub tls_handshake_count: usize,
    pub http_transaction_count: usize,
    pub stream_truncated: bool,
}

/// The exported JSON document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument<'a> {
    pub file_name: &'a str,
    pub analysis_date: String,
    pub summary: ReportSummary,
    pub findings: &'a [Finding],
}

impl ExportDocument<'_> {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl AnalysisResult {
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            total_packets: self.total_packets,
            total_bytes: self.total_bytes,
            duration: self.duration,
            connection_count: self.connections.len(),
            findings: FindingCounts::tally(&self.findings),
            dns_query_count: stats::dns_query_count(&self.packets),
            tls_handshake_count: self.tls_connections.len(),
            http_transaction_count: self.http_transactions.len(),
            stream_truncated: self.stream_truncated,
        }
    }

    /// Export view; `analysis_date` is supplied by the caller so the core
    /// never reads the clock.
    pub fn export_document(&self, analysis_date: impl Into<String>) -> ExportDocument<'_> {
        ExportDocument {
            file_name: &self.file_name,
            analysis_date: analysis_date.into(),
            summary: self.summary(),
            findings: &self.findings,
        }
    }
}
