//! Analysis orchestrator.
//!
//! ```text
//!   capture buffer
//!     └─→ CaptureReader ──record──→ packet::decode ──→ FlowTracker
//!                                        │
//!                       packets + connections
//!                                        ├─→ stats::*        (summary tables)
//!                                        └─→ detectors::*    (findings, sorted)
//! ```
//!
//! One run is a single synchronous pass over the buffer. [`spawn`] moves a
//! run onto a named background thread for callers that must stay responsive.

pub mod detectors;
pub mod finding;
pub mod result;
pub mod stats;

use crate::capture::{CaptureError, CaptureReader};
use crate::config::{Config, DetectorConfig, ReportConfig};
use crate::flow::FlowTracker;
use crate::packet::{self, ParsedPacket};
use crossbeam_channel::Receiver;
use detectors::DetectorContext;
use result::AnalysisResult;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[derive(Debug)]
pub enum AnalysisError {
    Capture(CaptureError),
    /// The cancel flag was raised before the run finished.
    Cancelled,
    /// The background worker could not be started or died without a result.
    Worker(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::Capture(err) => write!(f, "{}", err),
            AnalysisError::Cancelled => write!(f, "analysis cancelled"),
            AnalysisError::Worker(msg) => write!(f, "analysis worker failed: {}", msg),
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalysisError::Capture(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CaptureError> for AnalysisError {
    fn from(err: CaptureError) -> Self {
        AnalysisError::Capture(err)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    detectors: DetectorConfig,
    report: ReportConfig,
}

impl Analyzer {
    pub fn new(config: &Config) -> Self {
        Analyzer {
            detectors: config.detectors.clone(),
            report: config.report.clone(),
        }
    }

    pub fn analyze(&self, file_name: &str, data: &[u8]) -> Result<AnalysisResult, AnalysisError> {
        self.analyze_with_cancel(file_name, data, &AtomicBool::new(false))
    }

    /// Like [`Analyzer::analyze`], checking `cancel` before each record.
    pub fn analyze_with_cancel(
        &self,
        file_name: &str,
        data: &[u8],
        cancel: &AtomicBool,
    ) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();
        tracing::info!(file = file_name, bytes = data.len(), "analysis started");

        let mut reader = CaptureReader::new(data)?;
        let mut packets: Vec<ParsedPacket> = Vec::new();
        let mut flows = FlowTracker::new();
        loop {
            if cancel.load(Ordering::SeqCst) {
                tracing::warn!(packets = packets.len(), "analysis cancelled");
                return Err(AnalysisError::Cancelled);
            }
            let Some(record) = reader.next() else { break };
            let pkt = packet::decode(packets.len(), &record);
            flows.observe(&pkt);
            packets.push(pkt);
        }

        let stream_truncated = reader.truncated();
        if stream_truncated {
            tracing::warn!(packets = packets.len(), "capture ended early on a damaged record");
        }
        let connections = flows.into_connections();

        let mut findings = detectors::run_all(&DetectorContext {
            packets: &packets,
            connections: &connections,
            config: &self.detectors,
        });
        finding::sort_findings(&mut findings);

        let (first_timestamp, last_timestamp) = time_span(&packets);
        let duration = match (first_timestamp, last_timestamp) {
            (Some(first), Some(last)) => (last - first).max(0.0),
            _ => 0.0,
        };

        let result = AnalysisResult {
            file_name: file_name.to_string(),
            file_size: data.len(),
            format: reader.format(),
            link_types: reader.link_types().to_vec(),
            first_timestamp,
            last_timestamp,
            duration,
            total_packets: packets.len(),
            total_bytes: packets.iter().map(|p| p.original_length as u64).sum(),
            stream_truncated,
            protocol_breakdown: stats::protocol_breakdown(&packets),
            top_talkers: stats::top_talkers(&packets, self.report.top_talkers),
            dns_queries: stats::dns_queries(&packets, self.report.top_dns_queries),
            tls_connections: stats::tls_connections(&packets),
            http_transactions: stats::http_transactions(&packets),
            findings,
            connections,
            packets,
        };

        tracing::info!(
            packets = result.total_packets,
            connections = result.connections.len(),
            findings = result.findings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );
        Ok(result)
    }
}

/// Earliest and latest packet timestamps.
fn time_span(packets: &[ParsedPacket]) -> (Option<f64>, Option<f64>) {
    packets.iter().fold((None, None), |(lo, hi), p| {
        let ts = p.timestamp;
        (
            Some(lo.map_or(ts, |lo: f64| lo.min(ts))),
            Some(hi.map_or(ts, |hi: f64| hi.max(ts))),
        )
    })
}

/// A run on a background thread.
pub struct AnalysisJob {
    receiver: Receiver<Result<AnalysisResult, AnalysisError>>,
    handle: thread::JoinHandle<()>,
}

impl AnalysisJob {
    /// Channel the result arrives on, for callers that select over several
    /// sources.
    pub fn receiver(&self) -> &Receiver<Result<AnalysisResult, AnalysisError>> {
        &self.receiver
    }

    /// Block until the run finishes.
    pub fn wait(self) -> Result<AnalysisResult, AnalysisError> {
        let outcome = self.receiver.recv().map_err(|_| {
            AnalysisError::Worker("analysis thread exited without a result".to_string())
        });
        if self.handle.join().is_err() {
            return Err(AnalysisError::Worker("analysis thread panicked".to_string()));
        }
        outcome?
    }
}

/// Run one analysis on a named thread. Raising `cancel` stops it between
/// records.
pub fn spawn(
    analyzer: Analyzer,
    file_name: String,
    data: Vec<u8>,
    cancel: Arc<AtomicBool>,
) -> Result<AnalysisJob, AnalysisError> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let handle = thread::Builder::new()
        .name("pcapdiag-analysis".to_string())
        .spawn(move || {
            let outcome = analyzer.analyze_with_cancel(&file_name, &data, &cancel);
            if tx.send(outcome).is_err() {
                tracing::debug!("analysis result dropped: receiver gone");
            }
        })
        .map_err(|e| AnalysisError::Worker(e.to_string()))?;
    Ok(AnalysisJob {
        receiver: rx,
        handle,
    })
}
