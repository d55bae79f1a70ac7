//! pcapdiag: offline diagnostics for pcap and pcapng capture files.
//!
//! A capture buffer is decoded into [`packet::ParsedPacket`]s, grouped into
//! connections by [`flow::FlowTracker`], and run through the detectors in
//! [`analysis`] to produce ranked findings and summary tables.

pub mod analysis;
pub mod capture;
pub mod config;
pub mod display;
pub mod flow;
pub mod packet;
pub mod protocol;

#[cfg(test)]
mod testutil;
