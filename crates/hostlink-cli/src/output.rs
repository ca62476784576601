//! Formatted output helpers for CLI commands.
//!
//! The `listen` sink prints one JSON object per decoded document so its
//! output can be piped into `jq` or other line-oriented tooling.

use std::net::SocketAddr;

use bson::{Bson, Document};
use hostlink_common::config::HostEndpoint;
use hostlink_reporter::reporter::DrainSummary;
use hostlink_wire::frame::Message;

/// Names the record shape of a decoded document.
#[must_use]
pub fn document_kind(doc: &Document) -> &'static str {
    match Message::from_document(doc) {
        Ok(Message::Description(_)) => "description",
        Ok(Message::Call(_)) => "call",
        Err(_) => "unknown",
    }
}

/// Renders a decoded document as a single JSON line tagged with its sender.
#[must_use]
pub fn render_document(peer: &SocketAddr, seq: usize, doc: Document) -> String {
    let kind = document_kind(&doc);
    serde_json::json!({
        "peer": peer.to_string(),
        "seq": seq,
        "kind": kind,
        "doc": Bson::Document(doc).into_relaxed_extjson(),
    })
    .to_string()
}

/// One-line summary printed after a replay.
#[must_use]
pub fn format_summary(summary: &DrainSummary, connections: usize, endpoint: &HostEndpoint) -> String {
    format!(
        "{} reported, {} failed over {} connection{} to {}",
        summary.reported,
        summary.failed,
        connections,
        if connections == 1 { "" } else { "s" },
        endpoint
    )
}
