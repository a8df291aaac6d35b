//! Connection-type accounting.
//!
//! # Responsibilities
//! - Classify a servlet path into a coarse connection type
//! - Keep a per-type counter of handled requests
//!
//! # Design Decisions
//! - The type is the first path segment; everything else is "other"
//! - Lock-free counters; accounting must never slow the request path

use dashmap::DashMap;

/// Per-connection-type request counters.
#[derive(Debug, Default)]
pub struct ConnectionMonitor {
    counters: DashMap<String, u64>,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a servlet path into its coarse connection type.
    ///
    /// The type is the first path segment, lowercased; an empty path maps
    /// to "other".
    pub fn classify(path: &str) -> String {
        let trimmed = path.trim_matches('/');
        let segment = trimmed.split('/').next().unwrap_or("");
        if segment.is_empty() {
            "other".to_string()
        } else {
            segment.to_ascii_lowercase()
        }
    }

    /// Record one request against the path's connection type and return
    /// the type.
    pub fn record(&self, path: &str) -> String {
        let kind = Self::classify(path);
        *self.counters.entry(kind.clone()).or_insert(0) += 1;
        kind
    }

    /// Current count for one connection type.
    pub fn count(&self, kind: &str) -> u64 {
        self.counters.get(kind).map(|c| *c).unwrap_or(0)
    }

    /// Snapshot of every counter, for diagnostics.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let mut all: Vec<_> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        all.sort();
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_first_segment() {
        assert_eq!(ConnectionMonitor::classify("/mail/inbox"), "mail");
        assert_eq!(ConnectionMonitor::classify("Calendar"), "calendar");
        assert_eq!(ConnectionMonitor::classify("/"), "other");
        assert_eq!(ConnectionMonitor::classify(""), "other");
    }

    #[test]
    fn counts_per_kind() {
        let monitor = ConnectionMonitor::new();
        monitor.record("/mail/inbox");
        monitor.record("/mail/outbox");
        monitor.record("/admin");
        assert_eq!(monitor.count("mail"), 2);
        assert_eq!(monitor.count("admin"), 1);
        assert_eq!(monitor.count("calendar"), 0);
        assert_eq!(monitor.snapshot().len(), 2);
    }
}
