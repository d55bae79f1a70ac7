use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
    Success,
}

impl Severity {
    /// Sort rank; lower sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Warning => 1,
            Severity::Info => 2,
            Severity::Success => 3,
        }
    }

    pub fn is_problem(self) -> bool {
        matches!(self, Severity::Critical | Severity::Warning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Info => write!(f, "INFO"),
            Severity::Success => write!(f, "OK"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Performance,
    Security,
    Protocol,
    Network,
    General,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Performance => write!(f, "performance"),
            Category::Security => write!(f, "security"),
            Category::Protocol => write!(f, "protocol"),
            Category::Network => write!(f, "network"),
            Category::General => write!(f, "general"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub category: Category,
    pub title: String,
    pub description: String,
    pub details: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_packets: Option<Vec<usize>>,
}

impl Finding {
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        category: Category,
        title: impl Into<String>,
    ) -> Self {
        Finding {
            id: id.into(),
            severity,
            category,
            title: title.into(),
            description: String::new(),
            details: Vec::new(),
            recommendations: Vec::new(),
            affected_packets: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Keeps at most `limit` lines.
    pub fn details<I>(mut self, lines: I, limit: usize) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.details = lines.into_iter().take(limit).collect();
        self
    }

    pub fn recommend(mut self, lines: &[&str]) -> Self {
        self.recommendations = lines.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Keeps at most `limit` indices; an empty list leaves the field unset.
    pub fn affected(mut self, indices: &[usize], limit: usize) -> Self {
        if !indices.is_empty() {
            self.affected_packets = Some(indices.iter().copied().take(limit).collect());
        }
        self
    }
}

/// Stable sort by severity; equal severities keep emission order.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by_key(|f| f.severity.rank());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_is_stable_within_severity() {
        let mut findings = vec![
            Finding::new("a", Severity::Info, Category::General, "a"),
            Finding::new("b", Severity::Critical, Category::General, "b"),
            Finding::new("c", Severity::Info, Category::General, "c"),
            Finding::new("d", Severity::Critical, Category::General, "d"),
            Finding::new("e", Severity::Warning, Category::General, "e"),
        ];
        sort_findings(&mut findings);
        let ids: Vec<_> = findings.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["b", "d", "e", "a", "c"]);
    }

    #[test]
    fn builder_caps_lists() {
        let indices: Vec<usize> = (0..250).collect();
        let f = Finding::new("x", Severity::Warning, Category::Network, "x")
            .details((0..20).map(|i| i.to_string()), 10)
            .affected(&indices, 100);
        assert_eq!(f.details.len(), 10);
        assert_eq!(f.affected_packets.as_ref().unwrap().len(), 100);
        assert_eq!(f.affected_packets.as_ref().unwrap()[99], 99);
    }

    #[test]
    fn empty_affected_is_omitted() {
        let f = Finding::new("x", Severity::Info, Category::Network, "x").affected(&[], 100);
        assert!(f.affected_packets.is_none());
        let json = serde_json::to_value(&f).unwrap();
        assert!(json.get("affectedPackets").is_none());
        assert_eq!(json["severity"], "info");
    }
}
