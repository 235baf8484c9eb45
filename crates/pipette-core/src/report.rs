use crate::types::Mount;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A non-fatal policy finding collected during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunWarning {
    /// Plan line the warning belongs to, when it belongs to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub transfers: usize,
    pub distributes: usize,
    pub aspirates: usize,
    pub dispenses: usize,
    /// Tips picked up per mount, across refills. Verification tips are
    /// returned to the rack and not counted.
    pub tips_used: BTreeMap<Mount, u32>,
    pub refills: u32,
    pub warnings: Vec<RunWarning>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            transfers: 0,
            distributes: 0,
            aspirates: 0,
            dispenses: 0,
            tips_used: BTreeMap::new(),
            refills: 0,
            warnings: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn tip_used(&mut self, mount: Mount) {
        *self.tips_used.entry(mount).or_insert(0) += 1;
    }

    pub fn total_tips(&self) -> u32 {
        self.tips_used.values().sum()
    }

    pub fn has_warning(&self, needle: &str) -> bool {
        self.warnings.iter().any(|w| w.message.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tip_counts_per_mount() {
        let mut report = RunReport::start();
        report.tip_used(Mount::Left);
        report.tip_used(Mount::Left);
        report.tip_used(Mount::Right);
        assert_eq!(report.tips_used[&Mount::Left], 2);
        assert_eq!(report.total_tips(), 3);
    }

    #[test]
    fn warning_display_includes_line() {
        let w = RunWarning {
            line: Some(4),
            message: "tip dipped into a filled destination".into(),
        };
        assert_eq!(w.to_string(), "line 4: tip dipped into a filled destination");
    }

    #[test]
    fn report_serializes_mounts_as_keys() {
        let mut report = RunReport::start();
        report.tip_used(Mount::Right);
        report.finish();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tips_used"]["right"], 1);
        assert!(json["finished_at"].is_string());
    }
}
