//! Vulnerability findings and report types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a vulnerability, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map an advisory label (`CRITICAL`, `HIGH`, `MODERATE`, ...)
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Severity::Critical),
            "HIGH" => Some(Severity::High),
            "MODERATE" | "MEDIUM" => Some(Severity::Medium),
            "LOW" => Some(Severity::Low),
            _ => None,
        }
    }

    /// Map a CVSS base score
    pub fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            Severity::Critical
        } else if score >= 7.0 {
            Severity::High
        } else if score >= 4.0 {
            Severity::Medium
        } else if score > 0.0 {
            Severity::Low
        } else {
            Severity::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One known vulnerability affecting a package version
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub id: String,
    pub summary: String,
    pub aliases: Vec<String>,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f64>,
    pub fixed_versions: Vec<String>,
    pub references: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

/// Scan result for one package version
#[derive(Debug, Clone, Serialize)]
pub struct PackageScan {
    pub package: String,
    pub version: String,
    pub vulnerabilities: Vec<Finding>,
    pub highest_severity: Option<Severity>,
}

impl PackageScan {
    pub fn new(package: String, version: String, mut vulnerabilities: Vec<Finding>) -> Self {
        vulnerabilities.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));
        let highest_severity = vulnerabilities.iter().map(|f| f.severity).max();
        Self {
            package,
            version,
            vulnerabilities,
            highest_severity,
        }
    }

    pub fn is_vulnerable(&self) -> bool {
        !self.vulnerabilities.is_empty()
    }
}

/// A requirements-file entry that was not scanned
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRequirement {
    pub line: usize,
    pub requirement: String,
    pub reason: String,
}

/// Counts across a report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeveritySummary {
    pub total_packages: usize,
    pub vulnerable_packages: usize,
    pub total_vulnerabilities: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unknown: usize,
}

impl SeveritySummary {
    pub fn from_scans(scans: &[PackageScan]) -> Self {
        let mut summary = SeveritySummary {
            total_packages: scans.len(),
            ..Default::default()
        };
        for scan in scans {
            if scan.is_vulnerable() {
                summary.vulnerable_packages += 1;
            }
            for finding in &scan.vulnerabilities {
                summary.total_vulnerabilities += 1;
                match finding.severity {
                    Severity::Critical => summary.critical += 1,
                    Severity::High => summary.high += 1,
                    Severity::Medium => summary.medium += 1,
                    Severity::Low => summary.low += 1,
                    Severity::Unknown => summary.unknown += 1,
                }
            }
        }
        summary
    }
}

/// Result of scanning a requirements file
#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub source: String,
    pub packages: Vec<PackageScan>,
    pub skipped: Vec<SkippedRequirement>,
    pub summary: SeveritySummary,
}
