//! Markdown rendering of security reports

use std::fmt::Write;

use crate::security::types::{PackageScan, SecurityReport, Severity};

/// Render a report as Markdown, most severe packages first
pub fn format_report(report: &SecurityReport) -> String {
    let mut out = String::new();
    let s = &report.summary;

    let _ = writeln!(out, "# Security Report: {}", report.source);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Scanned {} packages: {} vulnerable, {} known vulnerabilities.",
        s.total_packages, s.vulnerable_packages, s.total_vulnerabilities
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "| Severity | Count |");
    let _ = writeln!(out, "|----------|-------|");
    for (label, count) in [
        ("Critical", s.critical),
        ("High", s.high),
        ("Medium", s.medium),
        ("Low", s.low),
        ("Unknown", s.unknown),
    ] {
        let _ = writeln!(out, "| {} | {} |", label, count);
    }

    let mut vulnerable: Vec<&PackageScan> =
        report.packages.iter().filter(|p| p.is_vulnerable()).collect();
    vulnerable.sort_by(|a, b| {
        b.highest_severity
            .cmp(&a.highest_severity)
            .then_with(|| b.vulnerabilities.len().cmp(&a.vulnerabilities.len()))
            .then_with(|| a.package.cmp(&b.package))
    });

    for scan in vulnerable {
        let _ = writeln!(out);
        format_package(&mut out, scan);
    }

    let clean: Vec<String> = report
        .packages
        .iter()
        .filter(|p| !p.is_vulnerable())
        .map(|p| format!("{} {}", p.package, p.version))
        .collect();
    if !clean.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## No known vulnerabilities");
        let _ = writeln!(out);
        for entry in clean {
            let _ = writeln!(out, "- {}", entry);
        }
    }

    if !report.skipped.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Skipped");
        let _ = writeln!(out);
        for skip in &report.skipped {
            let _ = writeln!(out, "- line {}: `{}` ({})", skip.line, skip.requirement, skip.reason);
        }
    }

    out
}

fn format_package(out: &mut String, scan: &PackageScan) {
    let highest = scan.highest_severity.unwrap_or(Severity::Unknown);
    let _ = writeln!(
        out,
        "## {} {} ({})",
        scan.package,
        scan.version,
        highest.as_str().to_ascii_uppercase()
    );
    let _ = writeln!(out);

    for finding in &scan.vulnerabilities {
        let score = finding
            .cvss_score
            .map(|s| format!(", CVSS {:.1}", s))
            .unwrap_or_default();
        let _ = write!(out, "- **{}** ({}{})", finding.id, finding.severity, score);
        if !finding.summary.is_empty() {
            let _ = write!(out, ": {}", finding.summary);
        }
        let _ = writeln!(out);

        if !finding.aliases.is_empty() {
            let _ = writeln!(out, "  - Aliases: {}", finding.aliases.join(", "));
        }
        if finding.fixed_versions.is_empty() {
            let _ = writeln!(out, "  - Fixed in: no fix released");
        } else {
            let _ = writeln!(out, "  - Fixed in: {}", finding.fixed_versions.join(", "));
        }
    }
}
