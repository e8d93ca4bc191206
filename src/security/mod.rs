//! Vulnerability scanning against the OSV database

pub mod cvss;
pub mod osv;
pub mod report;
pub mod scanner;
pub mod types;

pub use report::format_report;
pub use scanner::SecurityScanner;
pub use types::{Finding, PackageScan, SecurityReport, Severity, SeveritySummary};
