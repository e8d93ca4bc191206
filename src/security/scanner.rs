//! Package and requirements-file vulnerability scanning

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::pypi::requirements::{read_requirements_file, Requirement};
use crate::pypi::utils::{sanitize_package_name, sanitize_version};
use crate::pypi::PypiClient;
use crate::security::osv::OsvClient;
use crate::security::types::{PackageScan, SecurityReport, SeveritySummary, SkippedRequirement};

/// Packages scanned concurrently for a requirements file
pub const SCAN_CONCURRENCY: usize = 8;

/// Scans packages against the OSV database
pub struct SecurityScanner {
    pypi: Arc<PypiClient>,
    osv: OsvClient,
}

impl SecurityScanner {
    /// Create a scanner sharing the PyPI client's HTTP wrapper and cache
    pub fn new(pypi: Arc<PypiClient>, osv_url: impl Into<String>) -> Self {
        let osv = OsvClient::new(pypi.http().clone(), osv_url);
        Self { pypi, osv }
    }

    /// Scan one package version; the latest release when no version is given
    pub async fn scan_package(&self, name: &str, version: Option<&str>) -> Result<PackageScan> {
        let name = sanitize_package_name(name)?;
        let version = match version {
            Some(v) => sanitize_version(v)?,
            None => self.pypi.get_latest_version(&name).await?.version,
        };

        let findings = self
            .osv
            .query(&name, &version)
            .await?
            .into_iter()
            .map(|v| v.into_finding(&name))
            .collect();

        let scan = PackageScan::new(name, version, findings);
        tracing::info!(
            "Scanned {} {}: {} vulnerabilities",
            scan.package,
            scan.version,
            scan.vulnerabilities.len()
        );
        Ok(scan)
    }

    /// Pinned version, else the highest stable release the specifier allows
    async fn scan_requirement(&self, req: &Requirement) -> Result<PackageScan> {
        let version = self.pypi.resolve_version(&req.name, &req.specifier).await?;
        self.scan_package(&req.name, Some(&version)).await
    }

    /// Scan every requirement of a requirements file
    pub async fn scan_requirements_file(&self, path: &str) -> Result<SecurityReport> {
        let lines = read_requirements_file(path)?;
        let mut skipped = Vec::new();
        let mut targets: Vec<(usize, String, Requirement)> = Vec::new();

        for line in lines {
            match line.requirement {
                Ok(req) if req.url.is_some() => skipped.push(SkippedRequirement {
                    line: line.line_number,
                    requirement: line.text,
                    reason: "direct URL requirements are not scanned".to_string(),
                }),
                Ok(req) => targets.push((line.line_number, line.text, req)),
                Err(reason) => skipped.push(SkippedRequirement {
                    line: line.line_number,
                    requirement: line.text,
                    reason,
                }),
            }
        }

        let outcomes: Vec<std::result::Result<PackageScan, SkippedRequirement>> =
            stream::iter(targets)
                .map(|(line, text, req)| async move {
                    self.scan_requirement(&req).await.map_err(|e| {
                        tracing::warn!("Could not scan '{}': {}", text, e);
                        SkippedRequirement {
                            line,
                            requirement: text.clone(),
                            reason: e.to_string(),
                        }
                    })
                })
                .buffer_unordered(SCAN_CONCURRENCY)
                .collect()
                .await;

        let mut packages = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(scan) => packages.push(scan),
                Err(skip) => skipped.push(skip),
            }
        }
        packages.sort_by_key(|scan| scan.package.to_ascii_lowercase());
        skipped.sort_by_key(|s| s.line);

        let summary = SeveritySummary::from_scans(&packages);
        Ok(SecurityReport {
            source: path.to_string(),
            packages,
            skipped,
            summary,
        })
    }
}
