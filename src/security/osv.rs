//! OSV (Open Source Vulnerabilities) API client

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::endpoints::OSV_ECOSYSTEM;
use crate::error::Result;
use crate::pypi::utils::normalize_name;
use crate::pypi::version::Version;
use crate::pypi::HttpClient;
use crate::security::cvss;
use crate::security::types::{Finding, Severity};

/// Guard against servers that keep returning page tokens
const MAX_PAGES: usize = 20;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub vulns: Vec<OsvVulnerability>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// An OSV vulnerability record
#[derive(Debug, Clone, Deserialize)]
pub struct OsvVulnerability {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub severity: Vec<OsvSeverity>,
    #[serde(default)]
    pub affected: Vec<OsvAffected>,
    #[serde(default)]
    pub references: Vec<OsvReference>,
    #[serde(default)]
    pub database_specific: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsvSeverity {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub score: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsvAffected {
    #[serde(default)]
    pub package: Option<OsvPackage>,
    #[serde(default)]
    pub ranges: Vec<OsvRange>,
    #[serde(default)]
    pub database_specific: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsvPackage {
    pub name: String,
    #[serde(default)]
    pub ecosystem: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsvRange {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub events: Vec<OsvEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsvEvent {
    #[serde(default)]
    pub introduced: Option<String>,
    #[serde(default)]
    pub fixed: Option<String>,
    #[serde(default)]
    pub last_affected: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsvReference {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub url: String,
}

fn severity_label(value: &Option<Value>) -> Option<Severity> {
    value
        .as_ref()?
        .get("severity")?
        .as_str()
        .and_then(Severity::from_label)
}

impl OsvVulnerability {
    /// Severity and best available score.
    ///
    /// Advisory labels win; otherwise the highest `severity[]` score decides.
    pub fn classify(&self) -> (Severity, Option<f64>) {
        let score = self
            .severity
            .iter()
            .filter_map(|s| cvss::score(&s.score))
            .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))));

        let label = severity_label(&self.database_specific).or_else(|| {
            self.affected
                .iter()
                .filter_map(|a| severity_label(&a.database_specific))
                .max()
        });

        match (label, score) {
            (Some(label), score) => (label, score),
            (None, Some(score)) => (Severity::from_score(score), Some(score)),
            (None, None) => (Severity::Unknown, None),
        }
    }

    /// Versions fixing this vulnerability for the given package
    pub fn fixed_versions(&self, package: &str) -> Vec<String> {
        let wanted = normalize_name(package);
        let mut fixed: Vec<String> = self
            .affected
            .iter()
            .filter(|a| {
                a.package
                    .as_ref()
                    .map(|p| normalize_name(&p.name) == wanted)
                    .unwrap_or(false)
            })
            .flat_map(|a| a.ranges.iter())
            .flat_map(|r| r.events.iter())
            .filter_map(|e| e.fixed.clone())
            .collect();

        fixed.sort_by(|a, b| match (Version::parse(a), Version::parse(b)) {
            (Ok(va), Ok(vb)) => va.cmp(&vb),
            _ => a.cmp(b),
        });
        fixed.dedup();
        fixed
    }

    pub fn into_finding(self, package: &str) -> Finding {
        let (severity, cvss_score) = self.classify();
        let fixed_versions = self.fixed_versions(package);
        let summary = self
            .summary
            .filter(|s| !s.trim().is_empty())
            .or_else(|| {
                self.details
                    .as_deref()
                    .and_then(|d| d.lines().find(|l| !l.trim().is_empty()))
                    .map(|l| l.trim().chars().take(200).collect())
            })
            .unwrap_or_default();

        Finding {
            id: self.id,
            summary,
            aliases: self.aliases,
            severity,
            cvss_score,
            fixed_versions,
            references: self.references.into_iter().map(|r| r.url).collect(),
            published: self.published,
        }
    }
}

/// Client for the OSV query API
pub struct OsvClient {
    http: Arc<HttpClient>,
    base_url: String,
}

impl OsvClient {
    pub fn new(http: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// All vulnerabilities recorded for a PyPI package version
    pub async fn query(&self, package: &str, version: &str) -> Result<Vec<OsvVulnerability>> {
        let url = format!("{}/v1/query", self.base_url);
        let mut vulns = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut payload = json!({
                "package": {"name": package, "ecosystem": OSV_ECOSYSTEM},
                "version": version,
            });
            if let Some(token) = &page_token {
                payload["page_token"] = json!(token);
            }

            let body = self.http.post_json(&url, &payload).await?;
            let page: QueryResponse = serde_json::from_value(body)?;
            vulns.extend(page.vulns);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!("OSV reports {} vulnerabilities for {} {}", vulns.len(), package, version);
        Ok(vulns)
    }
}
