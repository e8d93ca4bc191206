//! PyPI API client
//!
//! High-level client for PyPI JSON API, RSS feed, search and pypistats
//! operations. All traffic goes through the shared [`HttpClient`].

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::cache::HybridCache;
use crate::config::Config;
use crate::error::{PypiError, PypiMcpError, Result, ValidationError};
use crate::pypi::feeds::parse_feed;
use crate::pypi::http::{HttpClient, HttpSettings};
use crate::pypi::requirements::{read_requirements_file, Requirement, SpecifierSet};
use crate::pypi::search::parse_search_page;
use crate::pypi::types::*;
use crate::pypi::utils::{normalize_name, sanitize_package_name, sanitize_version, source_url, wheel_url};
use crate::pypi::version::Version;

/// Default dependency tree depth
pub const DEFAULT_TREE_DEPTH: usize = 3;

/// Concurrent latest-version lookups when checking a requirements file
const REQUIREMENT_LOOKUPS: usize = 8;

const UNSPECIFIED: &str = "unspecified (latest)";

/// PyPI client
pub struct PypiClient {
    http: Arc<HttpClient>,
    pypi_url: String,
    files_url: String,
    stats_url: String,
}

impl PypiClient {
    /// Create a client with its own HTTP wrapper over the given cache
    pub fn new(config: &Config, cache: Arc<HybridCache>) -> Result<Self> {
        let http = Arc::new(HttpClient::new(HttpSettings::from(config), cache)?);
        Ok(Self::with_http(config, http))
    }

    /// Create a client sharing an existing HTTP wrapper
    pub fn with_http(config: &Config, http: Arc<HttpClient>) -> Self {
        Self {
            http,
            pypi_url: config.pypi_url.clone(),
            files_url: config.files_url.clone(),
            stats_url: config.stats_url.clone(),
        }
    }

    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }

    pub fn cache(&self) -> &Arc<HybridCache> {
        self.http.cache()
    }

    fn package_url(&self, name: &str, version: Option<&str>) -> String {
        match version {
            Some(version) => format!("{}/pypi/{}/{}/json", self.pypi_url, name, version),
            None => format!("{}/pypi/{}/json", self.pypi_url, name),
        }
    }

    /// Fetch the raw package document, mapping 404 to a package error
    async fn fetch_json(&self, name: &str, version: Option<&str>) -> Result<Value> {
        let name = sanitize_package_name(name)?;
        let version = version.map(sanitize_version).transpose()?;
        let url = self.package_url(&name, version.as_deref());

        self.http.get_json(&url).await.map_err(|e| match (e, &version) {
            (e, None) if e.is_not_found() => {
                PypiMcpError::from(PypiError::PackageNotFound { name: name.clone() })
            }
            (e, Some(version)) if e.is_not_found() => PypiMcpError::from(PypiError::NotFound {
                resource: format!("{} {}", name, version),
            }),
            (e, _) => e,
        })
    }

    async fn document(&self, name: &str, version: Option<&str>) -> Result<PackageDocument> {
        let value = self.fetch_json(name, version).await?;
        Ok(serde_json::from_value(value)?)
    }

    // ==================== Package Information ====================

    /// Full package document (`info`, `releases`, `urls`, ...)
    pub async fn get_package_info(&self, name: &str) -> Result<Value> {
        self.fetch_json(name, None).await
    }

    pub async fn get_latest_version(&self, name: &str) -> Result<LatestVersion> {
        let doc = self.document(name, None).await?;
        Ok(LatestVersion {
            version: doc.info.version,
        })
    }

    /// All release versions, oldest first. Versions that do not follow
    /// PEP 440 are left out.
    pub async fn get_package_releases(&self, name: &str) -> Result<ReleaseList> {
        let doc = self.document(name, None).await?;
        let releases = sorted_versions(doc.releases.keys())
            .into_iter()
            .map(|v| v.1)
            .collect();
        Ok(ReleaseList { releases })
    }

    pub async fn get_release_urls(&self, name: &str, version: &str) -> Result<ReleaseUrls> {
        let doc = self.document(name, Some(version)).await?;
        Ok(ReleaseUrls { urls: doc.urls })
    }

    pub fn get_source_url(&self, name: &str, version: &str) -> Result<UrlResult> {
        let name = sanitize_package_name(name)?;
        let version = sanitize_version(version)?;
        Ok(UrlResult {
            url: source_url(&self.files_url, &name, &version),
        })
    }

    pub fn get_wheel_url(
        &self,
        name: &str,
        version: &str,
        python_tag: &str,
        abi_tag: &str,
        platform_tag: &str,
        build_tag: Option<&str>,
    ) -> Result<UrlResult> {
        let name = sanitize_package_name(name)?;
        let version = sanitize_version(version)?;
        for (param, tag) in [
            ("python_tag", python_tag),
            ("abi_tag", abi_tag),
            ("platform_tag", platform_tag),
        ] {
            if tag.trim().is_empty() {
                return Err(ValidationError::InvalidParameter {
                    name: param.to_string(),
                    message: "must not be empty".to_string(),
                }
                .into());
            }
        }

        Ok(UrlResult {
            url: wheel_url(
                &self.files_url,
                &name,
                &version,
                python_tag,
                abi_tag,
                platform_tag,
                build_tag,
            ),
        })
    }

    pub async fn get_package_metadata(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PackageMetadata> {
        let doc = self.document(name, version).await?;
        Ok(PackageMetadata { metadata: doc.info })
    }

    pub async fn check_package_exists(&self, name: &str) -> Result<PackageExists> {
        match self.fetch_json(name, None).await {
            Ok(_) => Ok(PackageExists { exists: true }),
            Err(e) if e.is_not_found() => Ok(PackageExists { exists: false }),
            Err(e) => Err(e),
        }
    }

    /// Documentation link: a docs-like `project_urls` entry, then
    /// `docs_url`, then `home_page`, then a readthedocs guess
    pub async fn get_documentation_url(&self, name: &str) -> Result<DocumentationUrl> {
        let doc = self.document(name, None).await?;
        let info = doc.info;
        let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.trim().is_empty());

        let from_project_urls = info.project_urls.as_ref().and_then(|urls| {
            urls.iter().find_map(|(key, url)| {
                let key = key.to_ascii_lowercase();
                let url = url.as_str().filter(|u| !u.is_empty())?;
                ["doc", "docs", "documentation", "readthedocs", "rtd"]
                    .iter()
                    .any(|term| key.contains(term))
                    .then(|| url.to_string())
            })
        });

        let docs_url = from_project_urls
            .or_else(|| non_empty(&info.docs_url))
            .or_else(|| non_empty(&info.home_page))
            .unwrap_or_else(|| {
                format!("https://readthedocs.org/projects/{}/", normalize_name(name))
            });

        Ok(DocumentationUrl {
            docs_url,
            summary: non_empty(&info.summary).unwrap_or_else(|| "No summary available".to_string()),
        })
    }

    /// Recent downloads from pypistats.org
    pub async fn get_package_stats(&self, name: &str) -> Result<PackageStats> {
        let name = sanitize_package_name(name)?;
        if !self.check_package_exists(&name).await?.exists {
            return Err(PypiError::PackageNotFound { name }.into());
        }

        let url = format!(
            "{}/api/packages/{}/recent",
            self.stats_url,
            normalize_name(&name)
        );
        let body = self.http.get_json(&url).await?;
        let data = body.get("data").ok_or_else(|| PypiError::BadResponse {
            url: url.clone(),
            message: "missing 'data' field".to_string(),
        })?;
        let count = |field: &str| data.get(field).and_then(Value::as_u64).unwrap_or(0);

        Ok(PackageStats {
            package: name.clone(),
            last_day: count("last_day"),
            last_week: count("last_week"),
            last_month: count("last_month"),
        })
    }

    // ==================== Feeds & Search ====================

    async fn feed(&self, url: &str) -> Result<Vec<FeedItem>> {
        let xml = self.http.get_text(url).await?;
        parse_feed(&xml, url)
    }

    pub async fn get_newest_packages(&self) -> Result<PackagesFeed> {
        let url = format!("{}/rss/packages.xml", self.pypi_url);
        Ok(PackagesFeed {
            packages: self.feed(&url).await?,
        })
    }

    pub async fn get_latest_updates(&self) -> Result<UpdatesFeed> {
        let url = format!("{}/rss/updates.xml", self.pypi_url);
        Ok(UpdatesFeed {
            updates: self.feed(&url).await?,
        })
    }

    pub async fn get_project_releases(&self, name: &str) -> Result<ProjectReleasesFeed> {
        let name = sanitize_package_name(name)?;
        let url = format!("{}/rss/project/{}/releases.xml", self.pypi_url, name);
        let releases = self.feed(&url).await.map_err(|e| {
            if e.is_not_found() {
                PypiMcpError::from(PypiError::PackageNotFound { name: name.clone() })
            } else {
                e
            }
        })?;
        Ok(ProjectReleasesFeed { releases })
    }

    pub async fn search_packages(&self, query: &str, page: u32) -> Result<SearchResult> {
        if query.trim().is_empty() {
            return Err(ValidationError::InvalidParameter {
                name: "query".to_string(),
                message: "must not be empty".to_string(),
            }
            .into());
        }
        let url = format!(
            "{}/search/?q={}&page={}",
            self.pypi_url,
            urlencoding::encode(query.trim()),
            page.max(1)
        );
        let html = self.http.get_text(&url).await?;
        Ok(parse_search_page(&html, &self.pypi_url, &url))
    }

    // ==================== Versions ====================

    pub fn compare_versions(
        &self,
        name: &str,
        version1: &str,
        version2: &str,
    ) -> Result<VersionComparison> {
        sanitize_package_name(name)?;
        let v1 = Version::parse(&sanitize_version(version1)?)?;
        let v2 = Version::parse(&sanitize_version(version2)?)?;

        Ok(VersionComparison {
            version1: version1.trim().to_string(),
            version2: version2.trim().to_string(),
            is_version1_greater: v1 > v2,
            is_version2_greater: v2 > v1,
            are_equal: v1 == v2,
        })
    }

    /// Highest stable release satisfying the specifier, else the latest version
    pub async fn resolve_version(&self, name: &str, specifier: &SpecifierSet) -> Result<String> {
        let doc = self.document(name, None).await?;
        if let Some(pinned) = specifier.pinned_version() {
            return Ok(pinned.to_string());
        }

        let versions = sorted_versions(doc.releases.keys());
        let best = versions
            .iter()
            .rev()
            .find(|(v, _)| specifier.contains(v, false))
            .map(|(_, raw)| raw.clone());

        Ok(best.unwrap_or(doc.info.version))
    }

    // ==================== Dependencies ====================

    async fn requirements(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Vec<(String, std::result::Result<Requirement, ValidationError>)>> {
        let doc = self.document(name, version).await?;
        Ok(doc
            .info
            .requires_dist
            .unwrap_or_default()
            .into_iter()
            .map(|raw| {
                let parsed = Requirement::parse(&raw);
                (raw, parsed)
            })
            .collect())
    }

    pub async fn get_dependencies(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<DependencyList> {
        let dependencies = self
            .requirements(name, version)
            .await?
            .into_iter()
            .map(|(raw, parsed)| match parsed {
                Ok(req) => Dependency {
                    name: req.name,
                    version_spec: req.specifier.to_string(),
                    extras: req.extras,
                    marker: req.marker,
                },
                Err(e) => {
                    tracing::warn!("Couldn't parse requirement '{}': {}", raw, e);
                    Dependency {
                        name: fallback_name(&raw),
                        version_spec: String::new(),
                        extras: Vec::new(),
                        marker: Some("Parse error".to_string()),
                    }
                }
            })
            .collect();

        Ok(DependencyList { dependencies })
    }

    /// Breadth-first dependency tree. Each (name, version) pair is expanded
    /// once; later occurrences become leaves flagged as `cycle`.
    pub async fn get_dependency_tree(
        &self,
        name: &str,
        version: Option<&str>,
        depth: usize,
    ) -> Result<DependencyTree> {
        let name = sanitize_package_name(name)?;
        let root_version = match version {
            Some(v) => sanitize_version(v)?,
            None => self.get_latest_version(&name).await?.version,
        };

        let mut arena: Vec<ArenaNode> = Vec::new();
        let mut visited: HashSet<(String, Option<String>)> = HashSet::new();
        let mut flat_list = Vec::new();
        let mut queue = VecDeque::from([Pending {
            name: name.clone(),
            version: Some(root_version),
            level: 0,
            parent: None,
        }]);

        while let Some(item) = queue.pop_front() {
            let key = (normalize_name(&item.name), item.version.clone());
            let repeat = !visited.insert(key);

            let index = arena.len();
            arena.push(ArenaNode {
                name: item.name.clone(),
                version: item.version.clone(),
                children: Vec::new(),
                cycle: repeat,
            });
            if let Some(parent) = item.parent {
                arena[parent].children.push(index);
            }
            if repeat {
                continue;
            }

            flat_list.push(match &item.version {
                Some(v) => format!("{} ({})", item.name, v),
                None => item.name.clone(),
            });

            let Some(version) = item.version.as_deref() else {
                continue;
            };
            if item.level >= depth {
                continue;
            }

            let requirements = match self.requirements(&item.name, Some(version)).await {
                Ok(reqs) => reqs,
                Err(e) => {
                    tracing::warn!("Skipping dependencies of {} {}: {}", item.name, version, e);
                    continue;
                }
            };

            for (_, parsed) in requirements {
                let Ok(req) = parsed else { continue };
                if req.is_extra_only() {
                    continue;
                }
                let dep_version = match self.resolve_version(&req.name, &req.specifier).await {
                    Ok(v) => Some(v),
                    Err(e) => {
                        tracing::debug!("Couldn't resolve {}: {}", req.name, e);
                        None
                    }
                };
                queue.push_back(Pending {
                    name: req.name,
                    version: dep_version,
                    level: item.level + 1,
                    parent: Some(index),
                });
            }
        }

        Ok(DependencyTree {
            tree: build_tree(&arena, 0),
            flat_list,
        })
    }

    // ==================== Requirements Files ====================

    /// Compare each requirement of a file against the latest release
    pub async fn check_requirements_file(&self, path: &str) -> Result<RequirementsCheck> {
        let lines = read_requirements_file(path)?;
        let requirements: Vec<Requirement> = lines
            .into_iter()
            .filter_map(|line| match line.requirement {
                Ok(req) => Some(req),
                Err(e) => {
                    tracing::warn!("Skipping line {} ('{}'): {}", line.line_number, line.text, e);
                    None
                }
            })
            .collect();

        let statuses: Vec<Option<(bool, RequirementStatus)>> = stream::iter(requirements)
            .map(|req| async move {
                match self.get_latest_version(&req.name).await {
                    Ok(latest) => requirement_status(&req, &latest.version),
                    Err(e) => {
                        tracing::debug!("Skipping {}: {}", req.name, e);
                        None
                    }
                }
            })
            .buffered(REQUIREMENT_LOOKUPS)
            .collect()
            .await;

        let mut check = RequirementsCheck {
            outdated: Vec::new(),
            up_to_date: Vec::new(),
        };
        for (outdated, status) in statuses.into_iter().flatten() {
            if outdated {
                check.outdated.push(status);
            } else {
                check.up_to_date.push(status);
            }
        }
        Ok(check)
    }
}

/// Classify a requirement against the latest version; `true` means outdated
fn requirement_status(req: &Requirement, latest: &str) -> Option<(bool, RequirementStatus)> {
    let latest_version = match Version::parse(latest) {
        Ok(v) => v,
        Err(_) => {
            tracing::debug!("Latest version '{}' of {} is not PEP 440", latest, req.name);
            return None;
        }
    };

    let status = |current: String, outdated: bool| {
        Some((
            outdated,
            RequirementStatus {
                package: req.name.clone(),
                current_version: current,
                latest_version: outdated.then(|| latest.to_string()),
            },
        ))
    };

    if let Some(pinned) = req.specifier.pinned_version() {
        let outdated = Version::parse(pinned)
            .map(|p| latest_version > p)
            .unwrap_or(false);
        return status(pinned.to_string(), outdated);
    }

    if req.specifier.is_empty() {
        return status(UNSPECIFIED.to_string(), false);
    }

    let outdated = !req.specifier.contains(&latest_version, true);
    status(req.specifier.to_string(), outdated)
}

/// Release keys that parse as PEP 440, sorted oldest first
fn sorted_versions<'a, I>(keys: I) -> Vec<(Version, String)>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut versions: Vec<(Version, String)> = keys
        .into_iter()
        .filter_map(|raw| Version::parse(raw).ok().map(|v| (v, raw.clone())))
        .collect();
    versions.sort_by(|a, b| a.0.cmp(&b.0));
    versions
}

/// Best-effort name for a `requires_dist` entry that failed to parse
fn fallback_name(raw: &str) -> String {
    let head = raw
        .split([':', ';'])
        .next()
        .unwrap_or(raw)
        .split_whitespace()
        .next()
        .unwrap_or("");
    head.split(['<', '>', '=', '!', '~', '[', '('])
        .next()
        .unwrap_or(head)
        .to_string()
}

struct Pending {
    name: String,
    version: Option<String>,
    level: usize,
    parent: Option<usize>,
}

struct ArenaNode {
    name: String,
    version: Option<String>,
    children: Vec<usize>,
    cycle: bool,
}

fn build_tree(arena: &[ArenaNode], index: usize) -> TreeNode {
    let node = &arena[index];
    TreeNode {
        name: node.name.clone(),
        version: node.version.clone(),
        dependencies: node
            .children
            .iter()
            .map(|&child| build_tree(arena, child))
            .collect(),
        cycle: node.cycle,
    }
}
