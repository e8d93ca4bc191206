//! PyPI API types and operation results
//!
//! The document types mirror the PyPI JSON API; the result types are what
//! the client hands back to tools and the CLI.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `/pypi/{name}/json` or `/pypi/{name}/{version}/json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDocument {
    pub info: PackageInfoFields,

    /// Release version -> files. Absent on version-specific documents.
    #[serde(default)]
    pub releases: BTreeMap<String, Vec<ReleaseFile>>,

    /// Files of the described version
    #[serde(default)]
    pub urls: Vec<ReleaseFile>,
}

/// The `info` block of a package document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageInfoFields {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub maintainer: Option<String>,
    #[serde(default)]
    pub maintainer_email: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub classifiers: Vec<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub home_page: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub docs_url: Option<String>,
    #[serde(default)]
    pub requires_python: Option<String>,
    #[serde(default)]
    pub requires_dist: Option<Vec<String>>,
    /// Label -> URL, in document order
    #[serde(default)]
    pub project_urls: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub package_url: Option<String>,
}

/// One distribution file of a release
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseFile {
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub packagetype: Option<String>,
    #[serde(default)]
    pub python_version: Option<String>,
    #[serde(default)]
    pub requires_python: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub digests: BTreeMap<String, String>,
    #[serde(default)]
    pub upload_time_iso_8601: Option<String>,
    #[serde(default)]
    pub yanked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatestVersion {
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseList {
    /// Oldest first
    pub releases: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseUrls {
    pub urls: Vec<ReleaseFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UrlResult {
    pub url: String,
}

/// One `<item>` of a PyPI RSS feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackagesFeed {
    pub packages: Vec<FeedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatesFeed {
    pub updates: Vec<FeedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectReleasesFeed {
    pub releases: Vec<FeedItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub name: String,
    pub version: String,
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub search_url: String,
    pub results: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionComparison {
    pub version1: String,
    pub version2: String,
    pub is_version1_greater: bool,
    pub is_version2_greater: bool,
    pub are_equal: bool,
}

/// A direct dependency taken from `requires_dist`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dependency {
    pub name: String,
    pub version_spec: String,
    pub extras: Vec<String>,
    pub marker: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyList {
    pub dependencies: Vec<Dependency>,
}

/// Node of a resolved dependency tree
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub name: String,
    pub version: Option<String>,
    pub dependencies: Vec<TreeNode>,
    /// Set on repeat occurrences, which are not expanded again
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cycle: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyTree {
    pub tree: TreeNode,
    pub flat_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageExists {
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageMetadata {
    pub metadata: PackageInfoFields,
}

/// Recent download counts from pypistats.org
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageStats {
    pub package: String,
    pub last_day: u64,
    pub last_week: u64,
    pub last_month: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentationUrl {
    pub docs_url: String,
    pub summary: String,
}

/// Status of one requirement from a requirements file
#[derive(Debug, Clone, Serialize)]
pub struct RequirementStatus {
    pub package: String,
    pub current_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequirementsCheck {
    pub outdated: Vec<RequirementStatus>,
    pub up_to_date: Vec<RequirementStatus>,
}
