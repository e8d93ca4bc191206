//! Input sanitizing and URL helpers

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, ValidationError};

fn package_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("package name pattern is valid"))
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._+!-]+$").expect("version pattern is valid"))
}

/// Validate a package name before it is placed into a URL
pub fn sanitize_package_name(name: &str) -> Result<String> {
    let name = name.trim();
    if !package_name_regex().is_match(name) {
        return Err(ValidationError::InvalidPackageName {
            name: name.to_string(),
        }
        .into());
    }
    Ok(name.to_string())
}

/// Validate a version string before it is placed into a URL
pub fn sanitize_version(version: &str) -> Result<String> {
    let version = version.trim();
    if !version_regex().is_match(version) {
        return Err(ValidationError::InvalidVersion {
            version: version.to_string(),
        }
        .into());
    }
    Ok(version.to_string())
}

/// PEP 503 normalization: lowercase, runs of `-_.` collapsed to `-`
pub fn normalize_name(name: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[-_.]+").expect("separator pattern is valid"));
    re.replace_all(name.trim(), "-").to_ascii_lowercase()
}

/// Wheel tags use `_` where dotted values would appear
fn wheel_tag(tag: &str) -> String {
    tag.replace('.', "_")
}

/// Predictable sdist URL on the file host
pub fn source_url(files_url: &str, name: &str, version: &str) -> String {
    let first = name.chars().next().unwrap_or('_');
    format!(
        "{}/packages/source/{}/{}/{}-{}.tar.gz",
        files_url, first, name, name, version
    )
}

/// Predictable wheel URL on the file host
pub fn wheel_url(
    files_url: &str,
    name: &str,
    version: &str,
    python_tag: &str,
    abi_tag: &str,
    platform_tag: &str,
    build_tag: Option<&str>,
) -> String {
    let python_tag = wheel_tag(python_tag);
    let build = build_tag
        .filter(|b| !b.is_empty())
        .map(|b| format!("-{}", wheel_tag(b)))
        .unwrap_or_default();
    let filename = format!(
        "{}-{}{}-{}-{}-{}.whl",
        name,
        version,
        build,
        python_tag,
        wheel_tag(abi_tag),
        wheel_tag(platform_tag)
    );
    let first = name.chars().next().unwrap_or('_');
    format!("{}/packages/{}/{}/{}/{}", files_url, python_tag, first, name, filename)
}

/// Decode the handful of HTML entities that appear in PyPI pages
pub fn unescape_html(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"&(#[0-9]+|#x[0-9a-fA-F]+|[a-z]+);").expect("entity pattern is valid"));

    re.replace_all(text, |caps: &regex::Captures| {
        let entity = &caps[1];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ if entity.starts_with("#x") => u32::from_str_radix(&entity[2..], 16)
                .ok()
                .and_then(char::from_u32),
            _ if entity.starts_with('#') => entity[1..].parse().ok().and_then(char::from_u32),
            _ => None,
        };
        decoded
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}
