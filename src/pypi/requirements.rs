//! PEP 508 requirement strings, version specifiers, and requirements files

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{PypiMcpError, ValidationError};
use crate::pypi::version::Version;

/// Specifier comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = "~=")]
    Compatible,
    #[serde(rename = "===")]
    Arbitrary,
}

impl Operator {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "==" => Operator::Equal,
            "!=" => Operator::NotEqual,
            "<" => Operator::Less,
            "<=" => Operator::LessEqual,
            ">" => Operator::Greater,
            ">=" => Operator::GreaterEqual,
            "~=" => Operator::Compatible,
            "===" => Operator::Arbitrary,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::Compatible => "~=",
            Operator::Arbitrary => "===",
        }
    }
}

/// A single version clause such as `>=2.0` or `==1.4.*`
#[derive(Debug, Clone)]
pub struct Specifier {
    pub operator: Operator,
    /// The version text as written, without any `.*` suffix
    pub version: String,
    pub wildcard: bool,
    parsed: Option<Version>,
}

impl Specifier {
    pub fn parse(clause: &str) -> Result<Self, String> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"^\s*(===|==|!=|~=|<=|>=|<|>)\s*([^\s,;]+)\s*$").expect("specifier pattern is valid")
        });

        let caps = re
            .captures(clause)
            .ok_or_else(|| format!("invalid specifier '{}'", clause.trim()))?;
        let operator = Operator::parse(&caps[1]).ok_or_else(|| format!("unknown operator '{}'", &caps[1]))?;
        let raw = caps[2].to_string();

        if operator == Operator::Arbitrary {
            return Ok(Self {
                operator,
                version: raw,
                wildcard: false,
                parsed: None,
            });
        }

        let (text, wildcard) = match raw.strip_suffix(".*") {
            Some(prefix) => (prefix.to_string(), true),
            None => (raw, false),
        };

        if wildcard && !matches!(operator, Operator::Equal | Operator::NotEqual) {
            return Err(format!("wildcard not allowed with '{}'", operator.as_str()));
        }

        let parsed = Version::parse(&text).map_err(|e| e.to_string())?;

        if operator == Operator::Compatible && parsed.release.len() < 2 {
            return Err(format!("'~=' needs at least two release segments: {}", text));
        }

        Ok(Self {
            operator,
            version: text,
            wildcard,
            parsed: Some(parsed),
        })
    }

    /// True if this clause names a pre-release
    pub fn names_prerelease(&self) -> bool {
        self.parsed
            .as_ref()
            .map(|v| v.is_prerelease())
            .unwrap_or(false)
    }

    /// Whether a candidate version satisfies this clause
    pub fn contains(&self, candidate: &Version) -> bool {
        let Some(spec) = &self.parsed else {
            return candidate.to_string().eq_ignore_ascii_case(&self.version);
        };

        match self.operator {
            Operator::Equal if self.wildcard => prefix_match(spec, candidate),
            Operator::NotEqual if self.wildcard => !prefix_match(spec, candidate),
            Operator::Equal => equal(spec, candidate),
            Operator::NotEqual => !equal(spec, candidate),
            Operator::LessEqual => candidate.public() <= *spec,
            Operator::GreaterEqual => candidate.public() >= *spec,
            Operator::Less => {
                let candidate = candidate.public();
                candidate < *spec
                    && !(!spec.is_prerelease()
                        && candidate.is_prerelease()
                        && candidate.base() == spec.base())
            }
            Operator::Greater => {
                let candidate = candidate.public();
                candidate > *spec
                    && !(!spec.is_postrelease()
                        && candidate.is_postrelease()
                        && candidate.base() == spec.base())
            }
            Operator::Compatible => {
                let mut prefix = spec.base();
                prefix.release.pop();
                candidate.public() >= *spec && prefix_match(&prefix, candidate)
            }
            Operator::Arbitrary => false,
        }
    }
}

/// `==` ignores the candidate's local label unless the specifier has one
fn equal(spec: &Version, candidate: &Version) -> bool {
    if spec.local.is_empty() {
        candidate.public() == *spec
    } else {
        candidate == spec
    }
}

/// Release-prefix match used by `==X.*`, `!=X.*` and `~=`
fn prefix_match(prefix: &Version, candidate: &Version) -> bool {
    if prefix.epoch != candidate.epoch {
        return false;
    }
    prefix
        .release
        .iter()
        .enumerate()
        .all(|(i, n)| candidate.release.get(i).copied().unwrap_or(0) == *n)
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator.as_str(), self.version)?;
        if self.wildcard {
            f.write_str(".*")?;
        }
        Ok(())
    }
}

/// Comma-separated set of clauses; all must match
#[derive(Debug, Clone, Default)]
pub struct SpecifierSet {
    pub specifiers: Vec<Specifier>,
}

impl SpecifierSet {
    pub fn parse(text: &str) -> Result<Self, String> {
        let specifiers = text
            .split(',')
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .map(Specifier::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { specifiers })
    }

    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    /// Pre-releases only match when asked for, or when a clause names one
    pub fn contains(&self, candidate: &Version, include_prereleases: bool) -> bool {
        if candidate.is_prerelease()
            && !include_prereleases
            && !self.specifiers.iter().any(Specifier::names_prerelease)
        {
            return false;
        }
        self.specifiers.iter().all(|s| s.contains(candidate))
    }

    /// The exact version requested by an `==`/`===` clause, if any
    pub fn pinned_version(&self) -> Option<&str> {
        self.specifiers
            .iter()
            .find(|s| {
                matches!(s.operator, Operator::Equal | Operator::Arbitrary) && !s.wildcard
            })
            .map(|s| s.version.as_str())
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses: Vec<String> = self.specifiers.iter().map(|s| s.to_string()).collect();
        f.write_str(&clauses.join(","))
    }
}

/// A parsed PEP 508 requirement
#[derive(Debug, Clone)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    pub specifier: SpecifierSet,
    pub url: Option<String>,
    pub marker: Option<String>,
}

impl Requirement {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        static NAME: OnceLock<Regex> = OnceLock::new();
        let name_re = NAME.get_or_init(|| {
            Regex::new(r"^\s*([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(?:\[([^\]]*)\])?\s*")
                .expect("requirement pattern is valid")
        });

        let invalid = |message: String| ValidationError::InvalidRequirement {
            requirement: input.trim().to_string(),
            message,
        };

        let (body, marker) = match input.split_once(';') {
            Some((body, marker)) => (body, Some(marker.trim().to_string()).filter(|m| !m.is_empty())),
            None => (input, None),
        };

        let caps = name_re
            .captures(body)
            .ok_or_else(|| invalid("missing package name".to_string()))?;
        let name = caps[1].to_string();
        let extras = caps
            .get(2)
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let rest = body[caps[0].len()..].trim();

        if let Some(url) = rest.strip_prefix('@') {
            let url = url.trim();
            if url.is_empty() {
                return Err(invalid("empty URL".to_string()));
            }
            return Ok(Self {
                name,
                extras,
                specifier: SpecifierSet::default(),
                url: Some(url.to_string()),
                marker,
            });
        }

        let rest = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(rest);
        let specifier = SpecifierSet::parse(rest).map_err(invalid)?;

        Ok(Self {
            name,
            extras,
            specifier,
            url: None,
            marker,
        })
    }

    /// True when the marker only holds with an optional extra selected.
    ///
    /// That is the case when every top-level `or` branch carries an
    /// `extra == "..."` clause among its `and` terms.
    pub fn is_extra_only(&self) -> bool {
        self.marker.as_deref().map(requires_extra).unwrap_or(false)
    }
}

fn requires_extra(expr: &str) -> bool {
    let expr = strip_outer_parens(expr.trim());
    split_top_level(expr, "or").iter().all(|branch| {
        split_top_level(branch, "and").iter().any(|term| {
            let term = term.trim();
            is_extra_clause(term) || (term.starts_with('(') && requires_extra(term))
        })
    })
}

fn is_extra_clause(term: &str) -> bool {
    static EXTRA: OnceLock<Regex> = OnceLock::new();
    let re = EXTRA.get_or_init(|| {
        Regex::new(r#"^(?:extra\s*==\s*(?:'[^']*'|"[^"]*")|(?:'[^']*'|"[^"]*")\s*==\s*extra)$"#)
            .expect("extra marker pattern is valid")
    });
    re.is_match(term)
}

/// Drop parentheses that wrap the whole expression
fn strip_outer_parens(mut expr: &str) -> &str {
    while expr.starts_with('(') && expr.ends_with(')') {
        let inner = &expr[1..expr.len() - 1];
        if !balanced(inner) {
            break;
        }
        expr = inner.trim();
    }
    expr
}

fn balanced(expr: &str) -> bool {
    let mut depth = 0i32;
    let mut quote = None;
    for c in expr.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Split on a boolean keyword outside quotes and parentheses
fn split_top_level<'a>(expr: &'a str, keyword: &str) -> Vec<&'a str> {
    let bytes = expr.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote = None;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ if depth == 0 && bytes[i..].starts_with(keyword.as_bytes()) => {
                    let end = i + keyword.len();
                    let before = i == 0 || bytes[i - 1].is_ascii_whitespace() || bytes[i - 1] == b')';
                    let after = end < bytes.len()
                        && (bytes[end].is_ascii_whitespace() || bytes[end] == b'(');
                    if before && after {
                        parts.push(&expr[start..i]);
                        start = end;
                        i = end;
                        continue;
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    parts.push(&expr[start..]);
    parts
}

/// A requirement line from a requirements file
#[derive(Debug, Clone)]
pub struct RequirementLine {
    pub line_number: usize,
    pub text: String,
    pub requirement: Result<Requirement, String>,
}

/// Parse the contents of a requirements file.
///
/// Blank lines, comments and pip options (`-r`, `-e`, `--index-url`, ...) are
/// skipped; `\` continuations are joined and inline ` #` comments stripped.
pub fn parse_requirements_file(content: &str) -> Vec<RequirementLine> {
    let mut lines = Vec::new();
    let mut pending = String::new();
    let mut start_line = 0;

    for (index, raw) in content.lines().enumerate() {
        if pending.is_empty() {
            start_line = index + 1;
        }

        let trimmed = raw.trim_end();
        if let Some(continued) = trimmed.strip_suffix('\\') {
            pending.push_str(continued);
            pending.push(' ');
            continue;
        }
        pending.push_str(trimmed);

        let logical = std::mem::take(&mut pending);
        let text = strip_comment(&logical).trim().to_string();
        if text.is_empty() || text.starts_with('-') {
            continue;
        }

        lines.push(RequirementLine {
            line_number: start_line,
            requirement: Requirement::parse(&text).map_err(|e| e.to_string()),
            text,
        });
    }

    lines
}

/// Read and parse a `.txt` or `.pip` requirements file
pub fn read_requirements_file(path: &str) -> crate::error::Result<Vec<RequirementLine>> {
    let file = Path::new(path);
    if !file.exists() {
        return Err(ValidationError::FileNotFound {
            path: path.to_string(),
        }
        .into());
    }

    let supported = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "txt" || e == "pip")
        .unwrap_or(false);
    if !supported {
        return Err(ValidationError::UnsupportedFile {
            path: path.to_string(),
        }
        .into());
    }

    let content = std::fs::read_to_string(file).map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => ValidationError::PermissionDenied {
            path: path.to_string(),
        }
        .into(),
        _ => PypiMcpError::Io(e),
    })?;

    let lines = parse_requirements_file(&content);
    tracing::debug!("Parsed {} requirements from {}", lines.len(), path);
    Ok(lines)
}

fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    match line.find(" #").or_else(|| line.find("\t#")) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn set(s: &str) -> SpecifierSet {
        SpecifierSet::parse(s).unwrap()
    }

    #[test]
    fn test_parse_full_requirement() {
        let req = Requirement::parse("requests[security, socks] (>=2.8.1, ==2.8.*) ; python_version < \"2.7\"").unwrap();
        assert_eq!(req.name, "requests");
        assert_eq!(req.extras, vec!["security", "socks"]);
        assert_eq!(req.specifier.to_string(), ">=2.8.1,==2.8.*");
        assert_eq!(req.marker.as_deref(), Some("python_version < \"2.7\""));
    }

    #[test]
    fn test_parse_url_requirement() {
        let req = Requirement::parse("pip @ https://github.com/pypa/pip/archive/1.3.1.zip").unwrap();
        assert_eq!(req.name, "pip");
        assert!(req.specifier.is_empty());
        assert_eq!(req.url.as_deref(), Some("https://github.com/pypa/pip/archive/1.3.1.zip"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Requirement::parse("").is_err());
        assert!(Requirement::parse("requests >> 2").is_err());
        assert!(Requirement::parse("requests >=2.*").is_err());
        assert!(Requirement::parse("requests ~=2").is_err());
    }

    #[test]
    fn test_extra_only_marker() {
        let req = Requirement::parse("pytest>=7; extra == 'test'").unwrap();
        assert!(req.is_extra_only());
        let req = Requirement::parse("tomli; python_version < '3.11'").unwrap();
        assert!(!req.is_extra_only());
        let req = Requirement::parse(r#"mock; python_version < "3.8" and extra == "test""#).unwrap();
        assert!(req.is_extra_only());
        let req = Requirement::parse(r#"sphinx; (extra == "docs" or extra == "dev") and os_name == "posix""#)
            .unwrap();
        assert!(req.is_extra_only());
    }

    #[test]
    fn test_extra_in_alternative_branch_still_applies() {
        let req = Requirement::parse(r#"foo; extra == "x" or python_version < "3.9""#).unwrap();
        assert!(!req.is_extra_only());
        let req = Requirement::parse(r#"foo; (extra == "x" or python_version < "3.9")"#).unwrap();
        assert!(!req.is_extra_only());
        let req = Requirement::parse(r#"foo; platform_release == "extra == 'x'""#).unwrap();
        assert!(!req.is_extra_only());
    }

    #[test]
    fn test_specifier_operators() {
        assert!(set(">=1.0,<2.0").contains(&v("1.5"), false));
        assert!(!set(">=1.0,<2.0").contains(&v("2.0"), false));
        assert!(set("!=1.5").contains(&v("1.6"), false));
        assert!(!set("!=1.5").contains(&v("1.5.0"), false));
        assert!(set("==1.4.*").contains(&v("1.4.9"), false));
        assert!(!set("==1.4.*").contains(&v("1.5"), false));
        assert!(set("==1.0").contains(&v("1.0+local"), false));
        assert!(set("===1.0").contains(&v("1.0"), false));
    }

    #[test]
    fn test_compatible_release() {
        assert!(set("~=2.2").contains(&v("2.9"), false));
        assert!(!set("~=2.2").contains(&v("3.0"), false));
        assert!(set("~=1.4.5").contains(&v("1.4.9"), false));
        assert!(!set("~=1.4.5").contains(&v("1.5.0"), false));
        assert!(!set("~=1.4.5").contains(&v("1.4.4"), false));
    }

    #[test]
    fn test_exclusive_ordering_rules() {
        assert!(!set("<2.0").contains(&v("2.0rc1"), true));
        assert!(set("<2.0rc2").contains(&v("2.0rc1"), false));
        assert!(!set(">1.7").contains(&v("1.7.post1"), false));
        assert!(set(">1.7").contains(&v("1.7.1"), false));
    }

    #[test]
    fn test_prerelease_filtering() {
        assert!(!set(">=1.0").contains(&v("2.0b1"), false));
        assert!(set(">=1.0").contains(&v("2.0b1"), true));
        assert!(set(">=2.0b1").contains(&v("2.0b2"), false));
        assert!(SpecifierSet::default().contains(&v("1.0"), false));
    }

    #[test]
    fn test_pinned_version() {
        assert_eq!(set("==1.0").pinned_version(), Some("1.0"));
        assert_eq!(set(">=1.0").pinned_version(), None);
        assert_eq!(set("==1.*").pinned_version(), None);
    }

    #[test]
    fn test_read_requirements_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.txt");
        let err = read_requirements_file(missing.to_str().unwrap()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::FileError);

        let wrong = dir.path().join("deps.cfg");
        std::fs::write(&wrong, "requests\n").unwrap();
        let err = read_requirements_file(wrong.to_str().unwrap()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidInput);

        let good = dir.path().join("requirements.pip");
        std::fs::write(&good, "requests==2.0\n").unwrap();
        assert_eq!(read_requirements_file(good.to_str().unwrap()).unwrap().len(), 1);
    }

    #[test]
    fn test_requirements_file() {
        let content = "\
# core deps
requests==2.25.0  # pinned
-r other.txt
--index-url https://example.com/simple

flask>=2.0,\\
  <3.0
numpy
not a requirement!!
";
        let lines = parse_requirements_file(content);
        assert_eq!(lines.len(), 4);

        assert_eq!(lines[0].line_number, 2);
        assert_eq!(lines[0].text, "requests==2.25.0");
        assert_eq!(lines[0].requirement.as_ref().unwrap().specifier.pinned_version(), Some("2.25.0"));

        assert_eq!(lines[1].line_number, 6);
        assert_eq!(lines[1].requirement.as_ref().unwrap().specifier.to_string(), ">=2.0,<3.0");

        assert_eq!(lines[2].requirement.as_ref().unwrap().name, "numpy");
        assert!(lines[3].requirement.is_err());
    }
}
