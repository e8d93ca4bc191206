//! PEP 440 version parsing and ordering

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ValidationError;

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix)
            ^\s*v?
            (?:(?P<epoch>[0-9]+)!)?
            (?P<release>[0-9]+(?:\.[0-9]+)*)
            (?P<pre>
                [-_.]?
                (?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)
                [-_.]?
                (?P<pre_n>[0-9]+)?
            )?
            (?P<post>
                (?:-(?P<post_n1>[0-9]+))
                |
                (?:
                    [-_.]?
                    (?P<post_l>post|rev|r)
                    [-_.]?
                    (?P<post_n2>[0-9]+)?
                )
            )?
            (?P<dev>
                [-_.]?
                (?P<dev_l>dev)
                [-_.]?
                (?P<dev_n>[0-9]+)?
            )?
            (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
            \s*$",
        )
        .expect("version pattern is valid")
    })
}

/// Pre-release phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

impl PreRelease {
    fn parse(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "a" | "alpha" => PreRelease::Alpha,
            "b" | "beta" => PreRelease::Beta,
            _ => PreRelease::Rc,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            PreRelease::Alpha => "a",
            PreRelease::Beta => "b",
            PreRelease::Rc => "rc",
        }
    }
}

/// One dot-separated segment of a local version label.
/// Alphanumeric segments sort before numeric ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalSegment {
    Text(String),
    Number(u64),
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalSegment::Text(s) => f.write_str(s),
            LocalSegment::Number(n) => write!(f, "{}", n),
        }
    }
}

/// A parsed PEP 440 version
#[derive(Debug, Clone)]
pub struct Version {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<(PreRelease, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Vec<LocalSegment>,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    /// Dev-only releases sort before any pre-release of the same version
    Lowest,
    Phase(PreRelease, u64),
    /// Final releases
    Highest,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidVersion {
            version: input.to_string(),
        };
        let caps = version_regex().captures(input).ok_or_else(invalid)?;
        let number = |name: &str| -> Result<Option<u64>, ValidationError> {
            caps.name(name)
                .map(|m| m.as_str().parse::<u64>().map_err(|_| invalid()))
                .transpose()
        };

        let epoch = number("epoch")?.unwrap_or(0);
        let release = caps["release"]
            .split('.')
            .map(|part| part.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match caps.name("pre_l") {
            Some(label) => Some((PreRelease::parse(label.as_str()), number("pre_n")?.unwrap_or(0))),
            None => None,
        };

        let post = if caps.name("post").is_some() {
            Some(number("post_n1")?.or(number("post_n2")?).unwrap_or(0))
        } else {
            None
        };

        let dev = if caps.name("dev").is_some() {
            Some(number("dev_n")?.unwrap_or(0))
        } else {
            None
        };

        let local = caps
            .name("local")
            .map(|m| {
                m.as_str()
                    .split(['-', '_', '.'])
                    .map(|seg| match seg.parse::<u64>() {
                        Ok(n) => LocalSegment::Number(n),
                        Err(_) => LocalSegment::Text(seg.to_ascii_lowercase()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    /// Pre-releases and dev releases
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    /// The version without its local label
    pub fn public(&self) -> Version {
        Version {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Epoch and release only (`1!2.0rc1.post3` -> `1!2.0`)
    pub fn base(&self) -> Version {
        Version {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// Release segment with trailing zeros removed, used for comparisons
    fn trimmed_release(&self) -> &[u64] {
        let len = self
            .release
            .iter()
            .rposition(|&n| n != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.release[..len]
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::Lowest,
            (None, _, _) => PreKey::Highest,
            (Some((phase, n)), _, _) => PreKey::Phase(phase, n),
        }
    }

    fn dev_key(&self) -> (bool, u64) {
        match self.dev {
            Some(n) => (false, n),
            None => (true, 0),
        }
    }
}

impl FromStr for Version {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.trimmed_release().cmp(other.trimmed_release()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        f.write_str(&release.join("."))?;
        if let Some((phase, n)) = self.pre {
            write!(f, "{}{}", phase.as_str(), n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{}", n)?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{}", n)?;
        }
        if !self.local.is_empty() {
            let local: Vec<String> = self.local.iter().map(|s| s.to_string()).collect();
            write!(f, "+{}", local.join("."))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_components() {
        let version = v("1!2.3.4rc5.post6.dev7+ubuntu.1");
        assert_eq!(version.epoch, 1);
        assert_eq!(version.release, vec![2, 3, 4]);
        assert_eq!(version.pre, Some((PreRelease::Rc, 5)));
        assert_eq!(version.post, Some(6));
        assert_eq!(version.dev, Some(7));
        assert_eq!(
            version.local,
            vec![LocalSegment::Text("ubuntu".to_string()), LocalSegment::Number(1)]
        );
    }

    #[test]
    fn test_normalized_spellings() {
        assert_eq!(v("1.0-alpha1").to_string(), "1.0a1");
        assert_eq!(v("1.0.BETA.2").to_string(), "1.0b2");
        assert_eq!(v("1.0c1").to_string(), "1.0rc1");
        assert_eq!(v("1.0-1").to_string(), "1.0.post1");
        assert_eq!(v("1.0rev").to_string(), "1.0.post0");
        assert_eq!(v("v1.0.dev").to_string(), "1.0.dev0");
    }

    #[test]
    fn test_invalid_versions() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("latest").is_err());
        assert!(Version::parse("1.0 beta").is_err());
        assert!(Version::parse("1..0").is_err());
    }

    #[test]
    fn test_ordering() {
        let ordered = [
            "1.0.dev0", "1.0a1", "1.0a2.dev1", "1.0a2", "1.0b1", "1.0rc1", "1.0", "1.0+local",
            "1.0.post1.dev0", "1.0.post1", "1.1", "1!0.1",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_trailing_zeros_equal() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("2"), v("2.0.0.0"));
        assert!(v("1.10") > v("1.9"));
    }

    #[test]
    fn test_local_ordering() {
        assert!(v("1.0+abc") < v("1.0+1"));
        assert!(v("1.0+1") < v("1.0+1.1"));
    }

    #[test]
    fn test_prerelease_flags() {
        assert!(v("2.0rc1").is_prerelease());
        assert!(v("2.0.dev3").is_prerelease());
        assert!(!v("2.0.post1").is_prerelease());
        assert!(v("2.0.post1").is_postrelease());
        assert_eq!(v("3.1rc1.post2").base().to_string(), "3.1");
    }
}
