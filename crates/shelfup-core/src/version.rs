use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use semver::BuildMetadata;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d+)\.(\d+)\.(\d+)(?:\.(\d+))?(?:-([0-9A-Za-z.\-]+))?(?:\+([0-9A-Za-z.\-]+))?$",
    )
    .expect("version pattern should compile")
});

/// Dot-separated pre-release identifiers. All-digit identifiers rank by
/// numeric value and may carry leading zeros, so `01` and `1` tie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Prerelease(String);

impl Prerelease {
    pub const EMPTY: Self = Self(String::new());

    /// `None` when any identifier is empty.
    #[must_use]
    pub fn new(text: &str) -> Option<Self> {
        if text.split('.').any(str::is_empty) {
            return None;
        }
        Some(Self(text.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Absent pre-release ranks above any present one; otherwise identifiers
    /// compare pairwise and a longer list wins a shared prefix.
    #[must_use]
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }
        let mut ours = self.0.split('.');
        let mut theirs = other.0.split('.');
        loop {
            match (ours.next(), theirs.next()) {
                (Some(a), Some(b)) => match cmp_identifier(a, b) {
                    Ordering::Equal => {}
                    unequal => return unequal,
                },
                (Some(_), None) => return Ordering::Greater,
                (None, Some(_)) => return Ordering::Less,
                (None, None) => return Ordering::Equal,
            }
        }
    }
}

impl fmt::Display for Prerelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn cmp_identifier(a: &str, b: &str) -> Ordering {
    let numeric = |id: &str| id.bytes().all(|byte| byte.is_ascii_digit());
    match (numeric(a), numeric(b)) {
        (true, true) => {
            let a = a.trim_start_matches('0');
            let b = b.trim_start_matches('0');
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

/// A release version: `MAJOR.MINOR.PATCH[.TEST][-prerelease][+build]`.
///
/// The optional `test` component marks a test build cut after `patch`, so
/// `1.2.3 < 1.2.3.1 < 1.2.4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub test: Option<u64>,
    pub pre: Prerelease,
    pub build: BuildMetadata,
}

impl Version {
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            test: None,
            pre: Prerelease::EMPTY,
            build: BuildMetadata::EMPTY,
        }
    }

    #[must_use]
    pub fn with_test(mut self, test: u64) -> Self {
        self.test = Some(test);
        self
    }

    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// Release precedence: numeric components, then pre-release. Build
    /// metadata does not participate.
    #[must_use]
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then(self.test.cmp(&other.test))
            .then_with(|| self.pre.cmp_precedence(&other.pre))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_precedence(other)
            .then_with(|| self.pre.as_str().cmp(other.pre.as_str()))
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(test) = self.test {
            write!(f, ".{test}")?;
        }
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionComponent {
    Major,
    Minor,
    Patch,
    Test,
    Prerelease,
    Build,
}

impl fmt::Display for VersionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
            Self::Patch => write!(f, "patch"),
            Self::Test => write!(f, "test"),
            Self::Prerelease => write!(f, "pre-release"),
            Self::Build => write!(f, "build"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error(
        "Invalid version '{input}': expected MAJOR.MINOR.PATCH[.TEST][-prerelease][+build]"
    )]
    InvalidFormat { input: String },
    #[error("Invalid {component} component in version '{input}': {value}")]
    InvalidComponent {
        input: String,
        component: VersionComponent,
        value: String,
    },
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let captures =
            VERSION_PATTERN
                .captures(input)
                .ok_or_else(|| VersionError::InvalidFormat {
                    input: input.to_string(),
                })?;

        let number = |index: usize, component: VersionComponent| -> Result<Option<u64>, VersionError> {
            captures
                .get(index)
                .map(|m| {
                    m.as_str()
                        .parse::<u64>()
                        .map_err(|_| VersionError::InvalidComponent {
                            input: input.to_string(),
                            component,
                            value: m.as_str().to_string(),
                        })
                })
                .transpose()
        };
        let required = |index: usize, component: VersionComponent| -> Result<u64, VersionError> {
            number(index, component)?.ok_or_else(|| VersionError::InvalidFormat {
                input: input.to_string(),
            })
        };

        let major = required(1, VersionComponent::Major)?;
        let minor = required(2, VersionComponent::Minor)?;
        let patch = required(3, VersionComponent::Patch)?;
        let test = number(4, VersionComponent::Test)?;

        let pre = match captures.get(5) {
            Some(m) => Prerelease::new(m.as_str()).ok_or_else(|| VersionError::InvalidComponent {
                input: input.to_string(),
                component: VersionComponent::Prerelease,
                value: m.as_str().to_string(),
            })?,
            None => Prerelease::EMPTY,
        };
        let build = match captures.get(6) {
            Some(m) => {
                BuildMetadata::new(m.as_str()).map_err(|_| VersionError::InvalidComponent {
                    input: input.to_string(),
                    component: VersionComponent::Build,
                    value: m.as_str().to_string(),
                })?
            }
            None => BuildMetadata::EMPTY,
        };

        Ok(Self {
            major,
            minor,
            patch,
            test,
            pre,
            build,
        })
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[must_use]
pub fn is_valid(version: &str) -> bool {
    version.parse::<Version>().is_ok()
}

/// Parse a version string.
///
/// # Errors
/// Returns [`VersionError`] when the string does not match the version grammar.
pub fn parse(version: &str) -> Result<Version, VersionError> {
    version.parse()
}

/// Compare two version strings by release precedence.
///
/// # Errors
/// Returns [`VersionError`] when either side is not a valid version.
pub fn compare(a: &str, b: &str) -> Result<Ordering, VersionError> {
    Ok(parse(a)?.cmp_precedence(&parse(b)?))
}

/// Whether `latest` ranks above `current`.
///
/// # Errors
/// Returns [`VersionError`] when either side is not a valid version.
pub fn is_newer(latest: &str, current: &str) -> Result<bool, VersionError> {
    Ok(compare(latest, current)? == Ordering::Greater)
}
