//! Cluster version checks

use crate::errors::ConfigError;
use semver::Version;
use std::fmt;

/// A Kubernetes-style version such as `v1.27.3-gke.100`
///
/// Parsing is lenient in the ways server versions need: a leading `v` is
/// optional, missing minor or patch numbers count as zero, and pre-release or
/// build suffixes are ignored for comparison.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct PlatformVersion {
    version: Version,
}

impl PlatformVersion {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidPlatformVersion(s.to_owned());
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let core = trimmed
            .split(|c| c == '-' || c == '+')
            .next()
            .unwrap_or(trimmed);
        let mut numbers = [0u64; 3];
        let mut parts = core.split('.');
        for (i, slot) in numbers.iter_mut().enumerate() {
            match parts.next() {
                Some(part) => *slot = part.parse().map_err(|_| invalid())?,
                None if i > 0 => break,
                None => return Err(invalid()),
            }
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(PlatformVersion {
            version: Version::new(numbers[0], numbers[1], numbers[2]),
        })
    }

    pub fn at_least(&self, minimum: &PlatformVersion) -> bool {
        self >= minimum
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version)
    }
}

/// Whether a cluster is new enough to have ephemeral containers
///
/// A server version that can't be parsed fails the check, so ephemeral
/// containers are left alone rather than mirrored on a guess.
pub fn supports_ephemeral_containers(server_version: &str, minimum: &PlatformVersion) -> bool {
    match PlatformVersion::parse(server_version) {
        Ok(version) => version.at_least(minimum),
        Err(err) => {
            log::warn!("{}, skipping ephemeral containers", err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_server_versions() {
        assert_eq!(PlatformVersion::parse("v1.16").unwrap().to_string(), "v1.16.0");
        assert_eq!(
            PlatformVersion::parse("v1.27.3-gke.100").unwrap().to_string(),
            "v1.27.3"
        );
        assert_eq!(PlatformVersion::parse("1.30.1+k3s1").unwrap().to_string(), "v1.30.1");
        assert_eq!(PlatformVersion::parse("v2").unwrap().to_string(), "v2.0.0");
        assert!(PlatformVersion::parse("").is_err());
        assert!(PlatformVersion::parse("v").is_err());
        assert!(PlatformVersion::parse("latest").is_err());
        assert!(PlatformVersion::parse("v1.2.3.4").is_err());
        assert!(PlatformVersion::parse("v1..2").is_err());
    }

    #[test]
    fn ephemeral_gate() {
        let minimum = PlatformVersion::parse("v1.16").unwrap();
        assert!(supports_ephemeral_containers("v1.16.0", &minimum));
        assert!(supports_ephemeral_containers("v1.25.4-eks-1", &minimum));
        assert!(supports_ephemeral_containers("v2.0.0", &minimum));
        assert!(!supports_ephemeral_containers("v1.15.12", &minimum));
        assert!(!supports_ephemeral_containers("v1.9.0", &minimum));
        assert!(!supports_ephemeral_containers("unknown", &minimum));
    }
}
