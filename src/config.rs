//! Settings for the mirror engine, validated once at startup

use crate::{
    errors::ConfigError,
    platform::PlatformVersion,
    resolver::CacheRoot,
};
use std::time::Duration;

pub const DEFAULT_EPHEMERAL_MIN_VERSION: &str = "v1.16";

#[derive(Clone, Debug)]
pub struct MirrorConfig {
    /// Image name prefix every cached image is written under
    pub cache_root: CacheRoot,
    /// Oldest cluster version whose ephemeral containers are mirrored
    pub ephemeral_min_version: PlatformVersion,
    /// Upper bound on one manifest fetch, and separately on the batch push
    pub operation_timeout: Option<Duration>,
}

impl MirrorConfig {
    pub fn new(cache_root: &str) -> Result<Self, ConfigError> {
        Ok(MirrorConfig {
            cache_root: CacheRoot::parse(cache_root)?,
            ephemeral_min_version: PlatformVersion::parse(DEFAULT_EPHEMERAL_MIN_VERSION)?,
            operation_timeout: None,
        })
    }

    pub fn ephemeral_min_version(mut self, version: &str) -> Result<Self, ConfigError> {
        self.ephemeral_min_version = PlatformVersion::parse(version)?;
        Ok(self)
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_validation() {
        let config = MirrorConfig::new("docker.io/kube456").unwrap();
        assert_eq!(config.cache_root.as_str(), "docker.io/kube456");
        assert_eq!(config.ephemeral_min_version.to_string(), "v1.16.0");
        assert_eq!(config.operation_timeout, None);

        assert!(MirrorConfig::new("not a root").is_err());
        assert!(MirrorConfig::new("docker.io/kube456")
            .unwrap()
            .ephemeral_min_version("soon")
            .is_err());
    }
}
