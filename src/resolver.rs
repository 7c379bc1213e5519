//! Turning workload image strings into origin and cache references

use crate::{
    errors::{ConfigError, ImageError},
    image::ImageName,
    manifest::ManifestHandle,
    mirror::Transport,
};
use std::fmt;

/// Where cached images live, as an image name prefix like `docker.io/kube456`
///
/// Checked once when configuration is loaded: a root is valid only if
/// appending a path segment to it yields a valid image name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheRoot {
    serialized: String,
}

impl CacheRoot {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let trimmed = s.trim().trim_end_matches('/');
        let probe = format!("{}/probe", trimmed);
        match ImageName::parse(&probe) {
            Ok(name) if name.tag_str().is_none() && name.content_digest_str().is_none() => {
                Ok(CacheRoot {
                    serialized: trimmed.to_owned(),
                })
            }
            _ => Err(ConfigError::InvalidCacheRoot(s.to_owned())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.serialized
    }
}

impl fmt::Display for CacheRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image name under the cache root
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct CacheReference(ImageName);

impl CacheReference {
    pub fn image(&self) -> &ImageName {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for CacheReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for CacheReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

#[derive(Clone, Debug)]
pub struct Resolver {
    cache_root: CacheRoot,
}

impl Resolver {
    pub fn new(cache_root: CacheRoot) -> Self {
        Resolver { cache_root }
    }

    /// Parse a container's image string, spelling out an implied `latest`
    pub fn parse(&self, raw: &str) -> Result<ImageName, ImageError> {
        Ok(ImageName::parse(raw)?.with_default_tag())
    }

    /// Read the origin manifest for an image through `transport`
    pub async fn fetch_manifest<T>(
        &self,
        transport: &T,
        image: &ImageName,
    ) -> Result<ManifestHandle, ImageError>
    where
        T: Transport + ?Sized,
    {
        log::debug!("fetching manifest for {}", image);
        transport.fetch_manifest(image).await
    }

    /// Where `image` is kept in the cache
    ///
    /// Only the last repository segment and the version survive, so
    /// `quay.io/org/team/app:1` and `app:1` share a cache reference. A pinned
    /// digest wins over any tag written next to it.
    pub fn to_cache_reference(&self, image: &ImageName) -> CacheReference {
        let mut cached = format!("{}/{}", self.cache_root, image.repository().last_segment());
        match (image.content_digest_str(), image.tag_str()) {
            (Some(digest), _) => {
                cached.push('@');
                cached.push_str(digest);
            }
            (None, Some(tag)) => {
                cached.push(':');
                cached.push_str(tag);
            }
            (None, None) => (),
        }
        CacheReference(ImageName::parse(&cached).expect("cache root was validated at startup"))
    }
}
