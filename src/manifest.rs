//! Registry manifests, as far as mirroring needs to understand them
//!
//! Mirroring copies manifests byte for byte, so these types only pick out the
//! references a manifest makes: blobs for an image, child manifests for an
//! index. Everything else in the document is carried along untouched.

use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageName},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub mod media_types {
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

    /// Everything we can mirror, for the `Accept` header
    pub const ACCEPT: &str = concat!(
        "application/vnd.docker.distribution.manifest.v2+json, ",
        "application/vnd.docker.distribution.manifest.list.v2+json, ",
        "application/vnd.oci.image.manifest.v1+json, ",
        "application/vnd.oci.image.index.v1+json"
    );

    pub fn is_index(media_type: &str) -> bool {
        media_type == DOCKER_MANIFEST_LIST || media_type == OCI_INDEX
    }

    pub fn is_image(media_type: &str) -> bool {
        media_type == DOCKER_MANIFEST || media_type == OCI_MANIFEST
    }
}

/// Pointer from a manifest to some other content by digest
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Link {
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    pub size: u64,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// The part of any manifest document we need to classify it
#[derive(Clone, Debug, Default, Deserialize)]
struct Envelope {
    #[serde(rename = "mediaType", default)]
    media_type: Option<String>,
    #[serde(default)]
    config: Option<Link>,
    #[serde(default)]
    layers: Vec<Link>,
    #[serde(default)]
    manifests: Option<Vec<Link>>,
}

/// What a manifest refers to
#[derive(Clone, Debug)]
pub enum ManifestContent {
    /// A single platform image: its config blob and layer blobs
    Image { config: Link, layers: Vec<Link> },
    /// A multi-platform index: one child manifest per platform
    Index { manifests: Vec<Link> },
}

impl ManifestContent {
    /// Work out the manifest kind from the response content type, falling back
    /// to the document's own `mediaType` and shape.
    pub fn parse(content_type: Option<&str>, raw: &[u8]) -> Result<(String, Self), ImageError> {
        log::trace!("raw json manifest, {}", String::from_utf8_lossy(raw));
        let envelope: Envelope = serde_json::from_slice(raw)?;
        let media_type = content_type
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_owned())
            .filter(|s| media_types::is_image(s) || media_types::is_index(s))
            .or(envelope.media_type)
            .unwrap_or_else(|| {
                if envelope.manifests.is_some() {
                    media_types::OCI_INDEX.to_owned()
                } else {
                    media_types::OCI_MANIFEST.to_owned()
                }
            });

        if media_types::is_index(&media_type) {
            Ok((
                media_type,
                ManifestContent::Index {
                    manifests: envelope.manifests.unwrap_or_default(),
                },
            ))
        } else if media_types::is_image(&media_type) {
            match envelope.config {
                Some(config) => Ok((
                    media_type,
                    ManifestContent::Image {
                        config,
                        layers: envelope.layers,
                    },
                )),
                None => Err(ImageError::UnsupportedManifestType(media_type)),
            }
        } else {
            Err(ImageError::UnsupportedManifestType(media_type))
        }
    }
}

/// An origin manifest, fetched and ready to be written elsewhere
///
/// Immutable once fetched. For an index, `children` holds every platform
/// manifest the index links to, in the same order.
#[derive(Clone, Debug)]
pub struct ManifestHandle {
    /// Where this manifest came from; blobs are read from the same place
    pub source: ImageName,
    pub media_type: String,
    pub digest: ContentDigest,
    pub raw: Bytes,
    pub content: ManifestContent,
    pub children: Vec<ManifestHandle>,
}

impl ManifestHandle {
    /// Every blob this manifest and its children refer to, without repeats
    pub fn blobs(&self) -> Vec<&Link> {
        let mut result: Vec<&Link> = Vec::new();
        self.collect_blobs(&mut result);
        result
    }

    fn collect_blobs<'a>(&'a self, result: &mut Vec<&'a Link>) {
        if let ManifestContent::Image { config, layers } = &self.content {
            for link in std::iter::once(config).chain(layers) {
                if !result.iter().any(|seen| seen.digest == link.digest) {
                    result.push(link);
                }
            }
        }
        for child in &self.children {
            child.collect_blobs(result);
        }
    }
}
