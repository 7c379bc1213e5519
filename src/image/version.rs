use crate::image::{ContentDigest, Tag};
use std::fmt;

/// The most specific version an [crate::image::ImageName] names
///
/// This is what goes after `/manifests/` in a registry request: the digest if
/// the reference has one, otherwise the tag.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ImageVersion {
    Tag(Tag),
    ContentDigest(ContentDigest),
}

impl ImageVersion {
    pub fn as_str(&self) -> &str {
        match self {
            ImageVersion::Tag(tag) => tag.as_str(),
            ImageVersion::ContentDigest(content_digest) => content_digest.as_str(),
        }
    }

    pub fn is_content_digest(&self) -> bool {
        matches!(self, ImageVersion::ContentDigest(_))
    }
}

impl From<ContentDigest> for ImageVersion {
    fn from(digest: ContentDigest) -> Self {
        ImageVersion::ContentDigest(digest)
    }
}

impl fmt::Display for ImageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ImageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
