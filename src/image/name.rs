use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageVersion, Registry, Repository, Tag},
};
use regex::Regex;
use std::{fmt::Write, ops::Range};

/// Parsed Docker-style image reference
///
/// Written as `[registry/]repository[:tag][@digest]`, where only the
/// repository is required. Tags start with `:` and digests with `@`; the
/// registry is the part before the first slash, but only if that part looks
/// like a host: it contains a dot or a port, or it is exactly `localhost`.
/// Otherwise the whole path is repository, as in `library/busybox`.
///
/// Equality, hashing, and ordering all follow the string form, so two names
/// are the same image reference exactly when they are spelled the same way.
#[derive(Clone)]
pub struct ImageName {
    serialized: String,
    registry_pos: Option<Range<usize>>,
    repository_pos: Range<usize>,
    tag_pos: Option<Range<usize>>,
    digest_pos: Option<Range<usize>>,
}

super::string_identity!(ImageName);

impl ImageName {
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Build an [ImageName] from component pieces
    ///
    /// Fails if any piece is malformed, or if the assembled string would parse
    /// back into different pieces, for example a registry-like first
    /// repository segment with no registry given.
    pub fn from_parts(
        registry: Option<&str>,
        repository: &str,
        tag: Option<&str>,
        digest: Option<&str>,
    ) -> Result<Self, ImageError> {
        let mut combined = String::new();
        if let Some(registry) = registry {
            let _ = write!(combined, "{}/", registry);
        }
        combined.push_str(repository);
        if let Some(tag) = tag {
            let _ = write!(combined, ":{}", tag);
        }
        if let Some(digest) = digest {
            let _ = write!(combined, "@{}", digest);
        }
        let parsed = ImageName::parse(&combined)?;
        if parsed.as_parts() == (registry, repository, tag, digest) {
            Ok(parsed)
        } else {
            Err(ImageError::InvalidReferenceFormat(combined))
        }
    }

    pub fn as_parts(&self) -> (Option<&str>, &str, Option<&str>, Option<&str>) {
        (
            self.registry_str(),
            self.repository_str(),
            self.tag_str(),
            self.content_digest_str(),
        )
    }

    /// Returns the most specific available version
    ///
    /// The digest if there is one, then the tag, then `latest`.
    pub fn version(&self) -> ImageVersion {
        if let Some(digest) = self.content_digest() {
            return ImageVersion::ContentDigest(digest);
        }
        ImageVersion::Tag(self.tag().unwrap_or_else(Tag::latest))
    }

    /// Spell out the implied `latest` tag
    ///
    /// A name with neither tag nor digest gets `:latest` appended. Anything
    /// else is returned unchanged.
    pub fn with_default_tag(&self) -> ImageName {
        if self.tag_pos.is_some() || self.digest_pos.is_some() {
            return self.clone();
        }
        let start = self.serialized.len() + 1;
        let serialized = format!("{}:{}", self.serialized, Tag::latest());
        ImageName {
            tag_pos: Some(start..serialized.len()),
            serialized,
            ..self.clone()
        }
    }

    /// Parse a [prim@str] as an [ImageName]
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref HAS_REGISTRY: Regex = Regex::new(concat!(
                "^",
                "(?:",
                /* */ "(?:", // a domain with at least one dot, optional port
                /* -- */ "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])",
                /* -- */ "(?:\\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))+",
                /* -- */ "(?::[0-9]+)?",
                /* */ ")",
                /* */ "|(?:", // a single label with a port
                /* -- */ "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])",
                /* -- */ "(?::[0-9]+)",
                /* */ ")",
                /* */ "|(?:localhost(?::[0-9]+)?)",
                ")",
                "/",
            ))
            .unwrap();
            static ref WITH_REGISTRY: Regex = Regex::new(&format!(
                "^{}/{}(:{})?(@{})?$",
                Registry::regex_str(),
                Repository::regex_str(),
                Tag::regex_str(),
                ContentDigest::regex_str()
            ))
            .unwrap();
            static ref NO_REGISTRY: Regex = Regex::new(&format!(
                "^{}(:{})?(@{})?$",
                Repository::regex_str(),
                Tag::regex_str(),
                ContentDigest::regex_str()
            ))
            .unwrap();
        }
        let re: &Regex = if HAS_REGISTRY.is_match(s) {
            &WITH_REGISTRY
        } else {
            &NO_REGISTRY
        };
        match re.captures(s) {
            None => Err(ImageError::InvalidReferenceFormat(s.to_owned())),
            Some(captures) => {
                // the registry regex accepts ports that don't fit in a u16
                if let Some(registry) = captures.name("reg") {
                    Registry::parse(registry.as_str())
                        .map_err(|_| ImageError::InvalidReferenceFormat(s.to_owned()))?;
                }
                Ok(ImageName {
                    serialized: s.to_owned(),
                    registry_pos: captures.name("reg").map(|m| m.range()),
                    repository_pos: captures.name("repo").unwrap().range(),
                    tag_pos: captures.name("tag").map(|m| m.range()),
                    digest_pos: captures.name("dig").map(|m| m.range()),
                })
            }
        }
    }

    pub fn registry_str(&self) -> Option<&str> {
        self.registry_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    pub fn repository_str(&self) -> &str {
        &self.serialized[self.repository_pos.clone()]
    }

    pub fn tag_str(&self) -> Option<&str> {
        self.tag_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    pub fn content_digest_str(&self) -> Option<&str> {
        self.digest_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    pub fn registry(&self) -> Option<Registry> {
        self.registry_str()
            .map(|s| Registry::parse(s).expect("already parsed"))
    }

    pub fn repository(&self) -> Repository {
        Repository::parse(self.repository_str()).expect("already parsed")
    }

    pub fn tag(&self) -> Option<Tag> {
        self.tag_str()
            .map(|s| Tag::parse(s).expect("already parsed"))
    }

    pub fn content_digest(&self) -> Option<ContentDigest> {
        self.content_digest_str()
            .map(|s| ContentDigest::parse(s).expect("already parsed"))
    }

    /// Check the digest of downloaded content against the one in this name
    ///
    /// Names without a digest accept anything. On a mismatch the error reports
    /// both digests.
    pub fn verify_digest(&self, found: &ContentDigest) -> Result<(), ImageError> {
        match self.content_digest() {
            Some(expected) if &expected != found => {
                Err(ImageError::ContentDigestMismatch {
                    expected,
                    found: found.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}
