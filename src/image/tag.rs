use crate::errors::ImageError;
use regex::Regex;

/// A named image version, such as `1.21` or `latest`
///
/// Up to 128 characters. Alphanumerics and underscores may appear anywhere,
/// dots and dashes anywhere but the first position.
#[derive(Clone)]
pub struct Tag {
    serialized: String,
}

super::string_identity!(Tag);

static LATEST_STR: &str = "latest";

impl Tag {
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as a [Tag]
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", Tag::regex_str())).unwrap();
        }
        if RE.is_match(s) {
            Ok(Tag {
                serialized: s.to_owned(),
            })
        } else {
            Err(ImageError::InvalidReferenceFormat(s.to_owned()))
        }
    }

    /// The tag implied by a reference that names neither a tag nor a digest
    pub fn latest() -> Self {
        Tag {
            serialized: LATEST_STR.to_owned(),
        }
    }

    pub fn is_latest(&self) -> bool {
        self.serialized == LATEST_STR
    }

    pub(crate) fn regex_str() -> &'static str {
        "(?P<tag>[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,127})"
    }
}
