use crate::errors::ImageError;
use regex::Regex;

/// Path of an image repository, like `library/busybox`
///
/// One or more slash separated segments of lowercase alphanumerics. Inside a
/// segment, runs are joined by a single period, a single or double
/// underscore, or any number of dashes.
#[derive(Clone)]
pub struct Repository {
    serialized: String,
}

super::string_identity!(Repository);

/// Iterator over the slash separated segments of a [Repository]
pub struct RepositoryIter<'a> {
    remaining: Option<&'a str>,
}

impl<'a> Iterator for RepositoryIter<'a> {
    type Item = &'a str;
    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.remaining?;
        match remaining.split_once('/') {
            Some((first, rest)) => {
                self.remaining = Some(rest);
                Some(first)
            }
            None => {
                self.remaining = None;
                Some(remaining)
            }
        }
    }
}

impl Repository {
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as a [Repository]
    ///
    /// ```
    /// # use image_clone::image::Repository;
    /// let repo = Repository::parse("some/path").unwrap();
    /// let parts: Vec<&str> = repo.iter().collect();
    /// assert_eq!(parts, vec!["some", "path"])
    /// ```
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", Repository::regex_str())).unwrap();
        }
        if RE.is_match(s) {
            Ok(Repository {
                serialized: s.to_owned(),
            })
        } else {
            Err(ImageError::InvalidReferenceFormat(s.to_owned()))
        }
    }

    pub fn iter(&self) -> RepositoryIter<'_> {
        RepositoryIter {
            remaining: Some(&self.serialized),
        }
    }

    /// The final path segment, which names the image within its namespace
    pub fn last_segment(&self) -> &str {
        match self.serialized.rsplit_once('/') {
            Some((_, last)) => last,
            None => &self.serialized,
        }
    }

    /// Is there more than one path segment?
    pub fn is_nested(&self) -> bool {
        self.serialized.contains('/')
    }

    /// Join two repository paths with a slash
    pub fn join(&self, other: &Self) -> Self {
        Repository {
            serialized: format!("{}/{}", self.serialized, other.serialized),
        }
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<repo>",
            /*  */ "[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*", // first segment
            /*  */ "(?:/[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*)*", // more segments
            ")"
        )
    }
}
