use crate::errors::ImageError;
use regex::Regex;
use std::ops::Range;

/// Host name and optional port of a registry server
///
/// Registries are contacted over https, except that a domain with no dots in
/// it (`localhost`, `registry:5000`) is assumed to be a development server
/// speaking plain http. This is the same guess Docker makes.
#[derive(Clone)]
pub struct Registry {
    serialized: String,
    domain_pos: Range<usize>,
    port: Option<u16>,
    is_https: bool,
}

super::string_identity!(Registry);

impl Registry {
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as a [Registry]
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", Registry::regex_str())).unwrap();
        }
        let invalid = || ImageError::InvalidReferenceFormat(s.to_owned());
        let captures = RE.captures(s).ok_or_else(invalid)?;
        let domain = captures.name("reg_d").unwrap();
        let port = match captures.name("reg_p") {
            None => None,
            Some(m) => Some(m.as_str().parse().map_err(|_| invalid())?),
        };
        Ok(Registry {
            serialized: s.to_owned(),
            domain_pos: domain.range(),
            is_https: domain.as_str().contains('.'),
            port,
        })
    }

    pub fn domain_str(&self) -> &str {
        &self.serialized[self.domain_pos.clone()]
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn is_https(&self) -> bool {
        self.is_https
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<reg>",
            /*  */ "(?P<reg_d>",
            /* -- */ "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])",
            /* -- */ "(?:\\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))*",
            /*  */ ")",
            /*  */ "(?:[:](?P<reg_p>[0-9]+))?",
            ")",
        )
    }
}
