//! Error types you might see while resolving, fetching, or mirroring images

use std::fmt;
use thiserror::Error;

/// Errors during image resolution and registry transfer
#[derive(Error, Debug)]
pub enum ImageError {
    /// invalid image reference format
    #[error("invalid image reference format: {0:?}")]
    InvalidReferenceFormat(String),

    /// json error
    #[error("json error: {0}")]
    JSON(#[from] serde_json::Error),

    /// network request error
    #[error("network request error: {0}")]
    NetworkRequest(#[from] reqwest::Error),

    /// invalid url
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// io error while reading local configuration
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    /// registry server is not allowed by the current configuration
    #[error("registry server is not allowed by the current configuration: {0}")]
    RegistryNotAllowed(crate::image::Registry),

    /// registry responded with an unexpected status
    #[error("registry responded to {method} {url} with status {status}")]
    UnexpectedStatus {
        method: http::Method,
        url: String,
        status: http::StatusCode,
    },

    /// upload session did not return a location
    #[error("registry did not return an upload location for {0}")]
    MissingUploadLocation(String),

    /// manifest has a media type we cannot mirror
    #[error("unsupported manifest type {0:?}")]
    UnsupportedManifestType(String),

    /// registry server requested an unsupported type of authentication
    #[error("registry server requested an unsupported type of authentication: {0:?}")]
    UnsupportedAuthentication(String),

    /// credential entry in the docker configuration could not be decoded
    #[error("invalid credentials for {0} in docker configuration")]
    InvalidCredentials(String),

    /// network operation exceeded its deadline
    #[error("registry operation timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    /// calculated digest of downloaded content is not what we asked for
    #[error("calculated digest of downloaded content is not what we asked for, expected {expected}, found {found}")]
    ContentDigestMismatch {
        expected: crate::image::ContentDigest,
        found: crate::image::ContentDigest,
    },
}

/// Errors detected while validating configuration at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    /// cache repository root cannot prefix an image name
    #[error("cache repository root {0:?} is not a valid image repository prefix")]
    InvalidCacheRoot(String),

    /// version string is not a recognizable platform version
    #[error("invalid platform version {0:?}")]
    InvalidPlatformVersion(String),
}

/// Classification of a failed clone attempt
///
/// The string forms are stable; they appear in metric labels and in the
/// messages returned to the controller.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// the image string could not be parsed
    ImageReference,
    /// the origin manifest could not be fetched
    ImageManifest,
    /// the batch push to the cache registry failed
    ImageWrite,
    /// the workload object could not be read
    SpecGet,
    /// the rewritten workload object could not be stored
    SpecUpdate,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ImageReference => "IMAGE_REFERENCE",
            ErrorKind::ImageManifest => "IMAGE_MANIFEST",
            ErrorKind::ImageWrite => "IMAGE_WRITE",
            ErrorKind::SpecGet => "SPEC_GET",
            ErrorKind::SpecUpdate => "SPEC_UPDATE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first failure met while mirroring one pod spec
///
/// `image` is the raw string from the offending container. It is empty when
/// the failure is not attributable to one container, as with a failed batch
/// push.
#[derive(Error, Debug)]
#[error("error occurred cloning image {image}, reason: {kind}")]
pub struct CloneFailure {
    pub image: String,
    pub kind: ErrorKind,
    #[source]
    pub source: ImageError,
}

impl CloneFailure {
    pub fn new(image: impl Into<String>, kind: ErrorKind, source: ImageError) -> Self {
        CloneFailure {
            image: image.into(),
            kind,
            source,
        }
    }
}
