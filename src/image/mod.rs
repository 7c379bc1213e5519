//! Image references and their component parts


mod digest;
mod name;
mod registry;
mod repository;
mod tag;
mod version;

pub use digest::ContentDigest;
pub use name::ImageName;
pub use registry::Registry;
pub use repository::{Repository, RepositoryIter};
pub use tag::Tag;
pub use version::ImageVersion;

/// Identity traits for types that are fully described by their serialized
/// string: equality, hashing, and ordering all follow the string.
macro_rules! string_identity {
    ($ty:ident) => {
        impl Eq for $ty {}

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.serialized.eq(&other.serialized)
            }
        }

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.serialized.hash(state);
            }
        }

        impl Ord for $ty {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.serialized.cmp(&other.serialized)
            }
        }

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl std::str::FromStr for $ty {
            type Err = crate::errors::ImageError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::parse(s)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use string_identity;
