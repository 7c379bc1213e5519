use crate::{manifest::ManifestHandle, resolver::CacheReference};
use std::collections::{btree_map, BTreeMap};

/// Images to write in one push, keyed by where they go
///
/// Iterates in cache reference order. Inserting a key twice keeps the later
/// manifest, even when the two came from different origin images.
#[derive(Clone, Debug, Default)]
pub struct MirrorBatch {
    entries: BTreeMap<CacheReference, ManifestHandle>,
}

impl MirrorBatch {
    pub fn new() -> Self {
        MirrorBatch::default()
    }

    /// Add an image, returning any manifest it replaced
    pub fn insert(
        &mut self,
        target: CacheReference,
        manifest: ManifestHandle,
    ) -> Option<ManifestHandle> {
        let replaced = self.entries.insert(target.clone(), manifest);
        if let Some(previous) = &replaced {
            if let Some(current) = self.entries.get(&target) {
                if previous.source != current.source {
                    log::warn!(
                        "{} and {} both cache as {}, keeping {}",
                        previous.source,
                        current.source,
                        target,
                        current.source
                    );
                }
            }
        }
        replaced
    }

    pub fn get(&self, target: &CacheReference) -> Option<&ManifestHandle> {
        self.entries.get(target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, CacheReference, ManifestHandle> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a MirrorBatch {
    type Item = (&'a CacheReference, &'a ManifestHandle);
    type IntoIter = btree_map::Iter<'a, CacheReference, ManifestHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
