//! Mirroring every image in a pod spec, then rewriting the spec
//!
//! One call fetches each container's origin manifest in order, pushes all of
//! them to the cache registry together, and only then points the containers
//! at their cached copies. Any failure leaves the pod spec as it was.


mod batch;

pub use batch::MirrorBatch;

use crate::{
    config::MirrorConfig,
    errors::{CloneFailure, ErrorKind, ImageError},
    image::ImageName,
    manifest::ManifestHandle,
    metrics::Metrics,
    platform::{supports_ephemeral_containers, PlatformVersion},
    resolver::{CacheReference, Resolver},
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::PodSpec;
use std::{future::Future, time::Duration};

/// Registry access the mirror needs
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read an image's manifest, and its children for an index, from the
    /// image's own registry
    async fn fetch_manifest(&self, image: &ImageName) -> Result<ManifestHandle, ImageError>;

    /// Write every image in the batch to its cache reference
    async fn push_batch(&self, batch: &MirrorBatch) -> Result<(), ImageError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn fetch_manifest(&self, image: &ImageName) -> Result<ManifestHandle, ImageError> {
        (**self).fetch_manifest(image).await
    }

    async fn push_batch(&self, batch: &MirrorBatch) -> Result<(), ImageError> {
        (**self).push_batch(batch).await
    }
}

/// One image field in a pod spec
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Slot {
    Container(usize),
    Ephemeral(usize),
    Init(usize),
}

/// The image fields to mirror, in the order they are processed
fn scan(spec: &PodSpec, include_ephemeral: bool) -> Vec<(Slot, String)> {
    let mut slots = Vec::new();
    for (idx, c) in spec.containers.iter().enumerate() {
        slots.push((Slot::Container(idx), c.image.clone().unwrap_or_default()));
    }
    if include_ephemeral {
        for (idx, c) in spec.ephemeral_containers.iter().flatten().enumerate() {
            slots.push((Slot::Ephemeral(idx), c.image.clone().unwrap_or_default()));
        }
    }
    for (idx, c) in spec.init_containers.iter().flatten().enumerate() {
        slots.push((Slot::Init(idx), c.image.clone().unwrap_or_default()));
    }
    slots
}

fn rewrite(spec: &mut PodSpec, slot: Slot, image: String) {
    let field = match slot {
        Slot::Container(idx) => spec.containers.get_mut(idx).map(|c| &mut c.image),
        Slot::Ephemeral(idx) => spec
            .ephemeral_containers
            .as_mut()
            .and_then(|v| v.get_mut(idx))
            .map(|c| &mut c.image),
        Slot::Init(idx) => spec
            .init_containers
            .as_mut()
            .and_then(|v| v.get_mut(idx))
            .map(|c| &mut c.image),
    };
    if let Some(field) = field {
        *field = Some(image);
    }
}

/// The batch mirror engine
///
/// Holds no per-call state, so one [Mirror] can serve concurrent reconciles.
pub struct Mirror<T> {
    transport: T,
    resolver: Resolver,
    ephemeral_min_version: PlatformVersion,
    operation_timeout: Option<Duration>,
    metrics: Metrics,
}

impl<T: Transport> Mirror<T> {
    pub fn new(transport: T, config: MirrorConfig, metrics: Metrics) -> Self {
        Mirror {
            transport,
            resolver: Resolver::new(config.cache_root),
            ephemeral_min_version: config.ephemeral_min_version,
            operation_timeout: config.operation_timeout,
            metrics,
        }
    }

    async fn within<F, R>(&self, fut: F) -> Result<R, ImageError>
    where
        F: Future<Output = Result<R, ImageError>>,
    {
        match self.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await?,
            None => fut.await,
        }
    }

    /// Mirror every image `spec` uses and point its containers at the cache
    ///
    /// Containers come first, then ephemeral containers if `platform_version`
    /// is new enough, then init containers. The first image that fails to
    /// parse or fetch ends the attempt. After all fetches succeed the batch
    /// is pushed once, and only if that works is `spec` rewritten.
    ///
    /// Returns how many distinct cache images were pushed.
    pub async fn mirror_and_rewrite(
        &self,
        spec: &mut PodSpec,
        platform_version: &str,
    ) -> Result<usize, CloneFailure> {
        let include_ephemeral =
            supports_ephemeral_containers(platform_version, &self.ephemeral_min_version);
        let mut batch = MirrorBatch::new();
        let mut rewrites: Vec<(Slot, CacheReference)> = Vec::new();

        for (slot, raw) in scan(spec, include_ephemeral) {
            let image = self.resolver.parse(&raw).map_err(|err| {
                log::error!("error occurred getting reference {:?}: {}", raw, err);
                CloneFailure::new(raw.as_str(), ErrorKind::ImageReference, err)
            })?;
            let manifest = self
                .within(self.resolver.fetch_manifest(&self.transport, &image))
                .await
                .map_err(|err| {
                    log::error!("error occurred getting manifest for {}: {}", image, err);
                    CloneFailure::new(raw.as_str(), ErrorKind::ImageManifest, err)
                })?;
            let target = self.resolver.to_cache_reference(&image);
            log::debug!("{:?} {} -> {}", slot, image, target);
            batch.insert(target.clone(), manifest);
            rewrites.push((slot, target));
        }

        if batch.is_empty() {
            return Ok(0);
        }

        log::info!(
            "caching {} image(s): {:?}",
            batch.len(),
            batch.iter().map(|(target, _)| target).collect::<Vec<_>>()
        );
        self.within(self.transport.push_batch(&batch))
            .await
            .map_err(|err| {
                log::error!("error occurred writing images: {}", err);
                CloneFailure::new("", ErrorKind::ImageWrite, err)
            })?;

        for (slot, target) in rewrites {
            rewrite(spec, slot, target.to_string());
        }
        self.metrics.record_pushed(batch.len());
        Ok(batch.len())
    }
}
