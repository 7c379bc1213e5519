//! Registry client: pulls manifests from origin registries and writes whole
//! images into the cache registry

use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageName, ImageVersion, Registry, Repository},
    manifest::{media_types, Link, ManifestContent, ManifestHandle},
    mirror::{MirrorBatch, Transport},
    registry::{
        auth::{Access, Auth},
        DefaultRegistry, Keychain,
    },
};
use async_trait::async_trait;
use http::{header::HeaderValue, Method, StatusCode};
use reqwest::{header, Body, RequestBuilder, Response, Url};
use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

/// Builder for configuring custom [Client] instances
pub struct ClientBuilder {
    req: reqwest::ClientBuilder,
    keychain: Keychain,
    allowed_registries: Option<HashSet<Registry>>,
    insecure_registries: HashSet<Registry>,
    allow_http_registries: bool,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        ClientBuilder {
            req: reqwest::Client::builder().user_agent(Client::default_user_agent()),
            keychain: Keychain::new(),
            allowed_registries: None,
            insecure_registries: HashSet::new(),
            allow_http_registries: true,
        }
    }

    /// Refuse registries that would be contacted over plain http
    ///
    /// Dot-less hosts such as `localhost/app` or `dev:5000/app` are http by
    /// default, as are registries named with [ClientBuilder::insecure_registry].
    pub fn disallow_http(mut self) -> Self {
        self.allow_http_registries = false;
        self
    }

    /// Only ever connect to these registries
    ///
    /// Without an allow list any server may be contacted. The default
    /// registry is not added implicitly.
    pub fn allow_only_connections_to(mut self, allowed: HashSet<Registry>) -> Self {
        self.allowed_registries = Some(allowed);
        self
    }

    /// Speak plain http to this registry even though its name has dots in it
    pub fn insecure_registry(mut self, registry: Registry) -> Self {
        self.insecure_registries.insert(registry);
        self
    }

    /// Limit each request, from connect until the last body byte
    ///
    /// By default there is no timeout. Note that this includes blob transfers.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.req = self.req.timeout(timeout);
        self
    }

    /// Limit only the connect phase of each request
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.req = self.req.connect_timeout(timeout);
        self
    }

    /// Use these stored credentials, replacing any set before
    pub fn keychain(mut self, keychain: Keychain) -> Self {
        self.keychain = keychain;
        self
    }

    pub fn build(self) -> Result<Client, ImageError> {
        let default_registry = Client::default_registry();
        Ok(Client {
            req: self.req.build()?,
            auth: Auth::new(self.keychain, default_registry.clone()),
            default_registry,
            allowed_registries: self.allowed_registries,
            insecure_registries: self.insecure_registries,
            allow_http_registries: self.allow_http_registries,
        })
    }
}

/// Talks to any number of registries on behalf of the mirror
///
/// Cheap to clone; clones share the connection pool and auth tokens.
#[derive(Clone)]
pub struct Client {
    req: reqwest::Client,
    auth: Auth,
    default_registry: DefaultRegistry,
    allowed_registries: Option<HashSet<Registry>>,
    insecure_registries: HashSet<Registry>,
    allow_http_registries: bool,
}

/// Blobs already present somewhere on a registry during one batch
type Written = HashMap<(Registry, ContentDigest), Repository>;

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn default_user_agent() -> HeaderValue {
        static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        HeaderValue::from_static(USER_AGENT)
    }

    pub fn default_registry() -> DefaultRegistry {
        DefaultRegistry::new()
    }

    fn is_registry_allowed(&self, registry: &Registry) -> bool {
        (self.allow_http_registries || self.is_https(registry))
            && match &self.allowed_registries {
                None => true,
                Some(allow_list) => allow_list.contains(registry),
            }
    }

    fn is_https(&self, registry: &Registry) -> bool {
        registry.is_https() && !self.insecure_registries.contains(registry)
    }

    /// `https://registry/v2/`
    fn base_url(&self, registry: &Registry) -> Result<Url, ImageError> {
        if !self.is_registry_allowed(registry) {
            log::warn!("registry {} not allowed by configuration", registry);
            return Err(ImageError::RegistryNotAllowed(registry.clone()));
        }
        let protocol = if self.is_https(registry) { "https" } else { "http" };
        Ok(Url::parse(&format!("{}://{}/v2/", protocol, registry))?)
    }

    fn repository_url(
        &self,
        registry: &Registry,
        repository: &Repository,
        path: &str,
    ) -> Result<Url, ImageError> {
        Ok(self
            .base_url(registry)?
            .join(&format!("{}/{}", repository, path))?)
    }

    /// Send a request, answering one auth challenge if the registry asks
    ///
    /// Requests with streaming bodies can't be replayed; those are sent once
    /// and should follow a request that already earned a grant.
    async fn send(
        &self,
        registry: &Registry,
        repository: &Repository,
        access: Access,
        req: RequestBuilder,
    ) -> Result<Response, ImageError> {
        let retry = req.try_clone();
        let response = self.auth.include(registry, repository, access, req).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        let retry = match retry {
            Some(retry) => retry,
            None => return Ok(response),
        };
        let challenge = match response.headers().get(header::WWW_AUTHENTICATE) {
            Some(value) => value
                .to_str()
                .map_err(|_| ImageError::UnsupportedAuthentication(format!("{:?}", value)))?
                .to_owned(),
            None => return Ok(response),
        };
        self.auth
            .authenticate_for(registry, repository, access, &self.req, &challenge)
            .await?;
        Ok(self.auth.include(registry, repository, access, retry).send().await?)
    }

    fn expect_success(method: Method, response: Response) -> Result<Response, ImageError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ImageError::UnexpectedStatus {
                method,
                url: response.url().to_string(),
                status: response.status(),
            })
        }
    }

    async fn get_manifest(
        &self,
        registry: &Registry,
        repository: &Repository,
        version: &ImageVersion,
    ) -> Result<(String, bytes::Bytes, ManifestContent, ContentDigest), ImageError> {
        let url = self.repository_url(registry, repository, &format!("manifests/{}", version))?;
        log::debug!("<{}> downloading manifest...", url);
        let req = self.req.get(url).header(header::ACCEPT, media_types::ACCEPT);
        let response = self.send(registry, repository, Access::Pull, req).await?;
        let response = Client::expect_success(Method::GET, response)?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let raw = response.bytes().await?;
        let digest = ContentDigest::from_content(&raw);
        let (media_type, content) = ManifestContent::parse(content_type.as_deref(), &raw)?;
        Ok((media_type, raw, content, digest))
    }

    /// Download the manifest for an image, and for an index every platform
    /// manifest it lists
    ///
    /// Digests are checked: against the image name if it has one, and against
    /// the index entry for each child.
    pub async fn pull_manifest(&self, image: &ImageName) -> Result<ManifestHandle, ImageError> {
        let (registry, repository) = self.default_registry.resolve_image_name(image);
        let (media_type, raw, content, digest) = self
            .get_manifest(&registry, &repository, &image.version())
            .await?;
        image.verify_digest(&digest)?;
        log::info!("{} manifest is {} ({})", image, digest, media_type);

        let mut children = Vec::new();
        if let ManifestContent::Index { manifests } = &content {
            for link in manifests {
                let expected = ContentDigest::parse(&link.digest)?;
                let (media_type, raw, content, digest) = self
                    .get_manifest(&registry, &repository, &expected.clone().into())
                    .await?;
                if digest != expected {
                    return Err(ImageError::ContentDigestMismatch {
                        expected,
                        found: digest,
                    });
                }
                if !media_types::is_image(&media_type) {
                    return Err(ImageError::UnsupportedManifestType(media_type));
                }
                children.push(ManifestHandle {
                    source: image.clone(),
                    media_type,
                    digest,
                    raw,
                    content,
                    children: Vec::new(),
                });
            }
        }

        Ok(ManifestHandle {
            source: image.clone(),
            media_type,
            digest,
            raw,
            content,
            children,
        })
    }

    /// Make sure one blob exists in the target repository
    ///
    /// Cheapest first: already written this batch, already on the server,
    /// mountable from another repository written this batch, and finally a
    /// streamed copy from the origin.
    async fn copy_blob(
        &self,
        source: &ImageName,
        link: &Link,
        registry: &Registry,
        repository: &Repository,
        written: &mut Written,
    ) -> Result<(), ImageError> {
        let digest = ContentDigest::parse(&link.digest)?;
        let key = (registry.clone(), digest.clone());
        let mount_from = match written.get(&key) {
            Some(existing) if existing == repository => return Ok(()),
            Some(existing) => Some(existing.clone()),
            None => None,
        };

        let blob_url = self.repository_url(registry, repository, &format!("blobs/{}", digest))?;
        let response = self
            .send(registry, repository, Access::Push, self.req.head(blob_url))
            .await?;
        if response.status() == StatusCode::OK {
            log::debug!("{} already present in {}/{}", digest, registry, repository);
            written.insert(key, repository.clone());
            return Ok(());
        }

        let mut upload_url = self.repository_url(registry, repository, "blobs/uploads/")?;
        if let Some(from) = &mount_from {
            upload_url
                .query_pairs_mut()
                .append_pair("mount", digest.as_str())
                .append_pair("from", from.as_str());
        }
        let response = self
            .send(registry, repository, Access::Push, self.req.post(upload_url))
            .await?;
        match response.status() {
            StatusCode::CREATED => {
                log::debug!("{} mounted into {}/{}", digest, registry, repository);
                written.insert(key, repository.clone());
                return Ok(());
            }
            StatusCode::ACCEPTED => (),
            _ => {
                Client::expect_success(Method::POST, response)?;
                return Err(ImageError::MissingUploadLocation(digest.to_string()));
            }
        }
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ImageError::MissingUploadLocation(digest.to_string()))?;
        let mut location = self.base_url(registry)?.join(location)?;
        location
            .query_pairs_mut()
            .append_pair("digest", digest.as_str());

        let (source_registry, source_repository) =
            self.default_registry.resolve_image_name(source);
        let source_url = self.repository_url(
            &source_registry,
            &source_repository,
            &format!("blobs/{}", digest),
        )?;
        log::info!("{} copying {} bytes ...", digest, link.size);
        let download = self
            .send(
                &source_registry,
                &source_repository,
                Access::Pull,
                self.req.get(source_url),
            )
            .await?;
        let download = Client::expect_success(Method::GET, download)?;
        let length = download.content_length().unwrap_or(link.size);

        let upload = self
            .req
            .put(location)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, length)
            .body(Body::wrap_stream(download.bytes_stream()));
        let upload = self
            .send(registry, repository, Access::Push, upload)
            .await?;
        Client::expect_success(Method::PUT, upload)?;
        written.insert(key, repository.clone());
        Ok(())
    }

    async fn put_manifest(
        &self,
        registry: &Registry,
        repository: &Repository,
        version: &ImageVersion,
        manifest: &ManifestHandle,
    ) -> Result<(), ImageError> {
        let url = self.repository_url(registry, repository, &format!("manifests/{}", version))?;
        log::debug!("<{}> writing manifest {}", url, manifest.digest);
        let req = self
            .req
            .put(url)
            .header(header::CONTENT_TYPE, &manifest.media_type)
            .body(manifest.raw.clone());
        let response = self.send(registry, repository, Access::Push, req).await?;
        Client::expect_success(Method::PUT, response)?;
        Ok(())
    }

    /// Write every image in a batch to its cache reference
    ///
    /// Blobs come first, then child manifests by digest, then the manifest
    /// under the cache reference's own version. Stops at the first error;
    /// images written before that stay written.
    pub async fn push_images(&self, batch: &MirrorBatch) -> Result<(), ImageError> {
        let mut written = Written::new();
        for (target, manifest) in batch.iter() {
            let (registry, repository) = self.default_registry.resolve_image_name(target.image());
            let blobs = manifest.blobs();
            log::info!("{} <- {} ({} blobs)", target, manifest.source, blobs.len());
            for link in blobs {
                self.copy_blob(&manifest.source, link, &registry, &repository, &mut written)
                    .await?;
            }
            for child in &manifest.children {
                self.put_manifest(&registry, &repository, &child.digest.clone().into(), child)
                    .await?;
            }
            self.put_manifest(&registry, &repository, &target.image().version(), manifest)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for Client {
    async fn fetch_manifest(&self, image: &ImageName) -> Result<ManifestHandle, ImageError> {
        self.pull_manifest(image).await
    }

    async fn push_batch(&self, batch: &MirrorBatch) -> Result<(), ImageError> {
        self.push_images(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_protocol_guess() {
        let client = Client::builder()
            .insecure_registry("registry.local:5000".parse().unwrap())
            .build()
            .unwrap();
        let hub: Registry = "registry-1.docker.io".parse().unwrap();
        assert_eq!(
            client.base_url(&hub).unwrap().as_str(),
            "https://registry-1.docker.io/v2/"
        );
        let dev: Registry = "localhost:5000".parse().unwrap();
        assert_eq!(
            client
                .repository_url(&dev, &"app".parse().unwrap(), "manifests/1")
                .unwrap()
                .as_str(),
            "http://localhost:5000/v2/app/manifests/1"
        );
        let local: Registry = "registry.local:5000".parse().unwrap();
        assert_eq!(
            client.base_url(&local).unwrap().as_str(),
            "http://registry.local:5000/v2/"
        );
    }

    #[test]
    fn allow_list_and_http_policy() {
        let quay: Registry = "quay.io".parse().unwrap();
        let client = Client::builder()
            .disallow_http()
            .allow_only_connections_to(std::iter::once(quay.clone()).collect())
            .build()
            .unwrap();
        assert!(client.base_url(&quay).is_ok());
        assert!(matches!(
            client.base_url(&"gcr.io".parse().unwrap()),
            Err(ImageError::RegistryNotAllowed(_))
        ));
        assert!(matches!(
            client.base_url(&"localhost:5000".parse().unwrap()),
            Err(ImageError::RegistryNotAllowed(_))
        ));
    }
}
