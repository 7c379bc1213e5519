use crate::image::{ImageName, Registry, Repository};

/// How to reach the registry used by names that don't include one
///
/// A plain [Registry] converts [Into] a [DefaultRegistry] with no aliases and
/// no library prefix.
#[derive(Clone, Debug)]
pub struct DefaultRegistry {
    /// Connect to the registry under this name
    pub network_name: Registry,
    /// Names that refer to the same registry, such as `docker.io`
    pub also_known_as: Vec<Registry>,
    /// Prefix for single-segment repositories, such as `library/`
    pub library_prefix: Option<Repository>,
}

impl From<Registry> for DefaultRegistry {
    fn from(network_name: Registry) -> Self {
        DefaultRegistry {
            network_name,
            also_known_as: vec![],
            library_prefix: None,
        }
    }
}

impl Default for DefaultRegistry {
    fn default() -> Self {
        DefaultRegistry::new()
    }
}

impl DefaultRegistry {
    /// Docker Hub
    pub fn new() -> Self {
        DefaultRegistry {
            network_name: "registry-1.docker.io".parse().unwrap(),
            also_known_as: vec![
                "docker.io".parse().unwrap(),
                "index.docker.io".parse().unwrap(),
            ],
            library_prefix: Some("library".parse().unwrap()),
        }
    }

    /// Does `registry` mean the default registry?
    ///
    /// True for no registry at all, the network name, or any alias.
    pub fn is_default(&self, registry: Option<&Registry>) -> bool {
        match registry {
            None => true,
            Some(registry) => {
                registry == &self.network_name || self.also_known_as.contains(registry)
            }
        }
    }

    /// The server to contact and repository path to request for an image
    pub fn resolve_image_name(&self, image: &ImageName) -> (Registry, Repository) {
        let repository = image.repository();
        match image.registry() {
            Some(registry) if !self.is_default(Some(&registry)) => (registry, repository),
            _ => {
                let repository = match &self.library_prefix {
                    Some(prefix) if !repository.is_nested() => prefix.join(&repository),
                    _ => repository,
                };
                (self.network_name.clone(), repository)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(image: &str) -> (String, String) {
        let (registry, repository) =
            DefaultRegistry::new().resolve_image_name(&image.parse().unwrap());
        (registry.to_string(), repository.to_string())
    }

    #[test]
    fn docker_hub_names() {
        let hub = "registry-1.docker.io".to_owned();
        assert_eq!(resolve("busybox"), (hub.clone(), "library/busybox".to_owned()));
        assert_eq!(resolve("docker.io/busybox:1"), (hub.clone(), "library/busybox".to_owned()));
        assert_eq!(resolve("docker.io/kube123/test"), (hub.clone(), "kube123/test".to_owned()));
        assert_eq!(resolve("index.docker.io/a/b"), (hub, "a/b".to_owned()));
    }

    #[test]
    fn other_registries_are_untouched() {
        assert_eq!(
            resolve("quay.io/prometheus/node-exporter"),
            ("quay.io".to_owned(), "prometheus/node-exporter".to_owned())
        );
        assert_eq!(
            resolve("localhost:5000/app"),
            ("localhost:5000".to_owned(), "app".to_owned())
        );
    }
}
