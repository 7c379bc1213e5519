//! Prometheus counters for clone attempts

use crate::errors::ErrorKind;
use prometheus_client::{
    encoding::{text::encode, EncodeLabelSet},
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FailureLabels {
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pub image: String,
    pub err_type: String,
}

/// Counters shared by every reconciler; clones update the same values
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    image_clones: Counter,
    failures: Family<FailureLabels, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    /// Exposed as `image_clone_total` and `image_clone_failures_total`
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "image_clone",
            "Number of images cloned into the cache registry",
            self.image_clones.clone(),
        );
        registry.register(
            "image_clone_failures",
            "Number of failed image clones",
            self.failures.clone(),
        );
    }

    pub fn record_pushed(&self, count: usize) {
        self.image_clones.inc_by(count as u64);
    }

    pub fn record_failure(&self, name: &str, namespace: &str, kind: &str, image: &str, err: ErrorKind) {
        self.failures
            .get_or_create(&FailureLabels {
                name: name.to_owned(),
                namespace: namespace.to_owned(),
                kind: kind.to_owned(),
                image: image.to_owned(),
                err_type: err.as_str().to_owned(),
            })
            .inc();
    }

    pub fn image_clones(&self) -> u64 {
        self.image_clones.get()
    }
}

/// Text exposition format for a registry
pub fn encode_text(registry: &Registry) -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    encode(&mut buffer, registry)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_exposed() {
        let metrics = Metrics::new();
        let mut registry = Registry::default();
        metrics.register(&mut registry);

        metrics.record_pushed(2);
        metrics.clone().record_pushed(1);
        metrics.record_failure("web", "default", "Deployment", "nginx:", ErrorKind::ImageReference);
        assert_eq!(metrics.image_clones(), 3);

        let text = encode_text(&registry).unwrap();
        assert!(text.contains("image_clone_total 3"));
        assert!(text.contains("image_clone_failures_total{"));
        assert!(text.contains("err_type=\"IMAGE_REFERENCE\""));
        assert!(text.contains("namespace=\"default\""));
    }
}
