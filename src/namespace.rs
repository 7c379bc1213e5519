//! Which namespaces the controller leaves alone

use std::collections::BTreeSet;

/// Always skipped, whatever the operator configures
pub const DEFAULT_SKIPPED_NAMESPACES: &[&str] = &["kube-system"];

/// Skip list built from a comma separated operator setting
///
/// Spaces are removed and empty entries dropped, so `" a, ,b "` names the
/// namespaces `a` and `b`. The defaults are always included.
#[derive(Clone, Debug)]
pub struct NamespaceFilter {
    skipped: BTreeSet<String>,
}

impl Default for NamespaceFilter {
    fn default() -> Self {
        NamespaceFilter::new("")
    }
}

impl NamespaceFilter {
    pub fn new(namespaces_to_skip: &str) -> Self {
        let skipped = namespaces_to_skip
            .split(',')
            .map(|s| s.replace(' ', ""))
            .filter(|s| !s.is_empty())
            .chain(DEFAULT_SKIPPED_NAMESPACES.iter().map(|s| (*s).to_owned()))
            .collect();
        NamespaceFilter { skipped }
    }

    pub fn is_skippable(&self, kind: &str, namespace: &str) -> bool {
        if self.skipped.contains(namespace) {
            log::info!(
                "configured to ignore workloads of type {} in the {} namespace, skipping",
                kind,
                namespace
            );
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.skipped.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kube_system_is_always_skipped() {
        assert!(NamespaceFilter::default().is_skippable("Deployment", "kube-system"));
        assert!(NamespaceFilter::new("monitoring").is_skippable("DaemonSet", "kube-system"));
        assert!(!NamespaceFilter::default().is_skippable("Deployment", "default"));
    }

    #[test]
    fn operator_list_is_cleaned_up() {
        let filter = NamespaceFilter::new(" default, ,mon itoring,,");
        assert!(filter.is_skippable("Deployment", "default"));
        assert!(filter.is_skippable("Deployment", "monitoring"));
        assert!(!filter.is_skippable("Deployment", ""));
        assert!(!filter.is_skippable("Deployment", "mon itoring"));
        assert_eq!(
            filter.iter().collect::<Vec<_>>(),
            vec!["default", "kube-system", "monitoring"]
        );
    }
}
