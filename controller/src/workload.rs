use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment},
        core::v1::PodSpec,
    },
    NamespaceResourceScope,
};
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// A namespaced resource that runs pods from a template
pub trait Workload:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    /// The template's pod spec, if the object has one
    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec>;
}

impl Workload for Deployment {
    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        self.spec.as_mut().and_then(|spec| spec.template.spec.as_mut())
    }
}

impl Workload for DaemonSet {
    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        self.spec.as_mut().and_then(|spec| spec.template.spec.as_mut())
    }
}
