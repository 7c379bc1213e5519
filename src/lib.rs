//! Mirror the container images a workload uses into a cache registry, and
//! rewrite the workload to pull from there.

#[macro_use] extern crate lazy_static;

pub mod config;
pub mod errors;
pub mod image;
pub mod manifest;
pub mod metrics;
pub mod mirror;
pub mod namespace;
pub mod platform;
pub mod registry;
pub mod resolver;

pub use crate::{
    config::MirrorConfig,
    image::ImageName,
    mirror::{Mirror, MirrorBatch, Transport},
    namespace::NamespaceFilter,
    registry::Client,
};
