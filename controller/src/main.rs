mod args;
mod reconcile;
mod serve;
mod workload;

use crate::{args::Args, reconcile::Context};
use clap::Parser;
use env_logger::Env;
use image_clone::{
    errors::{ConfigError, ImageError},
    metrics::Metrics,
    registry::{Client as RegistryClient, Keychain},
    Mirror, MirrorConfig, NamespaceFilter,
};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::{
    config::{InClusterError, KubeConfigOptions, Kubeconfig, KubeconfigError},
    Client, Config,
};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("cannot obtain cluster config: {0}")]
    InCluster(#[from] InClusterError),
    #[error("cannot build client config: {0}")]
    Kubeconfig(#[from] KubeconfigError),
    #[error("cannot talk to the cluster: {0}")]
    Kube(#[from] kube::Error),
    #[error("no kubeconfig path, set --kubeconfig")]
    NoKubeconfig,
}

async fn kube_client(args: &Args) -> Result<Client, StartupError> {
    let config = if args.is_dev_env {
        let path = args.kubeconfig_path().ok_or(StartupError::NoKubeconfig)?;
        log::info!("using kubeconfig {:?}", path);
        let kubeconfig = Kubeconfig::read_from(&path)?;
        Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
    } else {
        Config::incluster()?
    };
    Ok(Client::try_from(config)?)
}

fn registry_client(args: &Args) -> Result<RegistryClient, StartupError> {
    let mut builder = RegistryClient::builder().keychain(Keychain::from_config_dir(&args.docker_config)?);
    if let Some(timeout) = args.request_timeout() {
        builder = builder.request_timeout(timeout);
    }
    if let Some(timeout) = args.connect_timeout() {
        builder = builder.connect_timeout(timeout);
    }
    for registry in &args.insecure_registries {
        builder = builder.insecure_registry(registry.parse()?);
    }
    Ok(builder.build()?)
}

async fn run(args: Args) -> Result<(), StartupError> {
    let config = MirrorConfig::new(&args.repo_url)?.ephemeral_min_version(&args.ephemeral_min_version)?;
    let transport = registry_client(&args)?;
    let client = kube_client(&args).await?;
    let server_version = client.apiserver_version().await?.git_version;
    log::info!("cluster version {}", server_version);

    let metrics = Metrics::new();
    let mut registry = Registry::default();
    metrics.register(&mut registry);

    let filter = NamespaceFilter::new(&args.namespaces_to_skip);
    log::info!(
        "caching images under {}, skipping namespaces {:?}",
        config.cache_root,
        filter.iter().collect::<Vec<_>>()
    );
    let ctx = Arc::new(Context {
        client,
        mirror: Mirror::new(transport, config, metrics.clone()),
        filter,
        metrics,
        server_version,
        retry_delay: args.retry_delay(),
    });

    let metrics_addr = args.metrics_addr;
    let server = tokio::spawn(async move {
        if let Err(err) = serve::serve_metrics(metrics_addr, Arc::new(registry)).await {
            log::error!("metrics server failed: {}", err);
        }
    });
    futures::join!(
        reconcile::run::<Deployment>(ctx.clone()),
        reconcile::run::<DaemonSet>(ctx),
    );
    server.abort();
    log::info!("controllers stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_client_settings() {
        let dir = tempfile::tempdir().unwrap();
        let docker_config = dir.path().to_str().unwrap();
        let args = Args::try_parse_from([
            "image-clone-controller",
            "--repo-url",
            "registry.local/cache",
            "--docker-config",
            docker_config,
            "--request-timeout",
            "60",
            "--connect-timeout",
            "5",
            "--insecure-registry",
            "registry.local",
        ])
        .unwrap();
        assert!(registry_client(&args).is_ok());

        let args = Args::try_parse_from([
            "image-clone-controller",
            "--repo-url",
            "registry.local/cache",
            "--docker-config",
            docker_config,
            "--insecure-registry",
            "Not A Registry",
        ])
        .unwrap();
        assert!(matches!(registry_client(&args), Err(StartupError::Image(_))));
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    if let Err(err) = run(args).await {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
