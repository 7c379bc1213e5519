use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Mirror the images used by Deployments and DaemonSets into a cache
/// registry, and point the workloads at the cached copies.
#[derive(Parser, Debug)]
#[command(name = "image-clone-controller")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Cache repository root that images are copied under, like docker.io/kube456
    #[arg(long, env = "REPO_URL")]
    pub repo_url: String,

    /// Directory holding the config.json with registry credentials
    #[arg(long, env = "DOCKER_CONFIG")]
    pub docker_config: PathBuf,

    /// Comma separated namespaces to leave alone, in addition to kube-system
    #[arg(long, env = "NAMESPACES_TO_SKIP", default_value = "")]
    pub namespaces_to_skip: String,

    /// Minutes to wait before retrying a failed workload
    #[arg(long, env = "DELAY_PERIOD", default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub delay_period: u64,

    /// Connect using a kubeconfig file instead of the in-cluster service account
    #[arg(long, env = "IS_DEV_ENV")]
    pub is_dev_env: bool,

    /// Kubeconfig used in development mode, defaults to ~/.kube/config
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Oldest cluster version whose ephemeral containers are mirrored
    #[arg(long, env = "EPHEMERAL_MIN_VERSION", default_value = "v1.16")]
    pub ephemeral_min_version: String,

    /// Address for the Prometheus metrics endpoint
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    pub metrics_addr: SocketAddr,

    /// Seconds allowed for each registry request
    #[arg(long, env = "REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    /// Seconds allowed for connecting to a registry
    #[arg(long, env = "CONNECT_TIMEOUT")]
    pub connect_timeout: Option<u64>,

    /// Registries to reach over plain http, comma separated
    #[arg(long = "insecure-registry", env = "INSECURE_REGISTRIES", value_delimiter = ',')]
    pub insecure_registries: Vec<String>,

    /// Log filter, in env_logger syntax
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.delay_period * 60)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.map(Duration::from_secs)
    }

    pub fn kubeconfig_path(&self) -> Option<PathBuf> {
        self.kubeconfig
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".kube").join("config")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(
            ["image-clone-controller", "--repo-url", "docker.io/kube456", "--docker-config", "/tmp/docker"]
                .iter()
                .chain(args),
        )
    }

    #[test]
    fn defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.repo_url, "docker.io/kube456");
        assert_eq!(args.retry_delay(), Duration::from_secs(300));
        assert_eq!(args.ephemeral_min_version, "v1.16");
        assert_eq!(args.metrics_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(args.request_timeout(), None);
        assert_eq!(args.connect_timeout(), None);
    }

    #[test]
    fn registry_timeouts() {
        let args = parse(&["--request-timeout", "120", "--connect-timeout", "10"]).unwrap();
        assert_eq!(args.request_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(args.connect_timeout(), Some(Duration::from_secs(10)));
        assert!(parse(&["--connect-timeout", "soon"]).is_err());
    }

    #[test]
    fn delay_must_be_positive() {
        assert!(parse(&["--delay-period", "0"]).is_err());
        assert!(parse(&["--delay-period", "-3"]).is_err());
        assert!(parse(&["--delay-period", "soon"]).is_err());
        assert_eq!(parse(&["--delay-period", "2"]).unwrap().retry_delay(), Duration::from_secs(120));
    }

    #[test]
    fn insecure_registries_are_comma_separated() {
        let args = parse(&["--insecure-registry", "registry.local:5000,10.0.0.2"]).unwrap();
        assert_eq!(args.insecure_registries, vec!["registry.local:5000", "10.0.0.2"]);
    }
}
