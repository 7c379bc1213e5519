//! Credentials from a Docker client configuration file

use crate::{errors::ImageError, image::Registry, registry::DefaultRegistry};
use base64::Engine;
use serde::Deserialize;
use std::{collections::HashMap, path::Path};

/// Username and optional password for one registry
#[derive(Clone, Eq, PartialEq)]
pub struct Login {
    pub username: String,
    pub password: Option<String>,
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Stored logins, keyed by registry host
///
/// Loaded from the `auths` section of a Docker `config.json`. Keys there may
/// be bare hosts (`gcr.io`) or URLs (`https://index.docker.io/v1/`); both are
/// reduced to the host. Credential helpers are not consulted.
#[derive(Clone, Debug, Default)]
pub struct Keychain {
    logins: HashMap<String, Login>,
}

#[derive(Deserialize)]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    #[serde(default, rename = "credsStore")]
    creds_store: Option<String>,
    #[serde(default, rename = "credHelpers")]
    cred_helpers: HashMap<String, String>,
}

#[derive(Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl Keychain {
    pub fn new() -> Self {
        Keychain::default()
    }

    /// Load `config.json` from a Docker configuration directory
    ///
    /// A missing file is an empty keychain, so every registry is accessed
    /// anonymously.
    pub fn from_config_dir(dir: &Path) -> Result<Self, ImageError> {
        let path = dir.join("config.json");
        match std::fs::read(&path) {
            Ok(data) => {
                log::debug!("loading registry credentials from {:?}", path);
                Keychain::from_json(&data)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("no docker configuration at {:?}, using anonymous access", path);
                Ok(Keychain::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn from_json(data: &[u8]) -> Result<Self, ImageError> {
        let config: DockerConfig = serde_json::from_slice(data)?;
        if config.creds_store.is_some() || !config.cred_helpers.is_empty() {
            log::warn!("docker credential helpers are configured but not supported, ignoring");
        }
        let mut keychain = Keychain::new();
        for (key, entry) in config.auths {
            let host = host_of(&key);
            let login = match (entry.auth, entry.username) {
                (Some(auth), _) if !auth.is_empty() => decode_auth(&host, &auth)?,
                (_, Some(username)) => Login {
                    username,
                    password: entry.password,
                },
                _ => continue,
            };
            keychain.logins.insert(host, login);
        }
        Ok(keychain)
    }

    /// Find the login for a registry, trying the default registry's aliases
    pub fn lookup(&self, registry: &Registry, default: &DefaultRegistry) -> Option<&Login> {
        if let Some(login) = self.logins.get(registry.as_str()) {
            return Some(login);
        }
        if default.is_default(Some(registry)) {
            std::iter::once(&default.network_name)
                .chain(&default.also_known_as)
                .find_map(|alias| self.logins.get(alias.as_str()))
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.logins.is_empty()
    }
}

/// `https://index.docker.io/v1/` -> `index.docker.io`
fn host_of(key: &str) -> String {
    let key = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    key.split('/').next().unwrap_or(key).to_owned()
}

fn decode_auth(host: &str, auth: &str) -> Result<Login, ImageError> {
    let invalid = || ImageError::InvalidCredentials(host.to_owned());
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth.trim())
        .map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    match decoded.split_once(':') {
        Some((username, password)) => Ok(Login {
            username: username.to_owned(),
            password: Some(password.to_owned()),
        }),
        None => Err(invalid()),
    }
}
