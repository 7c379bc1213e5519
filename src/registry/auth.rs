use crate::{
    errors::ImageError,
    image::{Registry, Repository},
    registry::{DefaultRegistry, Keychain, Login},
};
use regex::Regex;
use reqwest::{RequestBuilder, Url};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

/// What a request needs to be allowed to do in a repository
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Access {
    Pull,
    Push,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Pull => "pull",
            Access::Push => "pull,push",
        })
    }
}

#[derive(Clone)]
enum Grant {
    Bearer(String),
    Basic(Login),
}

/// Registry authorization shared by every clone of a client
///
/// Grants are remembered per repository and access, since bearer tokens are
/// scoped to the repositories and actions they were requested for. A push
/// grant also serves pulls; a pull grant is never sent with a write.
#[derive(Clone)]
pub struct Auth {
    keychain: Keychain,
    default_registry: DefaultRegistry,
    grants: Arc<Mutex<HashMap<GrantKey, Grant>>>,
}

type GrantKey = (Registry, Repository, Access);

impl Auth {
    pub fn new(keychain: Keychain, default_registry: DefaultRegistry) -> Self {
        Auth {
            keychain,
            default_registry,
            grants: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn include(
        &self,
        registry: &Registry,
        repository: &Repository,
        access: Access,
        req: RequestBuilder,
    ) -> RequestBuilder {
        let grants = self.grants.lock().unwrap_or_else(PoisonError::into_inner);
        let key = |access| (registry.clone(), repository.clone(), access);
        let grant = match access {
            Access::Pull => grants
                .get(&key(Access::Pull))
                .or_else(|| grants.get(&key(Access::Push))),
            Access::Push => grants.get(&key(Access::Push)),
        };
        match grant {
            Some(Grant::Bearer(token)) => req.bearer_auth(token),
            Some(Grant::Basic(login)) => req.basic_auth(&login.username, login.password.as_ref()),
            None => req,
        }
    }

    /// Answer a `WWW-Authenticate` challenge
    ///
    /// Reference: <https://distribution.github.io/distribution/spec/auth/token/>
    pub async fn authenticate_for(
        &self,
        registry: &Registry,
        repository: &Repository,
        access: Access,
        req: &reqwest::Client,
        auth_header: &str,
    ) -> Result<(), ImageError> {
        let login = self.keychain.lookup(registry, &self.default_registry);
        let grant = match Challenge::parse(auth_header)? {
            Challenge::Basic => match login {
                Some(login) => Grant::Basic(login.clone()),
                None => {
                    return Err(ImageError::UnsupportedAuthentication(format!(
                        "{} requires a login for {}",
                        auth_header, registry
                    )))
                }
            },
            Challenge::Bearer(challenge) => {
                log::debug!("login challenge for {}, {:?}", registry, challenge);
                // the challenge may name less than this request needs, or
                // extra repositories such as a mount source
                let mut scopes = vec![format!("repository:{}:{}", repository, access)];
                if let Some(scope) = &challenge.scope {
                    for scope in scope.split(' ') {
                        if !scopes.iter().any(|s| s == scope) {
                            scopes.push(scope.to_owned());
                        }
                    }
                }
                let mut query: Vec<(&str, &str)> =
                    scopes.iter().map(|scope| ("scope", scope.as_str())).collect();
                if let Some(service) = &challenge.service {
                    query.push(("service", service.as_str()));
                }
                let req = req.get(challenge.realm.clone()).query(&query);
                let req = match login {
                    Some(login) => req.basic_auth(&login.username, login.password.as_ref()),
                    None => req,
                };
                let response: Token = req.send().await?.error_for_status()?.json().await?;
                Grant::Bearer(response.into_token()?)
            }
        };
        log::debug!("received {} grant for {}/{}", access, registry, repository);
        self.grants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((registry.clone(), repository.clone(), access), grant);
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Challenge {
    Basic,
    Bearer(BearerChallenge),
}

#[derive(Debug, Clone)]
struct BearerChallenge {
    realm: Url,
    service: Option<String>,
    scope: Option<String>,
}

#[derive(Deserialize)]
struct Token {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl Token {
    fn into_token(self) -> Result<String, ImageError> {
        self.token.or(self.access_token).ok_or_else(|| {
            ImageError::UnsupportedAuthentication("token response without a token".to_owned())
        })
    }
}

impl Challenge {
    fn parse(auth_header: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref BASIC: Regex = Regex::new(r"^\s*(?i:basic)(?:\s|$)").unwrap();
            static ref BEARER: Regex = Regex::new(concat!(
                "^\\s*",
                "(?i:bearer)",
                "(?:", // unordered parameters
                /* */ "\\s*",
                /* */ "(?:",
                /* -- */ "(?:service=\"(?P<service>",
                /* -- -- */ r"[\x20-\x21\x23-\x5B\x5D-\x7E]*", // RFC 6750 quoted-string chars
                /* -- */ ")\")|",
                /* -- */ "(?:scope=\"(?P<scope>",
                /* -- -- */ r"[\x20-\x21\x23-\x5B\x5D-\x7E]*",
                /* -- */ ")\")|",
                /* -- */ "(?:realm=\"(?P<realm>",
                /* -- -- */ "https?://[-_.+a-zA-Z:0-9/]+",
                /* -- */ ")\")|",
                /* -- */ "(?:[a-z_]+=\"[^\"]*\")", // error, error_description, ...
                /* */ ")",
                /* */ ",?",
                ")*\\s*$",
            ))
            .unwrap();
        }
        if BASIC.is_match(auth_header) {
            return Ok(Challenge::Basic);
        }
        let unsupported = || ImageError::UnsupportedAuthentication(auth_header.to_owned());
        let captures = BEARER.captures(auth_header).ok_or_else(unsupported)?;
        let realm = captures
            .name("realm")
            .and_then(|m| m.as_str().parse::<Url>().ok())
            .ok_or_else(unsupported)?;
        Ok(Challenge::Bearer(BearerChallenge {
            realm,
            service: captures.name("service").map(|m| m.as_str().to_owned()),
            scope: captures.name("scope").map(|m| m.as_str().to_owned()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_hub_challenge() {
        let header = r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/busybox:pull""#;
        match Challenge::parse(header).unwrap() {
            Challenge::Bearer(c) => {
                assert_eq!(c.realm.as_str(), "https://auth.docker.io/token");
                assert_eq!(c.service.as_deref(), Some("registry.docker.io"));
                assert_eq!(c.scope.as_deref(), Some("repository:library/busybox:pull"));
            }
            other => panic!("unexpected challenge {:?}", other),
        }
    }

    #[test]
    fn challenge_with_error_and_no_scope() {
        let header = r#"Bearer realm="https://ghcr.io/token",service="ghcr.io",error="invalid_token""#;
        match Challenge::parse(header).unwrap() {
            Challenge::Bearer(c) => {
                assert_eq!(c.scope, None);
                assert_eq!(c.service.as_deref(), Some("ghcr.io"));
            }
            other => panic!("unexpected challenge {:?}", other),
        }
    }

    #[test]
    fn basic_challenge() {
        assert!(matches!(
            Challenge::parse(r#"Basic realm="Registry Realm""#),
            Ok(Challenge::Basic)
        ));
    }

    #[test]
    fn unsupported_challenges() {
        assert!(Challenge::parse("Negotiate").is_err());
        assert!(Challenge::parse(r#"Bearer service="x""#).is_err());
        assert!(Challenge::parse(r#"Bearer realm="ftp://example.com/token""#).is_err());
    }

    fn authorization(auth: &Auth, repository: &str, access: Access) -> Option<String> {
        let registry: Registry = "registry.local".parse().unwrap();
        let req = reqwest::Client::new().get("https://registry.local/v2/");
        auth.include(&registry, &repository.parse().unwrap(), access, req)
            .build()
            .unwrap()
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_owned())
    }

    fn grant(auth: &Auth, repository: &str, access: Access, token: &str) {
        auth.grants.lock().unwrap().insert(
            (
                "registry.local".parse().unwrap(),
                repository.parse().unwrap(),
                access,
            ),
            Grant::Bearer(token.to_owned()),
        );
    }

    #[test]
    fn grants_follow_access() {
        let auth = Auth::new(Keychain::new(), DefaultRegistry::new());
        grant(&auth, "cache/app", Access::Pull, "read");
        assert_eq!(authorization(&auth, "cache/app", Access::Pull).as_deref(), Some("Bearer read"));
        assert_eq!(authorization(&auth, "cache/app", Access::Push), None);
        assert_eq!(authorization(&auth, "cache/tool", Access::Pull), None);

        grant(&auth, "cache/tool", Access::Push, "write");
        assert_eq!(authorization(&auth, "cache/tool", Access::Pull).as_deref(), Some("Bearer write"));
        assert_eq!(authorization(&auth, "cache/tool", Access::Push).as_deref(), Some("Bearer write"));
    }

    #[test]
    fn access_scope_actions() {
        assert_eq!(Access::Pull.to_string(), "pull");
        assert_eq!(Access::Push.to_string(), "pull,push");
    }
}
