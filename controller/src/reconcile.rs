use crate::workload::Workload;
use futures::StreamExt;
use image_clone::{
    errors::{CloneFailure, ErrorKind},
    metrics::Metrics,
    Client as RegistryClient, Mirror, NamespaceFilter,
};
use kube::{
    api::{Api, PostParams, ResourceExt},
    runtime::{controller::Action, watcher, Controller},
    Client,
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

/// Everything a reconcile needs, shared by all workload kinds
pub struct Context {
    pub client: Client,
    pub mirror: Mirror<RegistryClient>,
    pub filter: NamespaceFilter,
    pub metrics: Metrics,
    pub server_version: String,
    pub retry_delay: Duration,
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("error occurred getting {kind}: {source}")]
    Get {
        kind: String,
        #[source]
        source: kube::Error,
    },

    #[error(transparent)]
    Clone(#[from] CloneFailure),

    #[error("error occurred updating {kind} {name} in namespace {namespace}: {source}")]
    Update {
        name: String,
        namespace: String,
        kind: String,
        #[source]
        source: kube::Error,
    },
}

/// Mirror one workload's images and store the rewritten object
///
/// Objects in skipped namespaces, and objects deleted since the event, are
/// left alone.
pub async fn reconcile<K: Workload>(obj: Arc<K>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let kind = K::kind(&()).to_string();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let api: Api<K> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut workload = match api.get_opt(&name).await {
        Ok(Some(workload)) => workload,
        Ok(None) => {
            log::debug!("{} {}/{} is gone", kind, namespace, name);
            return Ok(Action::await_change());
        }
        Err(source) => {
            ctx.metrics
                .record_failure(&name, &namespace, &kind, "", ErrorKind::SpecGet);
            return Err(ReconcileError::Get { kind, source });
        }
    };

    if ctx.filter.is_skippable(&kind, &namespace) {
        return Ok(Action::await_change());
    }

    let spec = match workload.pod_spec_mut() {
        Some(spec) => spec,
        None => {
            log::warn!("{} {}/{} has no pod template", kind, namespace, name);
            return Ok(Action::await_change());
        }
    };
    match ctx.mirror.mirror_and_rewrite(spec, &ctx.server_version).await {
        Ok(count) => log::info!("{} {}/{}: {} image(s) cached", kind, namespace, name, count),
        Err(failure) => {
            ctx.metrics
                .record_failure(&name, &namespace, &kind, &failure.image, failure.kind);
            return Err(failure.into());
        }
    }

    if let Err(source) = api.replace(&name, &PostParams::default(), &workload).await {
        ctx.metrics
            .record_failure(&name, &namespace, &kind, "", ErrorKind::SpecUpdate);
        return Err(ReconcileError::Update {
            name,
            namespace,
            kind,
            source,
        });
    }
    Ok(Action::await_change())
}

/// Every failure waits the same fixed delay before the next attempt
pub fn error_policy<K: Workload>(obj: Arc<K>, err: &ReconcileError, ctx: Arc<Context>) -> Action {
    log::error!(
        "{} {}/{}: {}",
        K::kind(&()),
        obj.namespace().unwrap_or_default(),
        obj.name_any(),
        err
    );
    Action::requeue(ctx.retry_delay)
}

/// Watch every object of one kind across the cluster until shutdown
pub async fn run<K: Workload>(ctx: Arc<Context>) {
    let api: Api<K> = Api::all(ctx.client.clone());
    log::info!("starting {} controller", K::kind(&()));
    Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => log::debug!("reconciled {}", obj),
                Err(err) => log::debug!("reconcile error: {}", err),
            }
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::get,
        Json, Router,
    };
    use image_clone::{errors::ImageError, metrics::encode_text, MirrorConfig};
    use k8s_openapi::api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{Container, PodSpec, PodTemplateSpec},
    };
    use kube::api::ObjectMeta;
    use prometheus_client::registry::Registry;
    use std::{collections::HashSet, sync::Mutex};

    /// Stands in for the API server's Deployment endpoints
    #[derive(Default)]
    struct FakeApi {
        deployment: Option<Deployment>,
        fail_get: bool,
        reject_replace: bool,
        requests: Vec<String>,
    }

    type Shared = Arc<Mutex<FakeApi>>;

    fn kube_status(code: StatusCode, reason: &str) -> Response {
        let body = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": reason,
            "reason": reason,
            "code": code.as_u16(),
        });
        (code, Json(body)).into_response()
    }

    async fn get_deployment(State(api): State<Shared>, Path((namespace, name)): Path<(String, String)>) -> Response {
        let mut api = api.lock().unwrap();
        api.requests.push(format!("GET {}/{}", namespace, name));
        if api.fail_get {
            return kube_status(StatusCode::INTERNAL_SERVER_ERROR, "InternalError");
        }
        match &api.deployment {
            Some(deployment) => Json(deployment.clone()).into_response(),
            None => kube_status(StatusCode::NOT_FOUND, "NotFound"),
        }
    }

    async fn replace_deployment(
        State(api): State<Shared>,
        Path((namespace, name)): Path<(String, String)>,
        Json(deployment): Json<Deployment>,
    ) -> Response {
        let mut api = api.lock().unwrap();
        api.requests.push(format!("PUT {}/{}", namespace, name));
        if api.reject_replace {
            return kube_status(StatusCode::CONFLICT, "Conflict");
        }
        api.deployment = Some(deployment.clone());
        Json(deployment).into_response()
    }

    fn deployment(namespace: &str, images: &[&str]) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("web".to_owned()),
                namespace: Some(namespace.to_owned()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        containers: images
                            .iter()
                            .map(|image| Container {
                                name: "app".to_owned(),
                                image: Some((*image).to_owned()),
                                ..Default::default()
                            })
                            .collect(),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// A context whose registry client refuses every registry, so any image
    /// that reaches the engine fails with `IMAGE_MANIFEST`
    fn setup(api: FakeApi) -> (Arc<Context>, Shared, Registry) {
        let api = Arc::new(Mutex::new(api));
        let router = Router::new()
            .route(
                "/apis/apps/v1/namespaces/{namespace}/deployments/{name}",
                get(get_deployment).put(replace_deployment),
            )
            .with_state(api.clone());
        let transport = RegistryClient::builder()
            .allow_only_connections_to(HashSet::new())
            .build()
            .unwrap();
        let metrics = Metrics::new();
        let mut registry = Registry::default();
        metrics.register(&mut registry);
        let ctx = Arc::new(Context {
            client: Client::new(router, "default"),
            mirror: Mirror::new(
                transport,
                MirrorConfig::new("docker.io/kube456").unwrap(),
                metrics.clone(),
            ),
            filter: NamespaceFilter::new(""),
            metrics,
            server_version: "v1.27.3".to_owned(),
            retry_delay: Duration::from_secs(300),
        });
        (ctx, api, registry)
    }

    /// The failure series carrying `err_type`, if any
    fn failure_line(registry: &Registry, err_type: &str) -> Option<String> {
        let label = format!("err_type=\"{}\"", err_type);
        encode_text(registry)
            .unwrap()
            .lines()
            .find(|line| line.starts_with("image_clone_failures_total{") && line.contains(&label))
            .map(str::to_owned)
    }

    #[tokio::test]
    async fn skipped_namespace_never_reaches_the_engine() {
        let skipped = deployment("kube-system", &["nginx:1"]);
        let (ctx, api, registry) = setup(FakeApi {
            deployment: Some(skipped.clone()),
            ..Default::default()
        });
        let action = reconcile(Arc::new(skipped.clone()), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
        assert_eq!(failure_line(&registry, "IMAGE_MANIFEST"), None);
        {
            let api = api.lock().unwrap();
            assert_eq!(api.requests, vec!["GET kube-system/web"]);
            assert_eq!(api.deployment.as_ref(), Some(&skipped));
        }

        let watched = deployment("default", &["nginx:1"]);
        let (ctx, _, registry) = setup(FakeApi {
            deployment: Some(watched.clone()),
            ..Default::default()
        });
        let err = reconcile(Arc::new(watched), ctx).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Clone(CloneFailure { kind: ErrorKind::ImageManifest, .. })));
        assert!(failure_line(&registry, "IMAGE_MANIFEST").is_some());
    }

    #[tokio::test]
    async fn deleted_object_is_left_alone() {
        let (ctx, api, registry) = setup(FakeApi::default());
        let gone = deployment("default", &["nginx:1"]);
        assert_eq!(reconcile(Arc::new(gone), ctx).await.unwrap(), Action::await_change());
        assert!(!encode_text(&registry).unwrap().contains("image_clone_failures_total{"));
        assert_eq!(api.lock().unwrap().requests, vec!["GET default/web"]);
    }

    #[tokio::test]
    async fn failed_get_is_counted() {
        let (ctx, _, registry) = setup(FakeApi {
            fail_get: true,
            ..Default::default()
        });
        let obj = deployment("default", &["nginx:1"]);
        let err = reconcile(Arc::new(obj), ctx).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Get { ref kind, .. } if kind == "Deployment"));

        let line = failure_line(&registry, "SPEC_GET").unwrap();
        for label in &[r#"name="web""#, r#"namespace="default""#, r#"kind="Deployment""#, r#"image="""#] {
            assert!(line.contains(label), "{} missing from {}", label, line);
        }
    }

    #[tokio::test]
    async fn rejected_replace_is_counted() {
        // no containers, so the engine succeeds without touching a registry
        let obj = deployment("apps", &[]);
        let (ctx, api, registry) = setup(FakeApi {
            deployment: Some(obj.clone()),
            reject_replace: true,
            ..Default::default()
        });
        let err = reconcile(Arc::new(obj), ctx).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Update { ref name, ref namespace, ref kind, .. }
                if name == "web" && namespace == "apps" && kind == "Deployment"
        ));
        assert_eq!(api.lock().unwrap().requests, vec!["GET apps/web", "PUT apps/web"]);

        let line = failure_line(&registry, "SPEC_UPDATE").unwrap();
        for label in &[r#"name="web""#, r#"namespace="apps""#, r#"kind="Deployment""#, r#"image="""#] {
            assert!(line.contains(label), "{} missing from {}", label, line);
        }
        assert_eq!(failure_line(&registry, "SPEC_GET"), None);
    }

    #[tokio::test]
    async fn every_failure_waits_the_retry_delay() {
        let (ctx, _, _) = setup(FakeApi::default());
        let obj = Arc::new(deployment("default", &["nginx:"]));
        let failure = CloneFailure::new(
            "nginx:",
            ErrorKind::ImageReference,
            ImageError::InvalidReferenceFormat("nginx:".to_owned()),
        );
        let action = error_policy(obj, &ReconcileError::from(failure), ctx.clone());
        assert_eq!(action, Action::requeue(ctx.retry_delay));
        assert_eq!(action, Action::requeue(Duration::from_secs(300)));
    }

    #[test]
    fn error_messages() {
        let failure = CloneFailure::new(
            "nginx:",
            ErrorKind::ImageReference,
            ImageError::InvalidReferenceFormat("nginx:".to_owned()),
        );
        assert_eq!(
            ReconcileError::from(failure).to_string(),
            "error occurred cloning image nginx:, reason: IMAGE_REFERENCE"
        );
    }
}
