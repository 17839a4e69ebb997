//! Request adapter exposing a BindingRegistry over resource verbs
//!
//! Bindings are write-once and point-lookup only: create, get and delete
//! map onto the registry, while update and list are always refused so the
//! network layout of other tenants cannot be enumerated.

use std::sync::Arc;

use overlay_api::NetBindingSpec;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::registry::BindingRegistry;
use crate::{CoreError, Result};

/// Outcome of a mutating request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Status {
    /// "Success" or "Failure"
    pub status: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    pub fn success() -> Self {
        Self {
            status: "Success".to_string(),
            code: 200,
            message: None,
        }
    }

    pub fn failure(error: &CoreError) -> Self {
        Self {
            status: "Failure".to_string(),
            code: error.status_code(),
            message: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "Success"
    }

    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(e) => Self::failure(&e),
        }
    }
}

/// A request against the netbindings resource
#[derive(Clone, Debug, PartialEq)]
pub enum BindingRequest {
    Create { namespace: String, body: Value },
    Get { namespace: String, pod_id: String },
    Update { namespace: String, pod_id: String, body: Value },
    Delete { namespace: String, pod_id: String },
    List { namespace: String },
}

impl BindingRequest {
    pub fn verb(&self) -> &'static str {
        match self {
            BindingRequest::Create { .. } => "create",
            BindingRequest::Get { .. } => "get",
            BindingRequest::Update { .. } => "update",
            BindingRequest::Delete { .. } => "delete",
            BindingRequest::List { .. } => "list",
        }
    }
}

/// Result of a successfully dispatched request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BindingResponse {
    Status(Status),
    Binding(NetBindingSpec),
}

/// Verb handler for NetBindings
pub struct NetBindingRest {
    registry: Arc<dyn BindingRegistry>,
}

impl NetBindingRest {
    pub fn new(registry: Arc<dyn BindingRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatch a request to the matching verb
    pub async fn handle(&self, request: BindingRequest) -> Result<BindingResponse> {
        debug!("Handling netbinding {} request", request.verb());
        match request {
            BindingRequest::Create { namespace, body } => {
                self.create(&namespace, body).await.map(BindingResponse::Status)
            }
            BindingRequest::Get { namespace, pod_id } => {
                self.get(&namespace, &pod_id).await.map(BindingResponse::Binding)
            }
            BindingRequest::Delete { namespace, pod_id } => {
                self.delete(&namespace, &pod_id).await.map(BindingResponse::Status)
            }
            BindingRequest::Update { .. } => self.update().map(BindingResponse::Status),
            BindingRequest::List { .. } => self
                .list()
                .map(|_| BindingResponse::Status(Status::success())),
        }
    }

    /// Apply the binding carried by `body`.
    ///
    /// A body that is not a binding is an error; a registry failure is
    /// reported as a failure status.
    pub async fn create(&self, namespace: &str, body: Value) -> Result<Status> {
        let binding = decode_binding(namespace, body)?;
        let result = self.registry.apply(&binding).await;
        if let Err(e) = &result {
            warn!("Error applying netbinding {}: {}", binding.key(), e);
        }
        Ok(Status::from_result(result))
    }

    pub async fn get(&self, namespace: &str, pod_id: &str) -> Result<NetBindingSpec> {
        self.registry.get(namespace, pod_id).await
    }

    pub async fn delete(&self, namespace: &str, pod_id: &str) -> Result<Status> {
        Ok(Status::from_result(self.registry.delete(namespace, pod_id).await))
    }

    /// NetBindings may not be changed
    pub fn update(&self) -> Result<Status> {
        Err(CoreError::Unsupported("changed"))
    }

    /// NetBindings may not be listed
    pub fn list(&self) -> Result<Vec<NetBindingSpec>> {
        Err(CoreError::Unsupported("listed"))
    }
}

/// Accept either a bare binding or an object wrapping it under `spec`
fn decode_binding(namespace: &str, body: Value) -> Result<NetBindingSpec> {
    let spec = match body {
        Value::Object(mut object) if object.contains_key("spec") => {
            object.remove("spec").unwrap_or(Value::Null)
        }
        other => other,
    };
    let mut binding: NetBindingSpec = serde_json::from_value(spec)
        .map_err(|e| CoreError::InvalidObject(format!("incorrect type: {}", e)))?;

    if binding.namespace.is_empty() {
        binding.namespace = namespace.to_string();
    } else if binding.namespace != namespace {
        return Err(CoreError::InvalidObject(format!(
            "namespace {} does not match request namespace {}",
            binding.namespace, namespace
        )));
    }
    if binding.pod_id.is_empty() {
        return Err(CoreError::InvalidObject("pod_id is required".to_string()));
    }
    Ok(binding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use overlay_api::Vnid;
    use std::sync::Mutex;

    type ApplyFn = Box<dyn Fn(&NetBindingSpec) -> Result<()> + Send + Sync>;

    /// Registry whose behaviour is supplied by the test
    struct MockRegistry {
        on_apply: ApplyFn,
        applied: Mutex<Vec<NetBindingSpec>>,
    }

    impl MockRegistry {
        fn new(on_apply: impl Fn(&NetBindingSpec) -> Result<()> + Send + Sync + 'static) -> Self {
            Self {
                on_apply: Box::new(on_apply),
                applied: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BindingRegistry for MockRegistry {
        async fn apply(&self, binding: &NetBindingSpec) -> Result<()> {
            self.applied.lock().unwrap().push(binding.clone());
            (self.on_apply)(binding)
        }

        async fn get(&self, namespace: &str, pod_id: &str) -> Result<NetBindingSpec> {
            Err(CoreError::BindingNotFound(format!("{}/{}", namespace, pod_id)))
        }

        async fn delete(&self, _namespace: &str, _pod_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn binding() -> NetBindingSpec {
        NetBindingSpec {
            pod_id: "foo".to_string(),
            namespace: "default".to_string(),
            ip_address: "10.10.1.2".to_string(),
            mac_address: "10:10:10:a0:a0:a0".to_string(),
            vnid: Vnid(10),
            bridge_port: 11,
            vtep: String::new(),
        }
    }

    fn body() -> Value {
        serde_json::to_value(binding()).unwrap()
    }

    #[tokio::test]
    async fn test_update_and_list_are_unsupported() {
        let rest = NetBindingRest::new(Arc::new(MockRegistry::new(|_| Ok(()))));

        let update = BindingRequest::Update {
            namespace: "default".to_string(),
            pod_id: "foo".to_string(),
            body: serde_json::json!({"ip_address": "new IP Address"}),
        };
        assert!(matches!(rest.handle(update).await, Err(CoreError::Unsupported("changed"))));

        let list = BindingRequest::List {
            namespace: "default".to_string(),
        };
        assert!(matches!(rest.handle(list).await, Err(CoreError::Unsupported("listed"))));
        assert!(rest.list().is_err());
    }

    #[tokio::test]
    async fn test_create_rejects_wrong_object() {
        let registry = Arc::new(MockRegistry::new(|_| Ok(())));
        let rest = NetBindingRest::new(registry.clone());

        let pod = serde_json::json!({"kind": "Pod", "metadata": {"name": "foo"}});
        let err = rest.create("default", pod).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidObject(_)));
        assert!(registry.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_checks_namespace() {
        let rest = NetBindingRest::new(Arc::new(MockRegistry::new(|_| Ok(()))));
        let err = rest.create("other", body()).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidObject(_)));
    }

    #[tokio::test]
    async fn test_create_reports_registry_outcome() {
        let cases = [
            (Err("no pod bar"), Status {
                status: "Failure".to_string(),
                code: 500,
                message: Some("Store error: no pod bar".to_string()),
            }),
            (Ok(()), Status::success()),
        ];

        for (outcome, expected) in cases {
            let registry = Arc::new(MockRegistry::new(move |b| {
                assert_eq!(b, &binding());
                outcome.map_err(|msg| CoreError::Store(msg.to_string()))
            }));
            let rest = NetBindingRest::new(registry.clone());

            let status = rest.create("default", body()).await.unwrap();
            assert_eq!(status, expected);
            assert_eq!(registry.applied.lock().unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_create_accepts_wrapped_spec_and_fills_namespace() {
        let registry = Arc::new(MockRegistry::new(|_| Ok(())));
        let rest = NetBindingRest::new(registry.clone());

        let mut spec = body();
        spec["namespace"] = Value::String(String::new());
        let wrapped = serde_json::json!({"apiVersion": "overlay.io/v1alpha1", "kind": "NetBinding", "spec": spec});

        let status = rest.create("default", wrapped).await.unwrap();
        assert!(status.is_success());
        assert_eq!(registry.applied.lock().unwrap()[0], binding());
    }

    #[tokio::test]
    async fn test_get_and_delete_dispatch() {
        let rest = NetBindingRest::new(Arc::new(MockRegistry::new(|_| Ok(()))));

        let get = BindingRequest::Get {
            namespace: "default".to_string(),
            pod_id: "foo".to_string(),
        };
        let err = rest.handle(get).await.unwrap_err();
        assert_eq!(err.status_code(), 404);

        let delete = BindingRequest::Delete {
            namespace: "default".to_string(),
            pod_id: "foo".to_string(),
        };
        assert_eq!(
            rest.handle(delete).await.unwrap(),
            BindingResponse::Status(Status::success())
        );
    }
}
