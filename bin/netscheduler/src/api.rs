//! HTTP surface of the netbindings resource

use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use overlay_api::v1alpha1::{API_GROUP, API_VERSION, NET_BINDING_PLURAL};
use overlay_core::{BindingRequest, BindingResponse, CoreError, NetBindingRest, Status};
use overlay_telemetry::{telemetry_response, text_response, HttpBody};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::metrics::SchedulerMetrics;

/// Target of a netbindings request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Collection { namespace: String },
    Item { namespace: String, pod_id: String },
}

impl Route {
    /// Match `/apis/overlay.io/v1alpha1/namespaces/{ns}/netbindings[/{pod}]`
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["apis", group, version, "namespaces", namespace, plural, rest @ ..]
                if *group == API_GROUP
                    && *version == API_VERSION
                    && *plural == NET_BINDING_PLURAL
                    && !namespace.is_empty() =>
            {
                match rest {
                    [] => Some(Route::Collection {
                        namespace: namespace.to_string(),
                    }),
                    [pod_id] if !pod_id.is_empty() => Some(Route::Item {
                        namespace: namespace.to_string(),
                        pod_id: pod_id.to_string(),
                    }),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

pub struct ApiState {
    pub rest: NetBindingRest,
    pub metrics: Arc<SchedulerMetrics>,
}

/// Entry point for every HTTP request of the scheduler
pub async fn handle(req: Request<Incoming>, state: Arc<ApiState>) -> Response<HttpBody> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("Error reading request body: {}", e);
            return text_response(StatusCode::BAD_REQUEST, "Failed to read body\n");
        }
    };
    dispatch(&state, &parts.method, parts.uri.path(), body).await
}

pub async fn dispatch(
    state: &ApiState,
    method: &Method,
    path: &str,
    body: Bytes,
) -> Response<HttpBody> {
    debug!("{} {}", method, path);

    if let Some(response) = telemetry_response(method, path, &state.metrics.registry) {
        return response;
    }

    let Some(route) = Route::parse(path) else {
        return text_response(StatusCode::NOT_FOUND, "Not Found\n");
    };

    let request = match build_request(method, route, &body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    state
        .metrics
        .rest_requests_total
        .with_label_values(&[request.verb()])
        .inc();

    match state.rest.handle(request).await {
        Ok(BindingResponse::Status(status)) => {
            let code = StatusCode::from_u16(status.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            json_response(code, &status)
        }
        Ok(BindingResponse::Binding(binding)) => json_response(StatusCode::OK, &binding),
        Err(e) => error_response(&e),
    }
}

fn build_request(
    method: &Method,
    route: Route,
    body: &Bytes,
) -> Result<BindingRequest, Response<HttpBody>> {
    let request = match (method, route) {
        (&Method::POST, Route::Collection { namespace }) => BindingRequest::Create {
            namespace,
            body: parse_body(body)?,
        },
        (&Method::GET, Route::Collection { namespace }) => BindingRequest::List { namespace },
        (&Method::GET, Route::Item { namespace, pod_id }) => {
            BindingRequest::Get { namespace, pod_id }
        }
        (&Method::DELETE, Route::Item { namespace, pod_id }) => {
            BindingRequest::Delete { namespace, pod_id }
        }
        (&Method::PUT | &Method::PATCH, Route::Item { namespace, pod_id }) => {
            BindingRequest::Update {
                namespace,
                pod_id,
                body: parse_body(body).unwrap_or(Value::Null),
            }
        }
        _ => {
            return Err(text_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "Method Not Allowed\n",
            ))
        }
    };
    Ok(request)
}

fn parse_body(body: &Bytes) -> Result<Value, Response<HttpBody>> {
    serde_json::from_slice(body).map_err(|e| {
        error_response(&CoreError::InvalidObject(format!("malformed body: {}", e)))
    })
}

fn error_response(error: &CoreError) -> Response<HttpBody> {
    let code = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if code.is_server_error() {
        warn!("NetBinding request failed: {}", error);
    }
    json_response(code, &Status::failure(error))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<HttpBody> {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut response = text_response(status, bytes);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            warn!("Failed to encode response: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_api::{NetBindingSpec, Vnid};
    use overlay_core::MemoryStore;

    const COLLECTION: &str = "/apis/overlay.io/v1alpha1/namespaces/team-a/netbindings";
    const ITEM: &str = "/apis/overlay.io/v1alpha1/namespaces/team-a/netbindings/web-0";

    fn state() -> ApiState {
        ApiState {
            rest: NetBindingRest::new(Arc::new(MemoryStore::new())),
            metrics: Arc::new(SchedulerMetrics::new().unwrap()),
        }
    }

    fn binding() -> NetBindingSpec {
        NetBindingSpec {
            pod_id: "web-0".to_string(),
            namespace: "team-a".to_string(),
            ip_address: "10.246.1.3".to_string(),
            mac_address: "10:20:30:00:00:01".to_string(),
            vnid: Vnid::from_namespace("team-a"),
            bridge_port: 11,
            vtep: String::new(),
        }
    }

    async fn body_json(response: Response<HttpBody>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_route_parse() {
        assert_eq!(
            Route::parse(COLLECTION),
            Some(Route::Collection {
                namespace: "team-a".to_string()
            })
        );
        assert_eq!(
            Route::parse(ITEM),
            Some(Route::Item {
                namespace: "team-a".to_string(),
                pod_id: "web-0".to_string()
            })
        );
        assert_eq!(Route::parse("/apis/overlay.io/v1beta1/namespaces/a/netbindings"), None);
        assert_eq!(Route::parse("/apis/overlay.io/v1alpha1/namespaces/a/pods"), None);
        assert_eq!(Route::parse(&format!("{}/extra", ITEM)), None);
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let state = state();
        let body = Bytes::from(serde_json::to_vec(&binding()).unwrap());

        let created = dispatch(&state, &Method::POST, COLLECTION, body).await;
        assert_eq!(created.status(), StatusCode::OK);
        assert_eq!(body_json(created).await["status"], "Success");

        let fetched = dispatch(&state, &Method::GET, ITEM, Bytes::new()).await;
        assert_eq!(fetched.status(), StatusCode::OK);
        let fetched: NetBindingSpec = serde_json::from_value(body_json(fetched).await).unwrap();
        assert_eq!(fetched, binding());

        let deleted = dispatch(&state, &Method::DELETE, ITEM, Bytes::new()).await;
        assert_eq!(deleted.status(), StatusCode::OK);

        let missing = dispatch(&state, &Method::GET, ITEM, Bytes::new()).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_and_list_rejected() {
        let state = state();

        let list = dispatch(&state, &Method::GET, COLLECTION, Bytes::new()).await;
        assert_eq!(list.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(list).await["message"], "NetBindings may not be listed");

        let update = dispatch(&state, &Method::PUT, ITEM, Bytes::from_static(b"{}")).await;
        assert_eq!(update.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(update).await["message"], "NetBindings may not be changed");

        let verbs = &state.metrics.rest_requests_total;
        assert_eq!(verbs.with_label_values(&["list"]).get(), 1);
        assert_eq!(verbs.with_label_values(&["update"]).get(), 1);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let state = state();

        let malformed = dispatch(&state, &Method::POST, COLLECTION, Bytes::from_static(b"{")).await;
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

        let unknown = dispatch(&state, &Method::GET, "/apis/other", Bytes::new()).await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let post_item = dispatch(&state, &Method::POST, ITEM, Bytes::new()).await;
        assert_eq!(post_item.status(), StatusCode::METHOD_NOT_ALLOWED);

        let health = dispatch(&state, &Method::GET, "/healthz", Bytes::new()).await;
        assert_eq!(health.status(), StatusCode::OK);
    }
}
