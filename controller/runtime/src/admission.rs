use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::core::{DynamicObject, Status, TypeMeta};
use resource_protection_core::{Decision, DecisionEngine, ObjectKey, ObjectSource};
use serde::Deserialize;
use serde_json::value::RawValue;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// The path on which admission reviews are served.
pub const ENDPOINT: &str = "/allowed-operations";

/// Serves admission reviews, rendering each request's decision through an
/// engine.
#[derive(Debug)]
pub struct Admission<E> {
    engine: Arc<E>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

/// An `admission.k8s.io` review.
///
/// The operation is decoded as a plain string so that unrecognized operations
/// are denied rather than rejected as malformed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Review {
    #[serde(flatten)]
    types: TypeMeta,
    request: Option<ReviewRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    uid: String,
    kind: Kind,
    resource: Resource,
    #[serde(default)]
    sub_resource: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    name: String,
    operation: String,
    #[serde(default)]
    object: Option<Box<RawValue>>,
    #[serde(default)]
    old_object: Option<Box<RawValue>>,
}

#[derive(Debug, Deserialize)]
struct Kind {
    kind: String,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(default)]
    group: String,
    version: String,
    resource: String,
}

// === impl Admission ===

impl<E> Clone for Admission<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<E> tower::Service<Request<hyper::body::Incoming>> for Admission<E>
where
    E: DecisionEngine + Send + Sync + 'static,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != ENDPOINT {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            let bytes = req.into_body().collect().await?.to_bytes();
            let rsp = admission.review(&bytes).await;
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl<E> Admission<E>
where
    E: DecisionEngine + Send + Sync,
{
    pub fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Decodes a serialized review and renders its response.
    pub async fn review(&self, body: &[u8]) -> AdmissionResponse {
        let Review { types, request } = match serde_json::from_slice(body) {
            Ok(review) => review,
            Err(error) => {
                warn!(%error, "Failed to parse request body");
                return AdmissionResponse::invalid(error);
            }
        };

        let Some(req) = request else {
            warn!("Invalid admission request");
            return AdmissionResponse::invalid("missing request");
        };
        debug!(uid = %req.uid, op = %req.operation, ?req.namespace, %req.name);

        let uid = req.uid.clone();
        let ns = req.namespace.clone().unwrap_or_default();
        let name = req.name.clone();
        let kind = req.kind.kind.clone();

        let request = decision_request(req);
        let decision = self.engine.decide(&request).await;
        match &decision {
            Decision::Allowed { .. } => debug!(%ns, %name, %kind, "Allowed"),
            Decision::Denied { message, .. } => {
                info!(error = %message, %ns, %name, %kind, "Denied")
            }
            Decision::Error { code, message } => {
                warn!(%code, error = %message, %ns, %name, %kind, "Failed to evaluate request")
            }
        }

        let mut rsp = response(decision);
        rsp.types = types;
        rsp.uid = uid;
        rsp
    }
}

/// Builds the engine's view of a review request.
///
/// Objects missing from the request body are read from the API. Connect
/// requests to a subresource carry connection options, and updates to a
/// subresource other than `status` (e.g. `scale`) carry a different kind of
/// object, so in both cases the parent object is fetched instead.
fn decision_request(req: ReviewRequest) -> resource_protection_core::Request {
    let ReviewRequest {
        uid,
        kind,
        resource,
        sub_resource,
        namespace,
        name,
        operation,
        object,
        old_object,
    } = req;

    let key = ObjectKey {
        group: resource.group,
        version: resource.version,
        kind: kind.kind,
        plural: resource.resource,
        namespace: namespace.filter(|ns| !ns.is_empty()),
        name,
    };
    trace!(?key);

    let is_update = operation == "UPDATE";
    let reads_parent = sub_resource.as_deref().is_some_and(|sub| match operation.as_str() {
        "CONNECT" => true,
        "UPDATE" => sub != "status",
        _ => false,
    });
    let object = match object {
        Some(raw) if !reads_parent => ObjectSource::Inline(raw),
        _ => ObjectSource::ByKey(key.clone()),
    };
    let old_object = match old_object {
        Some(raw) if !reads_parent => Some(ObjectSource::Inline(raw)),
        _ if is_update => Some(ObjectSource::ByKey(key)),
        _ => None,
    };

    resource_protection_core::Request {
        uid,
        operation,
        object,
        old_object,
    }
}

fn response(decision: Decision) -> AdmissionResponse {
    match decision {
        Decision::Allowed { message } => allowed(message),
        Decision::Denied { message, .. } => {
            let mut rsp = AdmissionResponse::invalid(message);
            rsp.result.code = http::StatusCode::FORBIDDEN.as_u16();
            rsp.result.reason = "Forbidden".to_string();
            rsp
        }
        Decision::Error { code, message } => {
            let mut rsp = AdmissionResponse::invalid(message);
            rsp.result.code = code;
            rsp.result.reason = "BadRequest".to_string();
            rsp
        }
    }
}

/// Builds a successful response. `AdmissionResponse` is only constructible
/// from a typed request or as a failure, so every field that marks the
/// response as a success is overwritten.
fn allowed(message: String) -> AdmissionResponse {
    let mut rsp = AdmissionResponse::invalid(&message);
    rsp.allowed = true;
    rsp.result = Status {
        message,
        code: http::StatusCode::OK.as_u16(),
        ..Status::success()
    };
    rsp
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}
