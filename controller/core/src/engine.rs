use crate::{annotations, Annotations, Decision, Operation};
use serde::Serialize;
use serde_json::value::RawValue;
use std::{fmt, time::Duration};
use thiserror::Error;
use tracing::{debug, trace};

/// Renders a decision for an admission request.
#[async_trait::async_trait]
pub trait DecisionEngine {
    async fn decide(&self, req: &Request) -> Decision;
}

/// Produces the annotations of the objects an admission request refers to.
#[async_trait::async_trait]
pub trait ResolveObject {
    /// Decodes an object carried inline in the request.
    fn decode(&self, raw: &RawValue) -> Result<Annotations, ResolveError>;

    /// Fetches the stored state of an object.
    async fn get(&self, key: &ObjectKey) -> Result<Annotations, ResolveError>;
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0} not found")]
    NotFound(ObjectKey),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Fetch(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub uid: String,

    /// The requested operation as named by the client. Names outside of
    /// [`Operation`] are denied.
    pub operation: String,

    pub object: ObjectSource,

    /// The prior state of the object. Only consulted on update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_object: Option<ObjectSource>,
}

/// Where an object's state is read from.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectSource {
    /// A serialized object carried in the request body.
    Inline(Box<RawValue>),

    /// A stored object that must be fetched.
    ByKey(ObjectKey),
}

/// Identifies a stored object by its resource type, namespace, and name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectKey {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespace: Option<String>,
    pub name: String,
}

/// Permits operations listed in an object's
/// [`ALLOWED_OPERATIONS`](annotations::ALLOWED_OPERATIONS) annotation.
#[derive(Clone, Debug)]
pub struct AllowedOperations<R> {
    resolver: R,
}

// === impl AllowedOperations ===

#[async_trait::async_trait]
impl<R> DecisionEngine for AllowedOperations<R>
where
    R: ResolveObject + Send + Sync,
{
    async fn decide(&self, req: &Request) -> Decision {
        match self.evaluate(req).await {
            Ok(decision) | Err(decision) => decision,
        }
    }
}

impl<R> AllowedOperations<R>
where
    R: ResolveObject + Send + Sync,
{
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Evaluates a request, short-circuiting with `Err` as soon as a terminal
    /// decision is reached.
    async fn evaluate(&self, req: &Request) -> Result<Decision, Decision> {
        let op = req.operation.parse::<Operation>().map_err(Decision::denied)?;

        let annotations = self.resolve(&req.object, "object").await?;
        trace!(?annotations);
        annotations::check_unknown(&annotations).map_err(Decision::denied)?;

        let ops = annotations::allowed_operations(&annotations).map_err(Decision::denied)?;
        if op != Operation::Update {
            if ops.contains(op) {
                return Ok(Decision::allowed(op));
            }
            return Ok(Decision::not_permitted(op, ops.operations()));
        }

        // An update is permitted if either the prior or the proposed state of
        // the object permits it, so that the policy itself may be changed.
        // Only the proposed object's annotations are checked for unknown
        // directives.
        let prior = match req.old_object.as_ref() {
            Some(source) => self.resolve(source, "prior object").await?,
            None => {
                return Err(Decision::bad_request(
                    "update request is missing the prior object".to_string(),
                ))
            }
        };
        let prior_ops = annotations::allowed_operations(&prior).map_err(Decision::denied)?;
        if prior_ops.contains(op) || ops.contains(op) {
            return Ok(Decision::allowed(op));
        }

        Ok(Decision::not_permitted(
            op,
            prior_ops.operations().iter().chain(ops.operations()),
        ))
    }

    async fn resolve(&self, source: &ObjectSource, what: &str) -> Result<Annotations, Decision> {
        match source {
            ObjectSource::Inline(raw) => self.resolver.decode(raw).map_err(|error| {
                debug!(%error, "Failed to decode {what}");
                Decision::bad_request(format!("decoding {what}: {error}"))
            }),
            ObjectSource::ByKey(key) => self.resolver.get(key).await.map_err(|error| {
                debug!(%error, %key, "Failed to get {what}");
                Decision::bad_request(format!("getting {what} {key}: {error}"))
            }),
        }
    }
}

// === impl ObjectKey ===

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            group,
            kind,
            namespace,
            name,
            ..
        } = self;
        if group.is_empty() {
            write!(f, "{kind}")?;
        } else {
            write!(f, "{kind}.{group}")?;
        }
        match namespace {
            Some(ns) => write!(f, " {ns}/{name}"),
            None => write!(f, " {name}"),
        }
    }
}
