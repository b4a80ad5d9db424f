use kube::{
    api::Api,
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use resource_protection_core::{
    engine::{ResolveError, ResolveObject},
    Annotations, ObjectKey,
};
use serde_json::value::RawValue;
use tokio::time;
use tracing::{debug, instrument};

/// Resolves objects against the Kubernetes API.
#[derive(Clone)]
pub struct KubeResolver {
    client: Client,
    timeout: time::Duration,
}

impl KubeResolver {
    pub fn new(client: Client, timeout: time::Duration) -> Self {
        Self { client, timeout }
    }

    fn api(&self, key: &ObjectKey) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(&key.group, &key.version, &key.kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, &key.plural);
        match key.namespace.as_deref() {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

#[async_trait::async_trait]
impl ResolveObject for KubeResolver {
    fn decode(&self, raw: &RawValue) -> Result<Annotations, ResolveError> {
        decode(raw)
    }

    #[instrument(skip_all, fields(%key))]
    async fn get(&self, key: &ObjectKey) -> Result<Annotations, ResolveError> {
        let api = self.api(key);
        let obj = time::timeout(self.timeout, api.get_opt(&key.name))
            .await
            .map_err(|_| ResolveError::Timeout(self.timeout))?
            .map_err(|error| ResolveError::Fetch(error.into()))?
            .ok_or_else(|| ResolveError::NotFound(key.clone()))?;
        debug!(version = ?obj.metadata.resource_version, "Fetched object");
        Ok(obj.metadata.annotations.unwrap_or_default())
    }
}

/// Decodes a serialized Kubernetes object and returns its annotations.
pub(crate) fn decode(raw: &RawValue) -> Result<Annotations, ResolveError> {
    let obj = serde_json::from_str::<DynamicObject>(raw.get())?;
    Ok(obj.metadata.annotations.unwrap_or_default())
}
