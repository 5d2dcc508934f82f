//! Key-value store node: the reference multi-operation handler.
//!
//! Exposes a `(resource, operation)` matrix over a process-local store:
//! resource `record` with `get`, `set`, `delete`, and `list`. Clients are
//! checked out of a [`Broker`] keyed by the `namespace` parameter, so the
//! node exercises the same acquire/release discipline a database handler
//! would, and broker eviction is observable through
//! [`KvHandler::broker`].

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use cascade_core::HandlerKey;
use cascade_handler::{
    CredentialPayload, FieldDef, FieldKind, HandlerError, HandlerMetadata, HandlerOutput,
    NodeContext, OperationDef, OperationHandler, ResourceDef,
};
use cascade_resource::{Broker, BrokerConfig, PooledResource, ResourceError};
use cascade_value::Value;
use chrono::SecondsFormat;
use dashmap::DashMap;
use serde::Serialize;

/// Process-wide backing store, namespaced. The broker pools the *clients*;
/// data outlives them the way a database outlives its connections.
fn store() -> &'static DashMap<(String, String), Value> {
    static STORE: OnceLock<DashMap<(String, String), Value>> = OnceLock::new();
    STORE.get_or_init(DashMap::new)
}

/// Connection parameters: pools are keyed by namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KvParams {
    /// The namespace this client addresses.
    pub namespace: String,
}

/// A checked-out store client.
#[derive(Debug)]
pub struct KvClient {
    namespace: String,
}

#[async_trait]
impl PooledResource for KvClient {
    type Params = KvParams;

    async fn create(params: &KvParams) -> Result<Self, ResourceError> {
        Ok(Self {
            namespace: params.namespace.clone(),
        })
    }
}

impl KvClient {
    fn get(&self, key: &str) -> Option<Value> {
        store()
            .get(&(self.namespace.clone(), key.to_owned()))
            .map(|entry| entry.clone())
    }

    fn set(&self, key: &str, value: Value) {
        store().insert((self.namespace.clone(), key.to_owned()), value);
    }

    fn delete(&self, key: &str) -> bool {
        store()
            .remove(&(self.namespace.clone(), key.to_owned()))
            .is_some()
    }

    fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = store()
            .iter()
            .filter(|entry| entry.key().0 == self.namespace)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort_unstable();
        keys
    }
}

/// The `core.kv` multi-operation handler.
pub struct KvHandler {
    meta: HandlerMetadata,
    resources: Vec<ResourceDef>,
    record_ops: Vec<OperationDef>,
    broker: Arc<Broker<KvClient>>,
}

fn key_field() -> FieldDef {
    FieldDef::new("key", "Key", FieldKind::String).required()
}

fn namespace_field() -> FieldDef {
    FieldDef::new("namespace", "Namespace", FieldKind::String)
        .with_default(serde_json::json!("default"))
}

impl KvHandler {
    /// Create the handler with its own broker.
    #[must_use]
    pub fn new() -> Self {
        Self::with_broker(Broker::new(BrokerConfig::default()))
    }

    /// Create the handler over an existing broker (test hook).
    #[must_use]
    pub fn with_broker(broker: Arc<Broker<KvClient>>) -> Self {
        Self {
            meta: HandlerMetadata::new(
                HandlerKey::new("core.kv").expect("static key"),
                "Key-Value Store",
                "Reads and writes records in a namespaced key-value store",
            )
            .with_category("storage")
            .asynchronous(),
            resources: vec![ResourceDef::new("record", "A stored key-value record")],
            record_ops: vec![
                OperationDef::new("get", "Get")
                    .with_description("Read the value at a key")
                    .with_fields(vec![key_field(), namespace_field()])
                    .with_output_description("{ value }"),
                OperationDef::new("set", "Set")
                    .with_description("Write a value at a key")
                    .with_fields(vec![
                        key_field(),
                        namespace_field(),
                        FieldDef::new("value", "Value", FieldKind::String).required(),
                    ])
                    .with_output_description("{ key, updatedAt }"),
                OperationDef::new("delete", "Delete")
                    .with_description("Remove a key")
                    .with_fields(vec![key_field(), namespace_field()])
                    .with_output_description("{ deleted }"),
                OperationDef::new("list", "List")
                    .with_description("List keys in the namespace")
                    .with_fields(vec![namespace_field()])
                    .with_output_description("{ keys }"),
            ],
            broker,
        }
    }

    /// The broker backing this handler; exposes pool creation counts.
    #[must_use]
    pub fn broker(&self) -> &Arc<Broker<KvClient>> {
        &self.broker
    }

    async fn client(
        &self,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<cascade_resource::Guard<KvClient>, HandlerError> {
        let namespace = params
            .get("namespace")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("default")
            .to_owned();
        self.broker
            .acquire(&KvParams { namespace })
            .await
            .map_err(|e| match e {
                ResourceError::Exhausted(_) => HandlerError::resource_exhausted(e.to_string()),
                other => HandlerError::runtime(other.to_string()),
            })
    }
}

impl Default for KvHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OperationHandler for KvHandler {
    fn metadata(&self) -> &HandlerMetadata {
        &self.meta
    }

    fn resources(&self) -> &[ResourceDef] {
        &self.resources
    }

    fn operations(&self, resource: &str) -> &[OperationDef] {
        if resource == "record" {
            &self.record_ops
        } else {
            &[]
        }
    }

    async fn execute_operation(
        &self,
        ctx: &NodeContext,
        _resource: &str,
        operation: &str,
        _credential: Option<CredentialPayload>,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<HandlerOutput, HandlerError> {
        ctx.check_cancelled()?;
        let client = self.client(params).await?;

        let rendered_key = match ctx.render_config("key") {
            Some(rendered) => Some(rendered?.to_string()),
            None => None,
        };

        let mut out = cascade_value::Object::new();
        match operation {
            "get" => {
                let key = rendered_key
                    .ok_or_else(|| HandlerError::config("missing `key` parameter"))?;
                out.insert("value".into(), client.get(&key).unwrap_or(Value::Null));
            }
            "set" => {
                let key = rendered_key
                    .ok_or_else(|| HandlerError::config("missing `key` parameter"))?;
                let value = ctx
                    .render_config("value")
                    .ok_or_else(|| HandlerError::config("missing `value` parameter"))??;
                client.set(&key, value);
                out.insert("key".into(), Value::String(key));
                // Write time comes from the context clock, so tests can run
                // the store against a fixed one.
                out.insert(
                    "updatedAt".into(),
                    Value::String(ctx.now().to_rfc3339_opts(SecondsFormat::Millis, true)),
                );
            }
            "delete" => {
                let key = rendered_key
                    .ok_or_else(|| HandlerError::config("missing `key` parameter"))?;
                out.insert("deleted".into(), Value::Bool(client.delete(&key)));
            }
            "list" => {
                out.insert(
                    "keys".into(),
                    Value::List(client.list().into_iter().map(Value::String).collect()),
                );
            }
            other => {
                return Err(HandlerError::config(format!("unknown operation `{other}`")));
            }
        }
        Ok(HandlerOutput::object(out))
    }
}
