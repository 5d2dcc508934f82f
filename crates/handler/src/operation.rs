//! Multi-operation sub-protocol.
//!
//! Integration handlers (databases, HTTP services, SaaS APIs) expose a
//! matrix of `(resource, operation)` pairs, each with its own field set.
//! They implement [`OperationHandler`] and register through
//! [`OperationAdapter`], which implements the uniform [`Handler`] contract
//! by routing on the `resource` and `operation` fields of the node config.

use async_trait::async_trait;
use cascade_core::CredentialId;
use serde::{Deserialize, Serialize};

use crate::context::NodeContext;
use crate::credential::CredentialPayload;
use crate::error::HandlerError;
use crate::handler::Handler;
use crate::metadata::HandlerMetadata;
use crate::result::HandlerOutput;
use crate::schema::{FieldDef, Schema, Violation};

/// Config keys the adapter consumes before dispatch.
const RESOURCE_FIELD: &str = "resource";
const OPERATION_FIELD: &str = "operation";
const CREDENTIAL_FIELD: &str = "credentialId";

/// One addressable resource of an integration (e.g. `"record"`, `"table"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDef {
    /// Resource name used in node config.
    pub name: String,
    /// Short description.
    pub description: String,
}

impl ResourceDef {
    /// Create a resource definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// One operation on a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDef {
    /// Operation name used in node config.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Short description.
    pub description: String,
    /// Operation-specific config fields.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Whether a credential id must be configured for this operation.
    #[serde(default)]
    pub requires_credential: bool,
    /// What the operation's output looks like.
    #[serde(default)]
    pub output_description: String,
}

impl OperationDef {
    /// Create an operation definition.
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: String::new(),
            fields: Vec::new(),
            requires_credential: false,
            output_description: String::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the operation's field definitions.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<FieldDef>) -> Self {
        self.fields = fields;
        self
    }

    /// Require a configured credential.
    #[must_use]
    pub fn requiring_credential(mut self) -> Self {
        self.requires_credential = true;
        self
    }

    /// Describe the output shape.
    #[must_use]
    pub fn with_output_description(mut self, description: impl Into<String>) -> Self {
        self.output_description = description.into();
        self
    }
}

/// Extended contract for handlers exposing a `(resource, operation)` matrix.
#[async_trait]
pub trait OperationHandler: Send + Sync + 'static {
    /// Static metadata shared with the uniform protocol.
    fn metadata(&self) -> &HandlerMetadata;

    /// The resources this integration addresses.
    fn resources(&self) -> &[ResourceDef];

    /// Operations available on one resource. Empty for unknown resources.
    fn operations(&self, resource: &str) -> &[OperationDef];

    /// Perform one operation.
    ///
    /// `credential` is already resolved when the operation requires one;
    /// `params` is the node config minus the routing fields.
    async fn execute_operation(
        &self,
        ctx: &NodeContext,
        resource: &str,
        operation: &str,
        credential: Option<CredentialPayload>,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<HandlerOutput, HandlerError>;
}

/// Bridges an [`OperationHandler`] onto the uniform [`Handler`] contract.
pub struct OperationAdapter<H> {
    inner: H,
}

impl<H: OperationHandler> OperationAdapter<H> {
    /// Wrap an operation handler for registration.
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    /// The wrapped handler.
    pub fn inner(&self) -> &H {
        &self.inner
    }

    fn routing<'c>(
        &self,
        config: &'c serde_json::Map<String, serde_json::Value>,
    ) -> Result<(&'c str, &'c str, &OperationDef), HandlerError> {
        let resource = config
            .get(RESOURCE_FIELD)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| HandlerError::config("missing `resource` field"))?;
        let operation = config
            .get(OPERATION_FIELD)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| HandlerError::config("missing `operation` field"))?;

        if !self.inner.resources().iter().any(|r| r.name == resource) {
            return Err(HandlerError::config(format!("unknown resource `{resource}`")));
        }
        let def = self
            .inner
            .operations(resource)
            .iter()
            .find(|op| op.name == operation)
            .ok_or_else(|| {
                HandlerError::config(format!(
                    "unknown operation `{operation}` on resource `{resource}`"
                ))
            })?;
        Ok((resource, operation, def))
    }
}

#[async_trait]
impl<H: OperationHandler> Handler for OperationAdapter<H> {
    fn metadata(&self) -> &HandlerMetadata {
        self.inner.metadata()
    }

    fn validate_config(
        &self,
        config: &serde_json::Map<String, serde_json::Value>,
    ) -> Vec<Violation> {
        let (_, _, def) = match self.routing(config) {
            Ok(found) => found,
            Err(err) => return vec![Violation::new(RESOURCE_FIELD, err.message)],
        };

        let mut violations = Schema::with_fields(def.fields.clone()).validate(config);
        if def.requires_credential
            && config
                .get(CREDENTIAL_FIELD)
                .and_then(serde_json::Value::as_str)
                .is_none()
        {
            violations.push(Violation::new(
                CREDENTIAL_FIELD,
                "operation requires a credential",
            ));
        }
        violations
    }

    async fn execute(&self, ctx: NodeContext) -> Result<HandlerOutput, HandlerError> {
        let (resource, operation, def) = self.routing(&ctx.config)?;
        let resource = resource.to_owned();
        let operation = operation.to_owned();
        let requires_credential = def.requires_credential;

        let credential = if requires_credential {
            let raw = ctx
                .config
                .get(CREDENTIAL_FIELD)
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| HandlerError::credential("operation requires a credential"))?;
            let id = CredentialId::parse(raw)
                .map_err(|_| HandlerError::config(format!("invalid credential id `{raw}`")))?;
            Some(ctx.credential(id).await?)
        } else {
            None
        };

        let mut params = ctx.config.clone();
        params.remove(RESOURCE_FIELD);
        params.remove(OPERATION_FIELD);
        params.remove(CREDENTIAL_FIELD);

        self.inner
            .execute_operation(&ctx, &resource, &operation, credential, &params)
            .await
    }
}
