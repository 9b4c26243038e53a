//! Recording context shared by every unit while it provisions.

use chrono::Utc;
use dockyard_core::resource::{Declaration, Grant, Output, Resource, ResourceKind, ResourceRef};
use dockyard_core::{
    Error, LogicalName, Namespace, Parameter, ParameterDraft, ParameterKey, ParameterStore,
    ProvisionedUnit, Result, UnitKind,
};
use tracing::{debug, info};

/// Name of the stack holding `kind` for `namespace`.
pub fn stack_name(namespace: &Namespace, kind: UnitKind) -> String {
    format!("{}-{}", namespace, kind.stack_suffix())
}

/// Collects what a unit declares and mediates its access to the
/// parameter store.
///
/// A unit may only resolve the parameters its kind lists in
/// [`UnitKind::resolves`] and only publish those in [`UnitKind::publishes`].
pub struct UnitStack<'a> {
    kind: UnitKind,
    stack_name: String,
    namespace: Namespace,
    store: &'a dyn ParameterStore,
    declarations: Vec<Declaration>,
    imports: Vec<ResourceRef>,
    grants: Vec<Grant>,
    published: Vec<Parameter>,
    outputs: Vec<Output>,
}

impl<'a> UnitStack<'a> {
    pub fn new(kind: UnitKind, namespace: &Namespace, store: &'a dyn ParameterStore) -> Self {
        Self {
            kind,
            stack_name: stack_name(namespace, kind),
            namespace: namespace.clone(),
            store,
            declarations: Vec::new(),
            imports: Vec::new(),
            grants: Vec::new(),
            published: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Declare a resource under a logical id unique within this stack.
    pub fn declare(&mut self, logical_id: &str, resource: Resource) -> Result<()> {
        if self.declarations.iter().any(|d| d.logical_id == logical_id) {
            return Err(Error::InvalidInput(format!(
                "logical id '{}' declared twice in stack '{}'",
                logical_id, self.stack_name
            )));
        }
        debug!(stack = %self.stack_name, logical_id, kind = ?resource.kind(), "Declared resource");
        self.declarations.push(Declaration {
            logical_id: logical_id.to_string(),
            resource,
        });
        Ok(())
    }

    /// Read a parameter published by a predecessor unit.
    pub async fn resolve(&mut self, name: LogicalName) -> Result<String> {
        if !self.kind.resolves().contains(&name) {
            return Err(Error::InvalidInput(format!(
                "unit '{}' does not declare '{}' among the parameters it resolves",
                self.kind, name
            )));
        }
        let key = ParameterKey::compose(&self.namespace, name);
        let value = self.store.resolve(&key).await?;
        debug!(stack = %self.stack_name, key = %key, value = %value, "Resolved parameter");
        Ok(value)
    }

    /// Rebuild a reference to another unit's resource from its name.
    pub fn import(&mut self, kind: ResourceKind, name: &str) -> ResourceRef {
        let reference = ResourceRef::new(kind, name);
        self.imports.push(reference.clone());
        reference
    }

    pub fn grant(&mut self, principal: &str, resource: &str, actions: &[&str]) {
        self.grants.push(Grant {
            principal: principal.to_string(),
            resource: resource.to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
        });
    }

    /// Publish a parameter and mirror it as a deployment output.
    pub async fn publish(
        &mut self,
        name: LogicalName,
        value: &str,
        description: String,
    ) -> Result<()> {
        if !self.kind.publishes().contains(&name) {
            return Err(Error::InvalidInput(format!(
                "unit '{}' does not own parameter '{}'",
                self.kind, name
            )));
        }
        let draft = ParameterDraft::new(
            &self.namespace,
            name,
            value,
            description.clone(),
            self.stack_name.clone(),
        );
        let key = draft.key.clone();
        self.store.publish(draft).await?;
        let parameter = self.store.get(&key).await?.ok_or_else(|| {
            Error::Internal(format!("parameter '{}' vanished right after publish", key))
        })?;
        self.published.push(parameter);
        self.output(name.output_id(), description, value);
        Ok(())
    }

    pub fn output(&mut self, logical_id: &str, description: String, value: &str) {
        self.outputs.push(Output {
            logical_id: logical_id.to_string(),
            description,
            value: value.to_string(),
        });
    }

    pub fn finish(self) -> ProvisionedUnit {
        info!(
            stack = %self.stack_name,
            resources = self.declarations.len(),
            parameters = self.published.len(),
            "Unit declared"
        );
        ProvisionedUnit {
            kind: self.kind,
            stack_name: self.stack_name,
            namespace: self.namespace,
            declarations: self.declarations,
            imports: self.imports,
            grants: self.grants,
            published: self.published,
            outputs: self.outputs,
            provisioned_at: Utc::now(),
        }
    }
}
