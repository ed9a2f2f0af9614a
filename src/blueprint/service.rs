//! Blueprint editing and batch application

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, info_span};

use super::error::{BlueprintError, BlueprintResult};
use super::versions;
use crate::auth::Caller;
use crate::store::{
    Blueprint, FieldMapping, Id, InputDefinition, OutputDefinition, RecordStore, SourceMapping,
    Tables,
};
use crate::transform::{ItemResult, TransformEngine};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBlueprint {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub organization_id: Option<Id>,
}

/// Partial update; `None` keeps the current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlueprintUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub organization_id: Option<Id>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewInputDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSourceMapping {
    pub name: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
    #[serde(default)]
    pub output_schema: Value,
    #[serde(default)]
    pub mapping: Option<FieldMapping>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub target_path: Option<String>,
}

/// Partial update; `None` keeps the current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMappingUpdate {
    pub name: Option<String>,
    pub file_type: Option<String>,
    pub input_schema: Option<Value>,
    pub output_schema: Option<Value>,
    pub mapping: Option<FieldMapping>,
    pub model_id: Option<String>,
    pub target_path: Option<String>,
}

fn require_name(name: &str) -> BlueprintResult<()> {
    if name.trim().is_empty() {
        return Err(BlueprintError::InvalidInput("name must not be empty".to_string()));
    }
    Ok(())
}

/// Reject documents that are not usable JSON Schemas; null and `{}` are accepted
fn check_schema(schema: &Value) -> BlueprintResult<()> {
    match schema {
        Value::Null => Ok(()),
        Value::Object(_) => jsonschema::Validator::new(schema)
            .map(|_| ())
            .map_err(|e| BlueprintError::InvalidInput(format!("invalid JSON Schema: {e}"))),
        _ => Err(BlueprintError::InvalidInput(
            "schema must be a JSON object".to_string(),
        )),
    }
}

fn authorize_blueprint<'t>(
    tables: &'t Tables,
    caller: &Caller,
    id: Id,
) -> BlueprintResult<&'t Blueprint> {
    let blueprint = tables.blueprints.require(id)?;
    if caller.can_access(blueprint.user_id, blueprint.organization_id) {
        Ok(blueprint)
    } else {
        Err(BlueprintError::Unauthorized {
            entity: "blueprint",
            id,
        })
    }
}

fn authorize_definition<'t>(
    tables: &'t Tables,
    caller: &Caller,
    id: Id,
) -> BlueprintResult<&'t InputDefinition> {
    let definition = tables.input_definitions.require(id)?;
    authorize_blueprint(tables, caller, definition.blueprint_id)?;
    Ok(definition)
}

fn authorize_mapping<'t>(
    tables: &'t Tables,
    caller: &Caller,
    id: Id,
) -> BlueprintResult<&'t SourceMapping> {
    let mapping = tables.source_mappings.require(id)?;
    authorize_definition(tables, caller, mapping.input_definition_id)?;
    Ok(mapping)
}

fn touch(tables: &mut Tables, blueprint_id: Id) {
    if let Some(blueprint) = tables.blueprints.get_mut(blueprint_id) {
        blueprint.updated_at = Utc::now();
    }
}

fn check_organization(caller: &Caller, organization_id: Option<Id>) -> BlueprintResult<()> {
    match organization_id {
        Some(org) if !caller.is_admin && !caller.is_member_of(org) => {
            Err(BlueprintError::NotMember(org))
        }
        _ => Ok(()),
    }
}

/// Blueprint, definition and mapping operations with ownership checks
#[derive(Clone)]
pub struct BlueprintService {
    store: Arc<RecordStore>,
}

impl BlueprintService {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    // Blueprints

    pub fn create_blueprint(&self, caller: &Caller, new: NewBlueprint) -> BlueprintResult<Blueprint> {
        require_name(&new.name)?;
        check_organization(caller, new.organization_id)?;
        let blueprint = self.store.transaction(|t| {
            let now = Utc::now();
            Ok::<_, BlueprintError>(
                t.blueprints
                    .insert_with(|id| Blueprint {
                        id,
                        name: new.name,
                        description: new.description,
                        user_id: caller.id,
                        organization_id: new.organization_id,
                        created_at: now,
                        updated_at: now,
                    })
                    .clone(),
            )
        })?;
        info!(blueprint_id = blueprint.id, user_id = caller.id, "Created blueprint");
        Ok(blueprint)
    }

    pub fn get_blueprint(&self, caller: &Caller, id: Id) -> BlueprintResult<Blueprint> {
        self.store
            .read(|t| authorize_blueprint(t, caller, id).cloned())?
    }

    /// Every blueprint the caller can access
    pub fn list_blueprints(&self, caller: &Caller) -> BlueprintResult<Vec<Blueprint>> {
        Ok(self.store.read(|t| {
            t.blueprints
                .iter()
                .filter(|b| caller.can_access(b.user_id, b.organization_id))
                .cloned()
                .collect()
        })?)
    }

    pub fn list_organization_blueprints(
        &self,
        caller: &Caller,
        organization_id: Id,
    ) -> BlueprintResult<Vec<Blueprint>> {
        check_organization(caller, Some(organization_id))?;
        Ok(self.store.read(|t| {
            t.blueprints
                .iter()
                .filter(|b| b.organization_id == Some(organization_id))
                .cloned()
                .collect()
        })?)
    }

    pub fn update_blueprint(
        &self,
        caller: &Caller,
        id: Id,
        update: BlueprintUpdate,
    ) -> BlueprintResult<Blueprint> {
        if let Some(name) = &update.name {
            require_name(name)?;
        }
        check_organization(caller, update.organization_id)?;
        self.store.transaction(|t| {
            authorize_blueprint(t, caller, id)?;
            let blueprint = t.blueprints.require_mut(id)?;
            if let Some(name) = update.name {
                blueprint.name = name;
            }
            if update.description.is_some() {
                blueprint.description = update.description;
            }
            if update.organization_id.is_some() {
                blueprint.organization_id = update.organization_id;
            }
            blueprint.updated_at = Utc::now();
            Ok(blueprint.clone())
        })
    }

    /// Delete a blueprint with its definitions, mappings and output definition
    pub fn delete_blueprint(&self, caller: &Caller, id: Id) -> BlueprintResult<()> {
        self.store.transaction(|t| {
            authorize_blueprint(t, caller, id)?;
            let definitions = t.input_definitions.remove_where(|d| d.blueprint_id == id);
            let mappings = t
                .source_mappings
                .remove_where(|m| definitions.contains(&m.input_definition_id));
            t.output_definitions.remove_where(|o| o.blueprint_id == id);
            t.blueprints.remove(id);
            info!(
                blueprint_id = id,
                input_definitions = definitions.len(),
                mappings = mappings.len(),
                "Deleted blueprint"
            );
            Ok(())
        })
    }

    // Input definitions

    pub fn create_input_definition(
        &self,
        caller: &Caller,
        blueprint_id: Id,
        new: NewInputDefinition,
    ) -> BlueprintResult<InputDefinition> {
        require_name(&new.name)?;
        self.store.transaction(|t| {
            authorize_blueprint(t, caller, blueprint_id)?;
            let definition = versions::create_initial(t, blueprint_id, new.name, new.description);
            touch(t, blueprint_id);
            Ok(definition)
        })
    }

    pub fn get_input_definition(&self, caller: &Caller, id: Id) -> BlueprintResult<InputDefinition> {
        self.store
            .read(|t| authorize_definition(t, caller, id).cloned())?
    }

    /// All definitions of a blueprint, every version included
    pub fn list_input_definitions(
        &self,
        caller: &Caller,
        blueprint_id: Id,
    ) -> BlueprintResult<Vec<InputDefinition>> {
        self.store.read(|t| -> BlueprintResult<_> {
            authorize_blueprint(t, caller, blueprint_id)?;
            Ok(t.input_definitions
                .iter()
                .filter(|d| d.blueprint_id == blueprint_id)
                .cloned()
                .collect())
        })?
    }

    pub fn update_input_definition(
        &self,
        caller: &Caller,
        id: Id,
        update: NewInputDefinition,
    ) -> BlueprintResult<InputDefinition> {
        require_name(&update.name)?;
        self.store.transaction(|t| {
            let blueprint_id = authorize_definition(t, caller, id)?.blueprint_id;
            let definition = t.input_definitions.require_mut(id)?;
            definition.name = update.name;
            definition.description = update.description;
            let updated = definition.clone();
            touch(t, blueprint_id);
            Ok(updated)
        })
    }

    /// Delete a definition and its mappings; a removed selection moves to the
    /// highest remaining version
    pub fn delete_input_definition(&self, caller: &Caller, id: Id) -> BlueprintResult<()> {
        self.store.transaction(|t| {
            let definition = authorize_definition(t, caller, id)?.clone();
            t.source_mappings.remove_where(|m| m.input_definition_id == id);
            t.input_definitions.remove(id);
            if let Some(selected) = versions::reselect_latest(t, definition.version_group) {
                debug!(input_definition_id = selected, "Selected remaining version");
            }
            touch(t, definition.blueprint_id);
            Ok(())
        })
    }

    pub fn create_version(&self, caller: &Caller, base_id: Id) -> BlueprintResult<InputDefinition> {
        self.store.transaction(|t| {
            let blueprint_id = authorize_definition(t, caller, base_id)?.blueprint_id;
            let created = versions::create_version(t, base_id)?;
            touch(t, blueprint_id);
            Ok(created)
        })
    }

    pub fn select_version(&self, caller: &Caller, id: Id) -> BlueprintResult<InputDefinition> {
        self.store.transaction(|t| {
            authorize_definition(t, caller, id)?;
            Ok(versions::select_version(t, id)?)
        })
    }

    pub fn list_versions(&self, caller: &Caller, id: Id) -> BlueprintResult<Vec<InputDefinition>> {
        self.store.read(|t| -> BlueprintResult<_> {
            authorize_definition(t, caller, id)?;
            Ok(versions::list_versions(t, id)?)
        })?
    }

    // Output definitions

    pub fn create_output_definition(
        &self,
        caller: &Caller,
        blueprint_id: Id,
        json_schema: Value,
    ) -> BlueprintResult<OutputDefinition> {
        check_schema(&json_schema)?;
        self.store.transaction(|t| {
            authorize_blueprint(t, caller, blueprint_id)?;
            if t.output_definition_of(blueprint_id).is_some() {
                return Err(BlueprintError::DuplicateOutputDefinition(blueprint_id));
            }
            let created = t
                .output_definitions
                .insert_with(|id| OutputDefinition {
                    id,
                    blueprint_id,
                    json_schema,
                })
                .clone();
            touch(t, blueprint_id);
            Ok(created)
        })
    }

    pub fn get_output_definition(
        &self,
        caller: &Caller,
        blueprint_id: Id,
    ) -> BlueprintResult<OutputDefinition> {
        self.store.read(|t| -> BlueprintResult<_> {
            authorize_blueprint(t, caller, blueprint_id)?;
            t.output_definition_of(blueprint_id)
                .cloned()
                .ok_or(BlueprintError::MissingOutputDefinition(blueprint_id))
        })?
    }

    pub fn update_output_definition(
        &self,
        caller: &Caller,
        blueprint_id: Id,
        json_schema: Value,
    ) -> BlueprintResult<OutputDefinition> {
        check_schema(&json_schema)?;
        self.store.transaction(|t| {
            authorize_blueprint(t, caller, blueprint_id)?;
            let id = t
                .output_definition_of(blueprint_id)
                .map(|o| o.id)
                .ok_or(BlueprintError::MissingOutputDefinition(blueprint_id))?;
            let output = t.output_definitions.require_mut(id)?;
            output.json_schema = json_schema;
            let updated = output.clone();
            touch(t, blueprint_id);
            Ok(updated)
        })
    }

    pub fn delete_output_definition(&self, caller: &Caller, blueprint_id: Id) -> BlueprintResult<()> {
        self.store.transaction(|t| {
            authorize_blueprint(t, caller, blueprint_id)?;
            if t
                .output_definitions
                .remove_where(|o| o.blueprint_id == blueprint_id)
                .is_empty()
            {
                return Err(BlueprintError::MissingOutputDefinition(blueprint_id));
            }
            touch(t, blueprint_id);
            Ok(())
        })
    }

    // Source mappings

    pub fn create_mapping(
        &self,
        caller: &Caller,
        input_definition_id: Id,
        new: NewSourceMapping,
    ) -> BlueprintResult<SourceMapping> {
        require_name(&new.name)?;
        check_schema(&new.input_schema)?;
        check_schema(&new.output_schema)?;
        self.store.transaction(|t| {
            let blueprint_id = authorize_definition(t, caller, input_definition_id)?.blueprint_id;
            if t
                .mappings_of(input_definition_id)
                .iter()
                .any(|m| m.name == new.name)
            {
                return Err(BlueprintError::InvalidInput(format!(
                    "mapping '{}' already exists on input definition {}",
                    new.name, input_definition_id
                )));
            }
            let created = t
                .source_mappings
                .insert_with(|id| SourceMapping {
                    id,
                    input_definition_id,
                    name: new.name,
                    file_type: new.file_type,
                    input_schema: new.input_schema,
                    output_schema: new.output_schema,
                    mapping: new.mapping,
                    model_id: new.model_id,
                    target_path: new.target_path,
                })
                .clone();
            touch(t, blueprint_id);
            Ok(created)
        })
    }

    pub fn get_mapping(&self, caller: &Caller, id: Id) -> BlueprintResult<SourceMapping> {
        self.store.read(|t| authorize_mapping(t, caller, id).cloned())?
    }

    pub fn list_mappings(
        &self,
        caller: &Caller,
        input_definition_id: Id,
    ) -> BlueprintResult<Vec<SourceMapping>> {
        self.store.read(|t| -> BlueprintResult<_> {
            authorize_definition(t, caller, input_definition_id)?;
            Ok(t.mappings_of(input_definition_id)
                .into_iter()
                .cloned()
                .collect())
        })?
    }

    pub fn update_mapping(
        &self,
        caller: &Caller,
        id: Id,
        update: SourceMappingUpdate,
    ) -> BlueprintResult<SourceMapping> {
        if let Some(name) = &update.name {
            require_name(name)?;
        }
        for schema in [&update.input_schema, &update.output_schema].into_iter().flatten() {
            check_schema(schema)?;
        }
        self.store.transaction(|t| {
            authorize_mapping(t, caller, id)?;
            let mapping = t.source_mappings.require_mut(id)?;
            if let Some(name) = update.name {
                mapping.name = name;
            }
            if update.file_type.is_some() {
                mapping.file_type = update.file_type;
            }
            if let Some(schema) = update.input_schema {
                mapping.input_schema = schema;
            }
            if let Some(schema) = update.output_schema {
                mapping.output_schema = schema;
            }
            if update.mapping.is_some() {
                mapping.mapping = update.mapping;
            }
            if update.model_id.is_some() {
                mapping.model_id = update.model_id;
            }
            if update.target_path.is_some() {
                mapping.target_path = update.target_path;
            }
            Ok(mapping.clone())
        })
    }

    pub fn delete_mapping(&self, caller: &Caller, id: Id) -> BlueprintResult<()> {
        self.store.transaction(|t| {
            authorize_mapping(t, caller, id)?;
            t.source_mappings.remove(id);
            Ok(())
        })
    }

    // Batch application

    /// Run every mapping of an input definition over `items`
    ///
    /// Per-item failures are reported in the results; only access and
    /// configuration problems fail the call.
    pub async fn apply_batch(
        &self,
        caller: &Caller,
        blueprint_id: Id,
        input_definition_id: Id,
        items: Vec<Value>,
    ) -> BlueprintResult<Vec<ItemResult>> {
        let mappings = self.store.read(|t| -> BlueprintResult<Vec<SourceMapping>> {
            authorize_blueprint(t, caller, blueprint_id)?;
            let definition = t.input_definitions.require(input_definition_id)?;
            if definition.blueprint_id != blueprint_id {
                return Err(BlueprintError::ForeignInputDefinition {
                    blueprint_id,
                    input_definition_id,
                });
            }
            if t.output_definition_of(blueprint_id).is_none() {
                return Err(BlueprintError::MissingOutputDefinition(blueprint_id));
            }
            Ok(t.mappings_of(input_definition_id)
                .into_iter()
                .cloned()
                .collect())
        })??;

        let span = info_span!("apply_batch", blueprint_id, input_definition_id);
        tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            TransformEngine::new().apply_batch(&items, &mappings)
        })
        .await
        .map_err(|e| BlueprintError::Task(e.to_string()))
    }
}
