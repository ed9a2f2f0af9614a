//! Input definition versions
//!
//! Definitions sharing a `version_group` are versions of one input shape and
//! exactly one of them is selected. These functions run inside a store
//! transaction so the selection flag never has two owners.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::store::{Id, InputDefinition, SourceMapping, StoreResult, Tables};

/// Start a new group with version 1, selected
pub fn create_initial(
    tables: &mut Tables,
    blueprint_id: Id,
    name: String,
    description: Option<String>,
) -> InputDefinition {
    let group = Uuid::new_v4();
    let version = tables.next_version(group);
    tables
        .input_definitions
        .insert_with(|id| InputDefinition {
            id,
            blueprint_id,
            name,
            description,
            version_group: group,
            version,
            is_selected: true,
            created_at: Utc::now(),
        })
        .clone()
}

fn deselect_group(tables: &mut Tables, group: Uuid) {
    for definition in tables.input_definitions.iter_mut() {
        if definition.version_group == group {
            definition.is_selected = false;
        }
    }
}

/// Clone `base_id` and its mappings into a new selected version
pub fn create_version(tables: &mut Tables, base_id: Id) -> StoreResult<InputDefinition> {
    let base = tables.input_definitions.require(base_id)?.clone();
    let mappings: Vec<SourceMapping> = tables.mappings_of(base_id).into_iter().cloned().collect();

    let version = tables.next_version(base.version_group);
    deselect_group(tables, base.version_group);
    let created = tables
        .input_definitions
        .insert_with(|id| InputDefinition {
            id,
            version,
            is_selected: true,
            created_at: Utc::now(),
            ..base
        })
        .clone();

    for mapping in mappings {
        tables.source_mappings.insert_with(|id| SourceMapping {
            id,
            input_definition_id: created.id,
            ..mapping
        });
    }

    info!(
        base_id,
        input_definition_id = created.id,
        version,
        "Created input definition version"
    );
    Ok(created)
}

/// Make `id` the selected version of its group
pub fn select_version(tables: &mut Tables, id: Id) -> StoreResult<InputDefinition> {
    let group = tables.input_definitions.require(id)?.version_group;
    deselect_group(tables, group);
    let target = tables.input_definitions.require_mut(id)?;
    target.is_selected = true;
    Ok(target.clone())
}

/// Every version sharing `id`'s group, oldest first
pub fn list_versions(tables: &Tables, id: Id) -> StoreResult<Vec<InputDefinition>> {
    let group = tables.input_definitions.require(id)?.version_group;
    Ok(tables.version_group(&group).into_iter().cloned().collect())
}

/// Select the highest remaining version when a group lost its selection
pub fn reselect_latest(tables: &mut Tables, group: Uuid) -> Option<Id> {
    let members = tables.version_group(&group);
    if members.iter().any(|d| d.is_selected) {
        return None;
    }
    let latest = members.last()?.id;
    if let Some(definition) = tables.input_definitions.get_mut(latest) {
        definition.is_selected = true;
    }
    Some(latest)
}
