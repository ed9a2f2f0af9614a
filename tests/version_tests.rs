//! Input definition version tests

use std::sync::Arc;

use blueprint_engine::blueprint::{
    BlueprintService, NewBlueprint, NewInputDefinition, NewSourceMapping,
};
use blueprint_engine::store::{FieldMapping, RecordStore};
use blueprint_engine::Caller;
use serde_json::json;

fn service() -> BlueprintService {
    BlueprintService::new(Arc::new(RecordStore::new()))
}

fn blueprint(service: &BlueprintService, caller: &Caller, organization_id: Option<u64>) -> u64 {
    service
        .create_blueprint(
            caller,
            NewBlueprint {
                name: "Customers".into(),
                organization_id,
                ..Default::default()
            },
        )
        .unwrap()
        .id
}

fn definition(service: &BlueprintService, caller: &Caller, blueprint_id: u64) -> u64 {
    service
        .create_input_definition(
            caller,
            blueprint_id,
            NewInputDefinition {
                name: "crm export".into(),
                description: None,
            },
        )
        .unwrap()
        .id
}

fn mapping(name: &str, rules: &[(&str, &str)]) -> NewSourceMapping {
    NewSourceMapping {
        name: name.into(),
        input_schema: json!({"type": "object", "required": ["id"]}),
        mapping: Some(rules.iter().copied().collect::<FieldMapping>()),
        ..Default::default()
    }
}

mod version_tests {
    use super::*;

    #[test]
    fn test_new_version_copies_mappings_and_takes_selection() {
        let service = service();
        let owner = Caller::new(1);
        let blueprint_id = blueprint(&service, &owner, None);
        let v1 = definition(&service, &owner, blueprint_id);
        service
            .create_mapping(&owner, v1, mapping("m", &[("id", "id")]))
            .unwrap();

        let v2 = service.create_version(&owner, v1).unwrap();
        assert_eq!(v2.version, 2);
        assert!(v2.is_selected);
        assert_eq!(service.list_mappings(&owner, v2.id).unwrap().len(), 1);

        let versions = service.list_versions(&owner, v1).unwrap();
        assert_eq!(
            versions.iter().map(|d| (d.version, d.is_selected)).collect::<Vec<_>>(),
            vec![(1, false), (2, true)]
        );

        service.select_version(&owner, v1).unwrap();
        assert!(service.get_input_definition(&owner, v1).unwrap().is_selected);
        assert!(!service.get_input_definition(&owner, v2.id).unwrap().is_selected);
    }

    #[test]
    fn test_deleting_selected_version_reselects_latest() {
        let service = service();
        let owner = Caller::new(1);
        let blueprint_id = blueprint(&service, &owner, None);
        let v1 = definition(&service, &owner, blueprint_id);
        let v2 = service.create_version(&owner, v1).unwrap();
        let v3 = service.create_version(&owner, v2.id).unwrap();

        service.delete_input_definition(&owner, v3.id).unwrap();
        assert!(service.get_input_definition(&owner, v2.id).unwrap().is_selected);

        let v4 = service.create_version(&owner, v1).unwrap();
        assert_eq!(v4.version, 4);
    }
}
