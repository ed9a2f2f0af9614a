//! Blueprint access and batch tests

use std::sync::Arc;

use blueprint_engine::blueprint::{
    BlueprintError, BlueprintService, BlueprintUpdate, NewBlueprint, NewInputDefinition,
    NewSourceMapping,
};
use blueprint_engine::store::{FieldMapping, RecordStore, StoreError};
use blueprint_engine::{Caller, ErrorKind};
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

mod access_tests {
    use super::*;

    #[test]
    fn test_owner_member_and_stranger() {
        let service = service();
        let owner = Caller::new(1).with_organizations([7]);
        let blueprint_id = blueprint(&service, &owner, Some(7));

        let member = Caller::new(2).with_organizations([7]);
        assert!(service.get_blueprint(&member, blueprint_id).is_ok());

        let stranger = Caller::new(3);
        let err = service.get_blueprint(&stranger, blueprint_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(service.list_blueprints(&stranger).unwrap().is_empty());

        assert!(service.get_blueprint(&Caller::admin(9), blueprint_id).is_ok());
    }

    #[test]
    fn test_cannot_move_blueprint_into_foreign_organization() {
        let service = service();
        let owner = Caller::new(1);
        let blueprint_id = blueprint(&service, &owner, None);

        let err = service
            .update_blueprint(
                &owner,
                blueprint_id,
                BlueprintUpdate {
                    organization_id: Some(5),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err, BlueprintError::NotMember(5));
    }

    #[test]
    fn test_delete_cascades() {
        let service = service();
        let owner = Caller::new(1);
        let blueprint_id = blueprint(&service, &owner, None);
        let definition_id = definition(&service, &owner, blueprint_id);
        let mapping_id = service
            .create_mapping(&owner, definition_id, mapping("m", &[("id", "id")]))
            .unwrap()
            .id;

        service.delete_blueprint(&owner, blueprint_id).unwrap();

        assert!(matches!(
            service.get_mapping(&owner, mapping_id),
            Err(BlueprintError::Store(StoreError::NotFound { .. }))
        ));
        assert_eq!(
            service.get_input_definition(&owner, definition_id).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}

mod batch_tests {
    use super::*;

    #[tokio::test]
    async fn test_batch_requires_output_definition() {
        let service = service();
        let owner = Caller::new(1);
        let blueprint_id = blueprint(&service, &owner, None);
        let definition_id = definition(&service, &owner, blueprint_id);

        let err = service
            .apply_batch(&owner, blueprint_id, definition_id, vec![json!({"id": 1})])
            .await
            .unwrap_err();
        assert_eq!(err, BlueprintError::MissingOutputDefinition(blueprint_id));
    }

    #[tokio::test]
    async fn test_batch_runs_every_mapping_per_item() {
        let service = service();
        let owner = Caller::new(1);
        let blueprint_id = blueprint(&service, &owner, None);
        let definition_id = definition(&service, &owner, blueprint_id);
        service
            .create_output_definition(&owner, blueprint_id, json!({"type": "object"}))
            .unwrap();
        service
            .create_mapping(&owner, definition_id, mapping("ids", &[("key", "id")]))
            .unwrap();
        service
            .create_mapping(&owner, definition_id, mapping("doubled", &[("twice", "id * 2")]))
            .unwrap();

        let results = service
            .apply_batch(
                &owner,
                blueprint_id,
                definition_id,
                vec![json!({"id": 3}), json!({"name": "no id"})],
            )
            .await
            .unwrap();

        assert!(results[0].is_success());
        assert_eq!(
            results[0].result,
            Some(vec![json!({"key": 3}), json!({"twice": 6})])
        );
        assert!(!results[1].is_success());
        assert!(results[1].error.is_some());
    }

    #[tokio::test]
    async fn test_batch_rejects_foreign_definition() {
        let service = service();
        let owner = Caller::new(1);
        let first = blueprint(&service, &owner, None);
        let second = blueprint(&service, &owner, None);
        let foreign = definition(&service, &owner, second);
        service
            .create_output_definition(&owner, first, json!({}))
            .unwrap();

        let err = service
            .apply_batch(&owner, first, foreign, vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }
}
