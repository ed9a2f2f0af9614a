//! Transform tests over normalized documents

use std::sync::Arc;

use blueprint_engine::normalize::Normalizer;
use blueprint_engine::storage::{FileSystemStorageBackend, StorageBackend};
use blueprint_engine::store::{FieldMapping, SourceMapping};
use blueprint_engine::transform::{CompiledMapping, TransformError, transform_document};
use blueprint_engine::{EngineConfig, SchemaExtractor};
use serde_json::{Value, json};
use tempfile::TempDir;

fn source_mapping(mapping: FieldMapping, input_schema: Value) -> SourceMapping {
    SourceMapping {
        id: 1,
        input_definition_id: 1,
        name: "people".into(),
        file_type: Some("csv".into()),
        input_schema,
        output_schema: json!({}),
        mapping: Some(mapping),
        model_id: None,
        target_path: None,
    }
}

mod pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn test_csv_through_inferred_schema_and_mapping() {
        let temp = TempDir::new().unwrap();
        let storage: Arc<dyn StorageBackend> = Arc::new(FileSystemStorageBackend::new(temp.path()));
        let config = EngineConfig::default();
        let csv = b"first,last,city\nAda,Lovelace,London\nAlan,Turing,Wilmslow\n";

        let schema = SchemaExtractor::new(storage.clone(), &config)
            .extract_bytes("text/csv", csv)
            .await
            .unwrap();
        let file = Normalizer::new(storage.clone(), &config)
            .normalize_bytes("text/csv", csv)
            .await
            .unwrap();
        let document: Value =
            serde_json::from_slice(&storage.read_file(&file.path).await.unwrap()).unwrap();

        let mapping: FieldMapping = [
            ("name", r#"first + " " + last"#),
            ("town", "str::to_uppercase(city)"),
        ]
        .into_iter()
        .collect();
        let output = transform_document(&source_mapping(mapping, schema), &document).unwrap();

        assert_eq!(
            output,
            json!([
                {"name": "Ada Lovelace", "town": "LONDON"},
                {"name": "Alan Turing", "town": "WILMSLOW"}
            ])
        );
    }

    #[test]
    fn test_record_failing_schema_aborts_document() {
        let schema = json!({
            "type": "object",
            "properties": {"age": {"type": "integer"}},
            "required": ["age"]
        });
        let mapping: FieldMapping = [("next", "age + 1")].into_iter().collect();
        let source = source_mapping(mapping, schema);

        assert_eq!(
            transform_document(&source, &json!([{"age": 1}, {"age": 41}])).unwrap(),
            json!([{"next": 2}, {"next": 42}])
        );
        let err = transform_document(&source, &json!([{"age": 1}, {"age": "x"}])).unwrap_err();
        match err {
            TransformError::Validation { path, .. } => assert_eq!(path, "/age"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

mod expression_tests {
    use super::*;

    #[test]
    fn test_output_fields_follow_declaration_order() {
        let mapping: FieldMapping = [("z", "1"), ("a", "2"), ("m", "3")].into_iter().collect();
        let compiled = CompiledMapping::compile(&mapping, &Value::Null).unwrap();
        let output = compiled.apply(&json!({"id": 7})).unwrap();
        assert_eq!(serde_json::to_string(&output).unwrap(), r#"{"z":1,"a":2,"m":3}"#);
    }

    #[test]
    fn test_bad_expression_reported_at_compile_time() {
        let mapping: FieldMapping = [("broken", "1 +")].into_iter().collect();
        assert!(matches!(
            CompiledMapping::compile(&mapping, &Value::Null),
            Err(TransformError::Compile { field, .. }) if field == "broken"
        ));
    }

    #[test]
    fn test_empty_object_maps_to_empty_object() {
        let mapping: FieldMapping = [("x", "missing * 2")].into_iter().collect();
        let compiled = CompiledMapping::compile(&mapping, &Value::Null).unwrap();
        assert_eq!(compiled.apply(&json!({})).unwrap(), json!({}));
    }

    #[test]
    fn test_unknown_variable_fails_evaluation() {
        let mapping: FieldMapping = [("x", "missing * 2")].into_iter().collect();
        let compiled = CompiledMapping::compile(&mapping, &Value::Null).unwrap();
        assert!(matches!(
            compiled.apply(&json!({"present": 1})),
            Err(TransformError::Evaluation { .. })
        ));
    }
}
