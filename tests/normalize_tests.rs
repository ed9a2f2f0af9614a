//! Normalization and schema extraction tests

use std::sync::Arc;

use blueprint_engine::normalize::{Format, NormalizeError, Normalizer};
use blueprint_engine::storage::{FileSystemStorageBackend, StorageBackend};
use blueprint_engine::{EngineConfig, ExtractError, SchemaExtractor};
use serde_json::{Value, json};
use tempfile::TempDir;

fn setup(temp: &TempDir) -> (Arc<dyn StorageBackend>, Normalizer) {
    let storage: Arc<dyn StorageBackend> = Arc::new(FileSystemStorageBackend::new(temp.path()));
    let config = EngineConfig::builder().read_chunk_size(7).build();
    let normalizer = Normalizer::new(storage.clone(), &config);
    (storage, normalizer)
}

async fn normalize(temp: &TempDir, content_type: &str, input: &str) -> Value {
    let (storage, normalizer) = setup(temp);
    let file = normalizer
        .normalize_bytes(content_type, input.as_bytes())
        .await
        .unwrap();
    serde_json::from_slice(&storage.read_file(&file.path).await.unwrap()).unwrap()
}

mod format_tests {
    use super::*;

    #[tokio::test]
    async fn test_csv_rows_keyed_by_header() {
        let temp = TempDir::new().unwrap();
        let records = normalize(&temp, "text/csv", "name,city\nAna,Oslo\nLeo,\"Lima, PE\"\n").await;
        assert_eq!(
            records,
            json!([
                {"name": "Ana", "city": "Oslo"},
                {"name": "Leo", "city": "Lima, PE"}
            ])
        );
    }

    #[tokio::test]
    async fn test_csv_fully_quoted_without_trailing_newline() {
        let temp = TempDir::new().unwrap();
        let records = normalize(
            &temp,
            "text/csv",
            "\"name\",\"age\"\n\"Ana\",\"30\"\n\"Leo\",\"41\"",
        )
        .await;
        assert_eq!(
            records,
            json!([{"name": "Ana", "age": "30"}, {"name": "Leo", "age": "41"}])
        );
    }

    #[tokio::test]
    async fn test_xml_repeated_elements() {
        let temp = TempDir::new().unwrap();
        let records = normalize(
            &temp,
            "application/xml",
            "<orders><order><id>1</id></order><order><id>2</id></order></orders>",
        )
        .await;
        assert_eq!(records, json!([{"id": "1"}, {"id": "2"}]));
    }

    #[tokio::test]
    async fn test_sql_dump_rows_tagged_with_table() {
        let temp = TempDir::new().unwrap();
        let records = normalize(
            &temp,
            "application/sql",
            "CREATE TABLE people (id INTEGER, name VARCHAR);\nINSERT INTO people VALUES (1, 'Ana');",
        )
        .await;
        let records = records.as_array().unwrap();
        assert!(records[0].get("_meta").is_some());
        assert_eq!(records[1], json!({"_table": "people", "id": 1, "name": "Ana"}));
    }

    #[tokio::test]
    async fn test_json_passthrough() {
        let temp = TempDir::new().unwrap();
        let records = normalize(&temp, "application/json; charset=utf-8", r#"[{"a":"ü"}]"#).await;
        assert_eq!(records, json!([{"a": "ü"}]));
    }

    #[test]
    fn test_content_type_lookup() {
        assert_eq!(Format::from_content_type("TEXT/CSV"), Some(Format::Csv));
        assert_eq!(Format::from_content_type("text/xml"), Some(Format::Xml));
        assert_eq!(Format::from_content_type("image/png"), None);
    }
}

mod limit_tests {
    use super::*;

    #[tokio::test]
    async fn test_rejections_leave_no_artifacts() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FileSystemStorageBackend::new(temp.path()));
        let normalizer = Normalizer::new(storage, &EngineConfig::builder().max_upload_bytes(8).build());

        assert!(matches!(
            normalizer.normalize_bytes("text/plain", b"a").await,
            Err(NormalizeError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            normalizer.normalize_bytes("text/csv", b"a,b\n1,2\n3,4\n").await,
            Err(NormalizeError::TooLarge { max: 8, .. })
        ));
        assert!(matches!(
            normalizer.normalize_bytes("application/xml", b"<a>").await,
            Err(NormalizeError::Xml(_))
        ));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}

mod extract_tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_keeps_at_most_three_examples() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FileSystemStorageBackend::new(temp.path()));
        let extractor = SchemaExtractor::new(storage, &EngineConfig::default());

        let schema = extractor
            .extract_bytes(
                "application/json",
                br#"[{"n": 1}, {"n": 2}, {"n": 3}, {"n": 4}, {"n": 5}]"#,
            )
            .await
            .unwrap();

        assert_eq!(schema["items"]["properties"]["n"]["type"], json!("integer"));
        assert_eq!(schema["items"]["properties"]["n"]["examples"], json!([1, 2, 3]));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_scalar_document_is_rejected_and_cleaned_up() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FileSystemStorageBackend::new(temp.path()));
        let extractor = SchemaExtractor::new(storage, &EngineConfig::default());

        let err = extractor
            .extract_bytes("application/json", b"42")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Normalize(NormalizeError::Inference(_))));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
