use bytes::Bytes;
use report_relay::object_store::{BlobTags, LocalStore, ObjectStore, ObjectStoreError};

fn tags(pairs: &[(&str, &str)]) -> BlobTags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_local_store_put_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let data = Bytes::from("hello world");
    store
        .put("employeevisit/2025/jul/report.xlsx", data.clone(), &BlobTags::new())
        .await
        .unwrap();

    let retrieved = store.get("employeevisit/2025/jul/report.xlsx").await.unwrap();
    assert_eq!(retrieved, data);
}

#[tokio::test]
async fn test_local_store_returns_file_url() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let url = store
        .put("pob/2025/jun/a.xlsx", Bytes::from("x"), &BlobTags::new())
        .await
        .unwrap();
    assert!(url.starts_with("file://"));
    assert!(url.ends_with("pob/2025/jun/a.xlsx"));
}

#[tokio::test]
async fn test_local_store_tags() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let expected = tags(&[("division", "AP ELBRIT"), ("month", "jul"), ("year", "2025")]);
    store
        .put("visit/2025/jul/v.csv", Bytes::from("a,b"), &expected)
        .await
        .unwrap();

    assert_eq!(store.tags("visit/2025/jul/v.csv").await.unwrap(), expected);
}

#[tokio::test]
async fn test_local_store_exists() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    assert!(!store.exists("missing").await.unwrap());

    store
        .put("present/file", Bytes::from("data"), &BlobTags::new())
        .await
        .unwrap();
    assert!(store.exists("present/file").await.unwrap());
    // A prefix is not an object
    assert!(!store.exists("present").await.unwrap());
}

#[tokio::test]
async fn test_local_store_get_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    assert!(matches!(
        store.get("missing").await,
        Err(ObjectStoreError::NotFound(_))
    ));
    assert!(matches!(
        store.tags("missing").await,
        Err(ObjectStoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_local_store_overwrite_replaces_content_and_tags() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    store
        .put("key", Bytes::from("first"), &tags(&[("division", "A")]))
        .await
        .unwrap();
    store
        .put("key", Bytes::from("second"), &tags(&[("division", "B")]))
        .await
        .unwrap();

    assert_eq!(store.get("key").await.unwrap(), Bytes::from("second"));
    assert_eq!(store.tags("key").await.unwrap(), tags(&[("division", "B")]));
}

#[tokio::test]
async fn test_local_store_rejects_escaping_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path().join("root")).unwrap();

    for key in ["", "../outside", "a/../../b", "/abs", "a//b", ".tags/x", "a\\b"] {
        let result = store.put(key, Bytes::from("x"), &BlobTags::new()).await;
        assert!(
            matches!(result, Err(ObjectStoreError::InvalidKey(_))),
            "accepted {key:?}"
        );
    }
    assert!(!dir.path().join("outside").exists());
}
