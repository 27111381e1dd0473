use tempfile::tempdir;
use triplestore::{DatasetConfig, Triple, TripleClient, TripleStoreError};

#[test]
fn test_client_calls_each_run_in_their_own_transaction() {
    let client = TripleClient::in_memory().expect("client");
    let loaded = client
        .load_graph(
            "g",
            vec![
                Triple::new("a", "p", "b"),
                Triple::new("a", "p", "c"),
                Triple::new("a", "p", "b"),
            ],
        )
        .expect("load");
    assert_eq!(loaded, 2);
    assert_eq!(client.dataset().version().expect("version"), 1);

    client.add_statement("g", "d", "p", "b").expect("add");
    assert_eq!(client.dataset().version().expect("version"), 2);

    let matches = client
        .get_statements("g", None, None, Some("b"))
        .expect("query");
    assert_eq!(matches.len(), 2);
    assert!(client.get_statements("missing", None, None, None).expect("query").is_empty());
}

#[test]
fn test_client_query_leaves_no_reader_open() {
    let client = TripleClient::in_memory().expect("client");
    client.add_statement("g", "a", "p", "b").expect("add");
    client.get_statements("g", None, None, None).expect("query");
    let stats = client.dataset().stats().expect("stats");
    assert_eq!(stats.active_readers, 0);
    assert!(!stats.writer_active);

    client.dataset().close().expect("close");
    let err = client.get_statements("g", None, None, None).unwrap_err();
    assert!(matches!(err, TripleStoreError::DatasetClosed));
}

#[test]
fn test_client_rejects_blank_positions() {
    let client = TripleClient::in_memory().expect("client");
    let err = client.add_statement("g", "a", "", "b").unwrap_err();
    assert!(matches!(err, TripleStoreError::InvalidTriple(_)));
    assert_eq!(client.dataset().version().expect("version"), 0);
}

#[test]
fn test_client_reopens_sqlite_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("client.db");

    let client = TripleClient::open(&path, &DatasetConfig::sqlite()).expect("open");
    client.add_statement("g", "a", "p", "b").expect("add");
    client.close().expect("close");

    let client = TripleClient::open(&path, &DatasetConfig::sqlite()).expect("reopen");
    assert_eq!(
        client.get_statements("g", Some("a"), None, None).expect("query"),
        vec![Triple::new("a", "p", "b")]
    );
    assert!(client.remove_statement("g", "a", "p", "b").expect("remove"));
    assert!(!client.remove_statement("g", "a", "p", "b").expect("remove again"));
}
