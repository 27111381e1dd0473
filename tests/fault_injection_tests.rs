use parking_lot::{Mutex, const_mutex};
use tempfile::tempdir;
use triplestore::{
    DatasetConfig, Pattern, Triple, TripleStoreError, TxnMode, TxnState,
    fault_injection::{FaultPoint, configure_fault, pending_faults, reset_faults},
    open_dataset,
};

// The fault registry is process-wide.
static FAULT_LOCK: Mutex<()> = const_mutex(());

fn t(s: &str, p: &str, o: &str) -> Triple {
    Triple::new(s, p, o)
}

#[test]
fn test_failed_persist_leaves_nothing_visible() {
    let _guard = FAULT_LOCK.lock();
    reset_faults();
    let dataset = open_dataset("", &DatasetConfig::memory()).expect("dataset");

    configure_fault(FaultPoint::CommitBeforePersist, 1);
    let mut txn = dataset.begin(TxnMode::Write).expect("begin");
    txn.add_statement("g", &t("a", "p", "b")).expect("add");
    let err = txn.commit().unwrap_err();
    assert!(matches!(err, TripleStoreError::StorageIo(_)));
    assert!(err.is_retryable());
    assert_eq!(txn.state(), TxnState::Aborted);
    assert_eq!(dataset.version().expect("version"), 0);

    let mut retry = dataset.begin(TxnMode::Write).expect("writer slot released");
    retry.add_statement("g", &t("a", "p", "b")).expect("add");
    assert_eq!(retry.commit().expect("retry commits"), 1);
    reset_faults();
}

#[test]
fn test_sqlite_rollback_keeps_disk_and_memory_consistent() {
    let _guard = FAULT_LOCK.lock();
    reset_faults();
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("fault.db");

    let dataset = open_dataset(&path, &DatasetConfig::sqlite()).expect("dataset");
    dataset
        .load_statements("g", vec![t("a", "p", "b")])
        .expect("load");

    configure_fault(FaultPoint::SqliteBeforeFlush, 1);
    let result = dataset.write(|txn| {
        txn.remove_statement("g", &t("a", "p", "b"))?;
        txn.add_statement("g", &t("c", "p", "d"))?;
        Ok(())
    });
    assert!(matches!(result, Err(TripleStoreError::StorageIo(_))));

    let visible = dataset
        .read(|txn| Ok(txn.get_statements("g", &Pattern::any())?.to_vec()))
        .expect("read");
    assert_eq!(visible, vec![t("a", "p", "b")]);
    dataset.close().expect("close");

    let reopened = open_dataset(&path, &DatasetConfig::sqlite()).expect("reopen");
    assert_eq!(reopened.version().expect("version"), 1);
    let stored = reopened
        .read(|txn| Ok(txn.get_statements("g", &Pattern::any())?.to_vec()))
        .expect("read");
    assert_eq!(stored, vec![t("a", "p", "b")]);
    reset_faults();
}

#[test]
fn test_armed_point_fails_consecutive_commits_then_disarms() {
    let _guard = FAULT_LOCK.lock();
    reset_faults();
    let dataset = open_dataset("", &DatasetConfig::memory()).expect("dataset");

    configure_fault(FaultPoint::CommitBeforePersist, 2);
    for left in [1, 0] {
        let err = dataset
            .load_statements("g", vec![t("a", "p", "b")])
            .unwrap_err();
        assert!(err.to_string().contains("before persisting"), "{err}");
        assert_eq!(pending_faults(FaultPoint::CommitBeforePersist), left);
    }
    assert_eq!(dataset.stats().expect("stats").interned_identifiers, 0);
    assert_eq!(dataset.load_statements("g", vec![t("a", "p", "b")]).expect("load"), 1);
    assert_eq!(dataset.version().expect("version"), 1);

    configure_fault(FaultPoint::SqliteBeforeFlush, 3);
    configure_fault(FaultPoint::SqliteBeforeFlush, 0);
    assert_eq!(pending_faults(FaultPoint::SqliteBeforeFlush), 0);
    reset_faults();
}
