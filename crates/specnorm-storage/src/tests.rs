//! Store, dedup gate and persistence tests

use super::*;
use chrono::{Duration, Utc};
use specnorm_core::{
    CanonicalField, CanonicalSpec, CanonicalValue, ContentKind, Extraction, FallbackStatus,
    FieldValue, Provenance, RawSpecMap,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use uuid::Uuid;

fn source() -> SourceId {
    SourceId::new("LBX", "https://vendor.example/lbx")
}

fn fetched(bytes: &str) -> FetchedContent {
    FetchedContent::new(source(), ContentKind::DocumentText, bytes.as_bytes().to_vec())
}

/// Extractor stand-in that counts its calls and records one pair.
fn counting_extractor(calls: &AtomicUsize) -> impl FnOnce(ContentKind, &[u8]) -> Extraction + '_ {
    move |_, bytes| {
        calls.fetch_add(1, Ordering::SeqCst);
        let mut raw_specs = RawSpecMap::new();
        raw_specs.insert("Wavelength", String::from_utf8_lossy(bytes).into_owned());
        Extraction {
            raw_specs,
            ..Extraction::default()
        }
    }
}

fn test_gate() -> (DedupGate, Arc<MemoryDocumentStore>) {
    let store = Arc::new(MemoryDocumentStore::new());
    (DedupGate::new(store.clone()), store)
}

fn snapshot(product: &ProductKey, input: &str, wavelength: f64) -> NormalizedSnapshot {
    let mut spec = CanonicalSpec::default();
    spec.set(
        CanonicalField::WavelengthNm,
        FieldValue {
            value: CanonicalValue::Numeric(wavelength),
            provenance: Provenance::Heuristic,
            verbatim: Some(format!("{wavelength} nm")),
            source_key: Some("Wavelength".to_string()),
        },
    )
    .unwrap();
    NormalizedSnapshot {
        id: Uuid::new_v4(),
        product: product.clone(),
        taken_at: Utc::now(),
        spec,
        vendor_fields: Default::default(),
        source_documents: Vec::new(),
        input_fingerprint: Fingerprint::of(input.as_bytes()),
        fallback: FallbackStatus::NotNeeded,
    }
}

// ============================================================================
// Dedup gate
// ============================================================================

#[test]
fn test_same_content_is_one_version() {
    let (gate, store) = test_gate();
    let calls = AtomicUsize::new(0);

    let first = gate.admit(&fetched("488 nm"), counting_extractor(&calls));
    let second = gate.admit(&fetched("488 nm"), counting_extractor(&calls));

    assert!(matches!(first, AdmitOutcome::New(_)));
    assert!(second.is_unchanged());
    assert_eq!(second.document().version, 1);
    assert_eq!(store.versions(&source()).len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "unchanged bytes are not re-extracted");
}

#[test]
fn test_changed_content_is_new_version() {
    let (gate, store) = test_gate();
    let calls = AtomicUsize::new(0);

    gate.admit(&fetched("488 nm"), counting_extractor(&calls));
    let outcome = gate.admit(&fetched("532 nm"), counting_extractor(&calls));

    match outcome {
        AdmitOutcome::Updated {
            document,
            superseded,
        } => {
            assert_eq!(document.version, 2);
            assert_eq!(superseded, 1);
        }
        other => panic!("expected update, got {other:?}"),
    }

    let versions = store.versions(&source());
    assert_eq!(versions.len(), 2);
    assert_eq!(
        versions[0].raw_specs.get("wavelength").unwrap().value,
        "488 nm".into(),
        "earlier version is untouched"
    );
    assert_eq!(store.latest(&source()).unwrap().version, 2);
}

#[test]
fn test_reverted_content_becomes_current_version() {
    let (gate, store) = test_gate();
    let calls = AtomicUsize::new(0);

    gate.admit(&fetched("488 nm"), counting_extractor(&calls));
    gate.admit(&fetched("532 nm"), counting_extractor(&calls));
    let reverted = gate.admit(&fetched("488 nm"), counting_extractor(&calls));

    match reverted {
        AdmitOutcome::Updated {
            document,
            superseded,
        } => {
            assert_eq!(document.version, 3);
            assert_eq!(superseded, 2);
        }
        other => panic!("expected update, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let latest = store.latest(&source()).unwrap();
    assert_eq!(latest.fingerprint, fetched("488 nm").fingerprint());
    assert_eq!(
        latest.raw_specs.get("wavelength").unwrap().value,
        "488 nm".into()
    );
    assert_eq!(store.documents_for_product("LBX")[0].version, 3);

    // the reverted bytes now dedup against v3
    let again = gate.admit(&fetched("488 nm"), counting_extractor(&calls));
    assert!(again.is_unchanged());
    assert_eq!(again.document().version, 3);
}

#[test]
fn test_forced_refresh_of_identical_bytes_still_dedups() {
    let (gate, store) = test_gate();
    let calls = AtomicUsize::new(0);

    gate.admit(&fetched("488 nm"), counting_extractor(&calls));
    let mut again = fetched("488 nm");
    again.force_refresh = true;
    assert!(gate.admit(&again, counting_extractor(&calls)).is_unchanged());
    assert_eq!(store.versions(&source()).len(), 1);
}

#[test]
fn test_concurrent_identical_fetches_commit_once() {
    let (gate, store) = test_gate();
    let gate = Arc::new(gate);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gate = gate.clone();
            std::thread::spawn(move || {
                let calls = AtomicUsize::new(0);
                gate.admit(&fetched("same bytes"), counting_extractor(&calls))
            })
        })
        .collect();

    let outcomes: Vec<AdmitOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let new = outcomes
        .iter()
        .filter(|o| matches!(o, AdmitOutcome::New(_)))
        .count();

    assert_eq!(new, 1);
    assert!(outcomes.iter().all(|o| o.document().version == 1));
    assert_eq!(store.versions(&source()).len(), 1);
}

#[test]
fn test_documents_for_product_returns_latest_per_source() {
    let (gate, store) = test_gate();
    let calls = AtomicUsize::new(0);
    let other = FetchedContent::new(
        SourceId::new("LBX", "https://vendor.example/lbx.pdf"),
        ContentKind::DocumentText,
        b"405 nm".to_vec(),
    );

    gate.admit(&fetched("488 nm"), counting_extractor(&calls));
    gate.admit(&fetched("532 nm"), counting_extractor(&calls));
    gate.admit(&other, counting_extractor(&calls));

    let docs = store.documents_for_product("LBX");
    assert_eq!(docs.len(), 2);
    let page = docs.iter().find(|d| d.source == source()).unwrap();
    assert_eq!(page.version, 2);
    assert_eq!(store.products(), vec!["LBX".to_string()]);
    assert!(store.documents_for_product("OTHER").is_empty());
}

// ============================================================================
// Snapshots
// ============================================================================

#[test]
fn test_append_if_changed_skips_identical_input() {
    let store = MemorySnapshotStore::new();
    let product = ProductKey::family("LBX");

    let first = store
        .append_if_changed(snapshot(&product, "merged-a", 488.0))
        .unwrap();
    let same = store
        .append_if_changed(snapshot(&product, "merged-a", 488.0))
        .unwrap();
    let changed = store
        .append_if_changed(snapshot(&product, "merged-b", 532.0))
        .unwrap();

    assert_eq!(first, AppendOutcome::Appended);
    assert_eq!(same, AppendOutcome::Unchanged);
    assert_eq!(changed, AppendOutcome::Appended);

    let history = store.history(&product);
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[0].spec.value(CanonicalField::WavelengthNm),
        Some(&CanonicalValue::Numeric(488.0))
    );
    assert_eq!(
        store
            .latest(&product)
            .unwrap()
            .spec
            .value(CanonicalField::WavelengthNm),
        Some(&CanonicalValue::Numeric(532.0))
    );
}

#[test]
fn test_duplicate_snapshot_id_rejected() {
    let store = MemorySnapshotStore::new();
    let snap = snapshot(&ProductKey::family("LBX"), "merged", 488.0);
    store.append(snap.clone()).unwrap();
    assert!(matches!(
        store.append(snap),
        Err(StoreError::DuplicateSnapshot { .. })
    ));
}

#[test]
fn test_model_histories_are_separate() {
    let store = MemorySnapshotStore::new();
    let family = ProductKey::family("LuxX+");
    let model = ProductKey::model("LuxX+", "LuxX+ 488-50");

    store.append(snapshot(&family, "f", 488.0)).unwrap();
    store.append(snapshot(&model, "m", 488.0)).unwrap();

    assert_eq!(store.history(&family).len(), 1);
    assert_eq!(store.history(&model).len(), 1);
    assert_eq!(store.all().len(), 2);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_json_directory_round_trip() {
    let dir = tempdir().unwrap();
    let disk = JsonDirectory::new(dir.path());

    let (gate, docs) = test_gate();
    let calls = AtomicUsize::new(0);
    gate.admit(&fetched("488 nm"), counting_extractor(&calls));
    gate.admit(&fetched("532 nm"), counting_extractor(&calls));

    let snapshots = MemorySnapshotStore::new();
    let product = ProductKey::family("LBX");
    let mut older = snapshot(&product, "a", 488.0);
    older.taken_at = Utc::now() - Duration::minutes(5);
    snapshots.append(older).unwrap();
    snapshots.append(snapshot(&product, "b", 532.0)).unwrap();

    assert_eq!(disk.save_documents(docs.as_ref()).unwrap(), 2);
    assert_eq!(disk.save_snapshots(&snapshots).unwrap(), 2);
    assert!(dir.path().join("raw_documents.json").exists());
    assert!(!dir.path().join("raw_documents.json.tmp").exists());

    let docs_back = disk.load_documents().unwrap();
    assert_eq!(docs_back.all(), docs.all());

    let snaps_back = disk.load_snapshots().unwrap();
    assert_eq!(snaps_back.history(&product), snapshots.history(&product));
}

#[test]
fn test_loading_empty_directory_gives_empty_stores() {
    let dir = tempdir().unwrap();
    let disk = JsonDirectory::new(dir.path().join("not-yet-created"));
    assert!(disk.load_documents().unwrap().all().is_empty());
    assert!(disk.load_snapshots().unwrap().all().is_empty());
}

#[test]
fn test_version_gap_is_rejected_on_restore() {
    let (gate, docs) = test_gate();
    let calls = AtomicUsize::new(0);
    gate.admit(&fetched("488 nm"), counting_extractor(&calls));
    gate.admit(&fetched("532 nm"), counting_extractor(&calls));

    let only_second: Vec<RawDocument> = docs.all().into_iter().filter(|d| d.version == 2).collect();
    assert!(matches!(
        MemoryDocumentStore::from_documents(only_second),
        Err(StoreError::VersionGap {
            found: 2,
            expected: 1,
            ..
        })
    ));
}
