//! End-to-end scan scenarios: catalog reconciliation over real temp-dir
//! trees and zip archives.

mod common;

use std::fs;
use std::sync::Arc;

use common::{CountingHandler, MarkerDecorator, ScanWorld, write_zip, zip_bytes};
use shelfscan::prelude::*;

#[test]
fn new_file_under_new_folders() {
    let world = ScanWorld::new();
    let path = world.write_file("a/x.mp4", b"movie body bytes");

    let report = world.scan();
    assert_eq!(report.files_new, 1);
    assert_eq!(report.folders_created, 2, "lib and lib/a");
    assert!(report.errors.is_empty());

    let file = world.file_at(&path).expect("file row");
    assert_eq!(file.size, 16);
    assert!(file.fingerprints.contains(FingerprintKind::Oshash));

    let parent = world.folder_at(path.parent().unwrap()).expect("parent row");
    assert_eq!(file.parent_folder_id, parent.id);
    world.assert_invariants();
}

#[test]
fn second_scan_is_a_noop() {
    let world = ScanWorld::new();
    world.write_file("a/x.mp4", b"movie body bytes");
    world.write_file("a/y.mp4", b"other movie bytes");

    let first = world.scan();
    assert_eq!(first.files_new, 2);

    let second = world.scan();
    assert!(second.is_noop(), "second scan must be a no-op: {second:?}");
    assert_eq!(second.files_unchanged, 2);
    world.assert_invariants();
}

#[test]
fn moved_file_is_repathed_not_recreated() {
    let world = ScanWorld::new();
    let old_path = world.write_file("a/x.mp4", b"movie body bytes");
    world.scan();
    let original = world.file_at(&old_path).unwrap();

    let new_dir = world.root.join("b");
    fs::create_dir_all(&new_dir).unwrap();
    let new_path = new_dir.join("x.mp4");
    fs::rename(&old_path, &new_path).unwrap();

    let report = world.scan();
    assert_eq!(report.files_renamed, 1);
    assert_eq!(report.files_new, 0);
    assert_eq!(report.folders_created, 1, "lib/b");

    let moved = world.file_at(&new_path).expect("repathed row");
    assert_eq!(moved.id, original.id);
    assert_eq!(moved.created_at, original.created_at);
    assert!(world.file_at(&old_path).is_none());
    assert_eq!(world.files().len(), 1);
    world.assert_invariants();

    // Move → scan → scan is a no-op again. The emptied source directory
    // changed mtime, so only folder rows may tick; file rows must not.
    let settle = world.scan();
    assert_eq!(settle.files_renamed + settle.files_new + settle.files_updated, 0);
}

#[test]
fn content_change_updates_in_place() {
    let world = ScanWorld::new();
    let path = world.write_file("a/x.mp4", b"movie body bytes");
    world.scan();
    let before = world.file_at(&path).unwrap();
    let old_oshash = before
        .fingerprints
        .get(FingerprintKind::Oshash)
        .unwrap()
        .to_string();

    fs::write(&path, b"rather different movie body").unwrap();
    world.touch(&path, 1_700_000_600);

    let report = world.scan();
    assert_eq!(report.files_updated, 1);
    assert_eq!(report.files_new, 0);

    let after = world.file_at(&path).unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.size, 27);
    assert_eq!(after.mod_time.timestamp(), 1_700_000_600);
    assert_ne!(
        after.fingerprints.get(FingerprintKind::Oshash).unwrap(),
        old_oshash
    );
    world.assert_invariants();
}

#[test]
fn zip_containment_and_archive_rename() {
    let world = ScanWorld::new();
    let zip_path = world.root.join("pack.zip");
    write_zip(&zip_path, &[("inside/y.jpg", b"jpeg body"), ("top.txt", b"t")]);

    let report = world.scan();
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    let zip_row = world.file_at(&zip_path).expect("archive file row");
    assert_eq!(zip_row.zip_file_id, None);

    let mount = world.folder_at(&zip_path).expect("mount folder row");
    assert_eq!(mount.zip_file_id, Some(zip_row.id));

    let inside = world
        .folder_at(&zip_path.join("inside"))
        .expect("inner folder row");
    assert_eq!(inside.zip_file_id, Some(zip_row.id));
    assert_eq!(inside.parent_folder_id, Some(mount.id));

    let inner = world
        .file_at(&zip_path.join("inside/y.jpg"))
        .expect("inner file row");
    assert_eq!(inner.zip_file_id, Some(zip_row.id));
    assert_eq!(inner.parent_folder_id, inside.id);
    assert_eq!(inner.size, 9);
    world.assert_invariants();

    // Rename the archive: the file row repaths, and every inner row's
    // path prefix is rewritten with zip_file_id values unchanged.
    let new_zip_path = world.root.join("archive.zip");
    fs::rename(&zip_path, &new_zip_path).unwrap();

    let report = world.scan();
    assert_eq!(report.files_renamed, 1);
    assert_eq!(report.files_new, 0);

    let renamed = world.file_at(&new_zip_path).expect("renamed archive row");
    assert_eq!(renamed.id, zip_row.id);

    let inner_after = world
        .file_at(&new_zip_path.join("inside/y.jpg"))
        .expect("inner row repathed");
    assert_eq!(inner_after.id, inner.id);
    assert_eq!(inner_after.zip_file_id, Some(zip_row.id));
    assert!(world.file_at(&zip_path.join("inside/y.jpg")).is_none());
    world.assert_invariants();

    let settle = world.scan();
    assert_eq!(settle.files_renamed + settle.files_new + settle.files_updated, 0);
}

#[test]
fn nested_archives_compose() {
    let world = ScanWorld::new();
    let inner_zip = zip_bytes(&[("leaf.txt", b"innermost body")]);
    let outer = world.root.join("outer.zip");
    write_zip(&outer, &[("nested.zip", &inner_zip)]);

    let report = world.scan();
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    let outer_row = world.file_at(&outer).expect("outer archive row");
    let nested_row = world
        .file_at(&outer.join("nested.zip"))
        .expect("nested archive row");
    assert_eq!(nested_row.zip_file_id, Some(outer_row.id));

    let leaf = world
        .file_at(&outer.join("nested.zip/leaf.txt"))
        .expect("leaf row");
    assert_eq!(leaf.zip_file_id, Some(nested_row.id));
    assert_eq!(leaf.size, 14);
    world.assert_invariants();
}

#[test]
fn case_only_rename_on_case_insensitive_fs() {
    let world = ScanWorld::new();
    let lower = world.write_file("A/x.mp4", b"movie body bytes");
    world.scan_case_insensitive();
    let original = world.file_at(&lower).unwrap();

    let upper = world.root.join("A/X.MP4");
    fs::rename(&lower, &upper).unwrap();
    // Keep the file's own mtime identical: only the name changed.
    world.touch(&upper, 1_700_000_000);

    let report = world.scan_case_insensitive();
    assert_eq!(report.files_new, 0, "no new row for a case-only rename");

    assert_eq!(world.files().len(), 1);
    let updated = world.file_at(&upper).expect("row rewritten to new case");
    assert_eq!(updated.id, original.id);
    assert_eq!(updated.basename, "X.MP4");
    world.assert_invariants();
}

#[test]
fn handlers_fire_exactly_once_per_event() {
    let world = ScanWorld::new();
    let handler = Arc::new(CountingHandler::default());
    let pipeline = ScanPipeline {
        handlers: vec![Arc::clone(&handler) as Arc<dyn Handler>],
        ..ScanPipeline::default()
    };

    let path = world.write_file("a/x.mp4", b"movie body bytes");
    world.scan_with(world.options(), pipeline.clone());
    {
        let calls = handler.calls.lock();
        assert_eq!(calls.len(), 1, "one create event");
        assert_eq!(calls[0], (path.clone(), None));
    }

    // Unchanged pass: no handler-required filters configured, no calls.
    world.scan_with(world.options(), pipeline.clone());
    assert_eq!(handler.calls.lock().len(), 1);

    // Update event carries the old snapshot.
    fs::write(&path, b"changed movie body bytes").unwrap();
    world.touch(&path, 1_700_000_700);
    world.scan_with(world.options(), pipeline.clone());
    {
        let calls = handler.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], (path.clone(), Some(path.clone())));
    }

    // Rename event carries the old path.
    let new_path = world.root.join("a/renamed.mp4");
    fs::rename(&path, &new_path).unwrap();
    world.scan_with(world.options(), pipeline);
    {
        let calls = handler.calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], (new_path, Some(path)));
    }
}

#[test]
fn handler_required_filters_gate_unchanged_files() {
    struct AcceptAll;
    impl Filter for AcceptAll {
        fn accept(&self, _file: &CatFile) -> bool {
            true
        }
    }

    let world = ScanWorld::new();
    world.write_file("a/x.mp4", b"movie body bytes");
    world.scan();

    let handler = Arc::new(CountingHandler::default());
    let pipeline = ScanPipeline {
        handlers: vec![Arc::clone(&handler) as Arc<dyn Handler>],
        handler_required_filters: vec![Arc::new(AcceptAll)],
        ..ScanPipeline::default()
    };
    let report = world.scan_with(world.options(), pipeline);
    assert_eq!(report.files_updated, 1, "handler-required files report updated");
    assert_eq!(handler.calls.lock().len(), 1);
}

#[test]
fn missing_metadata_is_repaired_on_unchanged_files() {
    let world = ScanWorld::new();
    let path = world.write_file("a/x.mp4", b"movie body bytes");

    // First scan without the decorator: no marker metadata.
    world.scan();
    let before = world.file_at(&path).unwrap();
    assert!(!before.metadata.contains_key("marker"));

    // Second scan with the decorator: unchanged file, metadata repaired.
    let pipeline = ScanPipeline {
        decorators: vec![Arc::new(MarkerDecorator::new("marker")) as Arc<dyn Decorator>],
        ..ScanPipeline::default()
    };
    let report = world.scan_with(world.options(), pipeline.clone());
    assert_eq!(report.files_updated, 1);
    let after = world.file_at(&path).unwrap();
    assert_eq!(after.metadata["marker"], serde_json::json!(true));
    assert_eq!(after.id, before.id);

    // Third scan: metadata present, nothing to repair.
    let report = world.scan_with(world.options(), pipeline);
    assert_eq!(report.files_updated, 0);
    assert_eq!(report.files_unchanged, 1);
}

#[test]
fn decorator_failure_skips_the_file_but_not_the_scan() {
    let world = ScanWorld::new();
    world.write_file("a/bad.mp4", b"will fail decoration");
    world.write_file("a/good.mp4", b"decorates fine here");

    struct SelectiveFailure;
    impl Decorator for SelectiveFailure {
        fn name(&self) -> &'static str {
            "selective"
        }
        fn decorate(&self, _fs: &dyn ScanFs, file: CatFile) -> Result<CatFile> {
            if file.basename == "bad.mp4" {
                return Err(ScanError::Runtime {
                    details: "unreadable container".to_string(),
                });
            }
            Ok(file)
        }
    }

    let pipeline = ScanPipeline {
        decorators: vec![Arc::new(SelectiveFailure) as Arc<dyn Decorator>],
        ..ScanPipeline::default()
    };
    let report = world.scan_with(world.options(), pipeline);
    assert_eq!(report.files_new, 1, "the healthy file lands");
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].path.ends_with("bad.mp4"));
    assert!(world.file_at(&world.root.join("a/bad.mp4")).is_none());
}

#[test]
fn pruned_directories_are_not_catalogued() {
    let world = ScanWorld::new();
    world.write_file("keep/x.mp4", b"kept movie bytes");
    world.write_file("skip/y.mp4", b"skipped movie bytes");

    let pipeline = ScanPipeline {
        scan_filters: vec![
            Arc::new(ExcludePatternFilter::new(&["/skip"], true).unwrap()) as Arc<dyn PathFilter>,
        ],
        ..ScanPipeline::default()
    };
    let report = world.scan_with(world.options(), pipeline);
    assert_eq!(report.files_new, 1);
    assert!(world.folder_at(&world.root.join("skip")).is_none());
    assert!(world.file_at(&world.root.join("skip/y.mp4")).is_none());
    assert!(world.file_at(&world.root.join("keep/x.mp4")).is_some());
}

#[test]
fn extension_filters_limit_file_intake() {
    let world = ScanWorld::new();
    world.write_file("a/x.mp4", b"movie body bytes");
    world.write_file("a/notes.txt", b"not media at all");

    let pipeline = ScanPipeline {
        scan_filters: vec![Arc::new(ExtensionFilter::new(["mp4"])) as Arc<dyn PathFilter>],
        ..ScanPipeline::default()
    };
    let report = world.scan_with(world.options(), pipeline);
    assert_eq!(report.files_new, 1);
    assert!(world.file_at(&world.root.join("a/notes.txt")).is_none());
}

#[test]
fn cancelled_scan_exits_cleanly() {
    let world = ScanWorld::new();
    world.write_file("a/x.mp4", b"movie body bytes");

    let cancel = CancelToken::new();
    cancel.cancel();
    let report = Scanner::new(world.catalog.clone(), world.options(), ScanPipeline::default())
        .scan(&cancel)
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(report.files_new, 0);
    assert!(world.files().is_empty());
}

#[test]
fn md5_option_enriches_fingerprints() {
    let world = ScanWorld::new();
    let path = world.write_file("a/x.mp4", b"movie body bytes");

    let options = ScanOptions {
        calculate_md5: true,
        ..world.options()
    };
    let pipeline = ScanPipeline {
        calculator: Arc::new(StdCalculator::from_options(&options)),
        ..ScanPipeline::default()
    };
    world.scan_with(options, pipeline);

    let file = world.file_at(&path).unwrap();
    assert!(file.fingerprints.contains(FingerprintKind::Oshash));
    assert!(file.fingerprints.contains(FingerprintKind::Md5));
}

#[test]
fn enabling_md5_later_fills_existing_rows() {
    let world = ScanWorld::new();
    let path = world.write_file("a/x.mp4", b"movie body bytes");
    world.scan();
    assert!(
        !world
            .file_at(&path)
            .unwrap()
            .fingerprints
            .contains(FingerprintKind::Md5)
    );

    let options = ScanOptions {
        calculate_md5: true,
        ..world.options()
    };
    let pipeline = ScanPipeline {
        calculator: Arc::new(StdCalculator::from_options(&options)),
        ..ScanPipeline::default()
    };
    let report = world.scan_with(options.clone(), pipeline.clone());
    assert_eq!(report.files_updated, 1, "fingerprint fill counts as update");
    assert!(
        world
            .file_at(&path)
            .unwrap()
            .fingerprints
            .contains(FingerprintKind::Md5)
    );

    let settle = world.scan_with(options, pipeline);
    assert_eq!(settle.files_updated, 0);
}

#[test]
fn stale_digest_kinds_are_dropped_on_update() {
    let world = ScanWorld::new();
    let path = world.write_file("a/x.mp4", b"movie body bytes");

    // First catalogued while SHA-256 is enabled.
    let sha_options = ScanOptions {
        calculate_sha256: true,
        ..world.options()
    };
    let sha_pipeline = ScanPipeline {
        calculator: Arc::new(StdCalculator::from_options(&sha_options)),
        ..ScanPipeline::default()
    };
    world.scan_with(sha_options, sha_pipeline);
    let before = world.file_at(&path).unwrap();
    assert!(before.fingerprints.contains(FingerprintKind::Sha256));

    // SHA-256 disabled again; the content changes. The update stores
    // exactly the freshly computed set, so the old SHA-256 (stale for
    // the new bytes) is gone.
    fs::write(&path, b"a rather different body").unwrap();
    world.touch(&path, 1_700_000_800);
    let report = world.scan();
    assert_eq!(report.files_updated, 1);

    let after = world.file_at(&path).unwrap();
    assert_eq!(after.fingerprints.len(), 1);
    assert!(after.fingerprints.contains(FingerprintKind::Oshash));
    assert!(!after.fingerprints.contains(FingerprintKind::Sha256));
}

#[test]
fn forced_rescan_reprocesses_everything() {
    let world = ScanWorld::new();
    world.write_file("a/x.mp4", b"movie body bytes");
    world.scan();

    let options = ScanOptions {
        rescan: true,
        ..world.options()
    };
    let report = world.scan_with(options, ScanPipeline::default());
    assert_eq!(report.files_updated, 1);
    assert_eq!(report.files_unchanged, 0);
}

#[test]
fn folder_move_repaths_descendant_folders() {
    let world = ScanWorld::new();
    world.write_file("old/videos/deep/x.mp4", b"movie body bytes");
    world.scan();
    let deep_before = world
        .folder_at(&world.root.join("old/videos/deep"))
        .unwrap();

    fs::rename(world.root.join("old/videos"), world.root.join("videos")).unwrap();
    // Remove the emptied parent so its row is simply stale, not part of
    // this assertion.
    fs::remove_dir(world.root.join("old")).unwrap();

    let report = world.scan();
    assert!(report.folders_moved >= 1, "{report:?}");

    let deep_after = world.folder_at(&world.root.join("videos/deep")).unwrap();
    assert_eq!(deep_after.id, deep_before.id);
    assert!(world.folder_at(&world.root.join("old/videos/deep")).is_none());
}

#[test]
fn report_json_is_operator_friendly() {
    let world = ScanWorld::new();
    world.write_file("a/x.mp4", b"movie body bytes");
    let report = world.scan();
    let json = report.to_json_pretty();
    assert!(json.contains("\"files_new\": 1"));
    let parsed: ScanReport = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, report);
}
