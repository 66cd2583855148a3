//! Shared test infrastructure for shelfscan.
//!
//! Provides:
//! - `ScanWorld` — temp-dir library + catalog + scanner wiring
//! - `CaseInsensitiveFs` — native FS reporting case-insensitive semantics
//! - `CountingHandler` — records every handler invocation
//! - zip fixture builder

// Not every test binary uses every item; suppress dead-code warnings for
// the shared module.
#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tempfile::TempDir;

use shelfscan::prelude::*;

// ──────────────────── scan world ────────────────────

/// A disposable library root plus catalog, with scanner wiring.
pub struct ScanWorld {
    pub tmp: TempDir,
    pub root: PathBuf,
    pub catalog: Catalog,
}

impl ScanWorld {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("lib");
        fs::create_dir_all(&root).unwrap();
        let catalog = Catalog::open(&tmp.path().join("catalog.db")).unwrap();
        Self { tmp, root, catalog }
    }

    pub fn options(&self) -> ScanOptions {
        ScanOptions {
            roots: vec![self.root.clone()],
            parallelism: 2,
            ..ScanOptions::default()
        }
    }

    pub fn scan(&self) -> ScanReport {
        self.scan_with(self.options(), ScanPipeline::default())
    }

    pub fn scan_with(&self, options: ScanOptions, pipeline: ScanPipeline) -> ScanReport {
        Scanner::new(self.catalog.clone(), options, pipeline)
            .scan(&CancelToken::new())
            .unwrap()
    }

    pub fn scan_case_insensitive(&self) -> ScanReport {
        Scanner::new(self.catalog.clone(), self.options(), ScanPipeline::default())
            .with_root_fs(Arc::new(CaseInsensitiveFs::new()))
            .scan(&CancelToken::new())
            .unwrap()
    }

    /// Write a file and pin its mtime to a stable whole second.
    pub fn write_file(&self, rel: &str, contents: &[u8]) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        let mtime = filetime::FileTime::from_unix_time(1_700_000_000, 0);
        filetime::set_file_mtime(&path, mtime).unwrap();
        path
    }

    pub fn touch(&self, path: &Path, unix_secs: i64) {
        filetime::set_file_mtime(path, filetime::FileTime::from_unix_time(unix_secs, 0)).unwrap();
    }

    pub fn folders(&self) -> Vec<Folder> {
        let mut conn = self.catalog.connect().unwrap();
        conn.with_read_txn(|txn| txn.folders().all()).unwrap()
    }

    pub fn files(&self) -> Vec<CatFile> {
        let mut conn = self.catalog.connect().unwrap();
        conn.with_read_txn(|txn| txn.files().all()).unwrap()
    }

    pub fn folder_at(&self, path: &Path) -> Option<Folder> {
        let conn = self.catalog.connect().unwrap();
        conn.with_db(|db| db.folders().find_by_path(path, true)).unwrap()
    }

    pub fn file_at(&self, path: &Path) -> Option<CatFile> {
        let conn = self.catalog.connect().unwrap();
        conn.with_db(|db| db.files().find_by_path(path, true)).unwrap()
    }

    /// Check the structural invariants over the whole catalog: parent
    /// integrity (under archive scoping) and path uniqueness.
    pub fn assert_invariants(&self) {
        let folders = self.folders();
        let files = self.files();

        let mut folder_paths = std::collections::BTreeSet::new();
        for folder in &folders {
            assert!(
                folder_paths.insert(folder.path.clone()),
                "duplicate folder path {}",
                folder.path.display()
            );
        }
        let mut file_paths = std::collections::BTreeSet::new();
        for file in &files {
            assert!(
                file_paths.insert(file.path.clone()),
                "duplicate file path {}",
                file.path.display()
            );
        }

        let folder_by_id: std::collections::HashMap<_, _> =
            folders.iter().map(|f| (f.id, f)).collect();
        let file_by_id: std::collections::HashMap<_, _> =
            files.iter().map(|f| (f.id, f)).collect();

        for file in &files {
            let parent = folder_by_id
                .get(&file.parent_folder_id)
                .unwrap_or_else(|| panic!("file {} has no parent folder", file.path.display()));
            assert_eq!(
                Some(parent.path.as_path()),
                file.path.parent(),
                "file {} parent path mismatch",
                file.path.display()
            );
            assert_eq!(
                parent.zip_file_id, file.zip_file_id,
                "file {} crosses archive scopes",
                file.path.display()
            );
        }

        for folder in &folders {
            let Some(parent_id) = folder.parent_folder_id else {
                continue; // top-level root
            };
            let parent = folder_by_id
                .get(&parent_id)
                .unwrap_or_else(|| panic!("folder {} has no parent", folder.path.display()));
            assert_eq!(
                Some(parent.path.as_path()),
                folder.path.parent(),
                "folder {} parent path mismatch",
                folder.path.display()
            );
            let is_mount_root = folder
                .zip_file_id
                .and_then(|id| file_by_id.get(&id))
                .is_some_and(|zip| zip.path == folder.path);
            if !is_mount_root {
                assert_eq!(
                    parent.zip_file_id, folder.zip_file_id,
                    "folder {} crosses archive scopes",
                    folder.path.display()
                );
            }
        }
    }
}

// ──────────────────── zip fixtures ────────────────────

/// Build a zip file at `path` with the given (name, contents) entries.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    let bytes = writer.finish().unwrap().into_inner();
    fs::write(path, bytes).unwrap();
    filetime::set_file_mtime(path, filetime::FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
}

/// Zip bytes in memory (for nesting).
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

// ──────────────────── doubles ────────────────────

/// The native filesystem, but claiming case-insensitive semantics at
/// every path. Lets case-only-rename behavior run on case-sensitive CI
/// hosts.
pub struct CaseInsensitiveFs {
    inner: NativeFs,
}

impl CaseInsensitiveFs {
    pub fn new() -> Self {
        Self {
            inner: NativeFs::new(),
        }
    }
}

impl ScanFs for CaseInsensitiveFs {
    fn stat(&self, path: &Path) -> std::io::Result<EntryInfo> {
        self.inner.stat(path)
    }

    fn lstat(&self, path: &Path) -> std::io::Result<EntryInfo> {
        self.inner.lstat(path)
    }

    fn open(&self, path: &Path) -> std::io::Result<Box<dyn shelfscan::fsys::ReadSeek + Send>> {
        self.inner.open(path)
    }

    fn walk(
        &self,
        root: &Path,
    ) -> std::io::Result<
        Box<dyn Iterator<Item = std::io::Result<(PathBuf, EntryInfo)>> + Send + '_>,
    > {
        self.inner.walk(root)
    }

    fn is_case_sensitive(&self, _path: &Path) -> bool {
        false
    }

    fn open_zip(&self, path: &Path) -> Result<Arc<dyn ScanFs>> {
        self.inner.open_zip(path)
    }
}

/// Records every invocation: (new path, old path if any).
#[derive(Default)]
pub struct CountingHandler {
    pub calls: Mutex<Vec<(PathBuf, Option<PathBuf>)>>,
}

impl Handler for CountingHandler {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn handle(
        &self,
        _txn: &ScanTxn<'_>,
        new_file: &CatFile,
        old_file: Option<&CatFile>,
    ) -> Result<()> {
        self.calls
            .lock()
            .push((new_file.path.clone(), old_file.map(|f| f.path.clone())));
        Ok(())
    }
}

/// Stamps a marker key into file metadata; reports it missing otherwise.
pub struct MarkerDecorator {
    pub key: &'static str,
    pub fail: AtomicBool,
}

impl MarkerDecorator {
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            fail: AtomicBool::new(false),
        }
    }
}

impl Decorator for MarkerDecorator {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn decorate(&self, _fs: &dyn ScanFs, mut file: CatFile) -> Result<CatFile> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScanError::Runtime {
                details: "decorator offline".to_string(),
            });
        }
        file.metadata
            .insert(self.key.to_string(), serde_json::json!(true));
        Ok(file)
    }

    fn is_missing_metadata(&self, _fs: &dyn ScanFs, file: &CatFile) -> bool {
        !file.metadata.contains_key(self.key)
    }
}
