//! File table access, including fingerprint sets.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::core::errors::{Result, ScanError};
use crate::model::{self, CatFile, FileId, Fingerprint, FingerprintKind, FingerprintSet, FolderId};

const FILE_COLS: &str =
    "id, path, basename, parent_folder_id, zip_file_id, size, mod_time, metadata, created_at, updated_at";

/// Prepared-statement access to the `files` and `fingerprints` tables
/// within one transaction or probe scope.
pub struct FileStore<'c> {
    pub(crate) conn: &'c Connection,
}

impl FileStore<'_> {
    /// Look up a file by exact or case-folded path.
    pub fn find_by_path(&self, path: &Path, case_sensitive: bool) -> Result<Option<CatFile>> {
        let sql = if case_sensitive {
            format!("SELECT {FILE_COLS} FROM files WHERE path = ?1 LIMIT 1")
        } else {
            format!(
                "SELECT {FILE_COLS} FROM files WHERE path = ?1 COLLATE NOCASE \
                 ORDER BY id ASC LIMIT 1"
            )
        };
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let row = stmt
            .query_row(params![path_str(path)], row_to_file)
            .optional()?;
        row.map(|f| self.with_fingerprints(f)).transpose()
    }

    /// Look up a file by id.
    pub fn find_by_id(&self, id: FileId) -> Result<Option<CatFile>> {
        let sql = format!("SELECT {FILE_COLS} FROM files WHERE id = ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let row = stmt.query_row(params![id.0], row_to_file).optional()?;
        row.map(|f| self.with_fingerprints(f)).transpose()
    }

    /// Rename candidates: files carrying the given fingerprint, in
    /// ascending id order (the deterministic tie-break).
    pub fn find_by_fingerprint(&self, fp: &Fingerprint) -> Result<Vec<CatFile>> {
        let sql = format!(
            "SELECT {FILE_COLS} FROM files \
             JOIN fingerprints ON fingerprints.file_id = files.id \
             WHERE fingerprints.kind = ?1 AND fingerprints.value = ?2 \
             ORDER BY files.id ASC"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![fp.kind.as_str(), fp.value], row_to_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|f| self.with_fingerprints(f))
            .collect()
    }

    /// Files living directly inside the given archive.
    pub fn find_by_zip_file_id(&self, zip_file_id: FileId) -> Result<Vec<CatFile>> {
        let sql = format!("SELECT {FILE_COLS} FROM files WHERE zip_file_id = ?1 ORDER BY id ASC");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![zip_file_id.0], row_to_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|f| self.with_fingerprints(f))
            .collect()
    }

    /// Insert a file (and its fingerprints) and assign its id.
    pub fn create(&self, file: &mut CatFile) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO files (path, basename, parent_folder_id, zip_file_id, size,
                 mod_time, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?
            .execute(params![
                path_str(&file.path),
                file.basename,
                file.parent_folder_id.0,
                file.zip_file_id.map(|id| id.0),
                i64::try_from(file.size).unwrap_or(i64::MAX),
                model::format_timestamp(file.mod_time),
                serde_json::Value::Object(file.metadata.clone()).to_string(),
                model::format_timestamp(file.created_at),
                model::format_timestamp(file.updated_at),
            ])?;
        file.id = FileId(self.conn.last_insert_rowid());
        self.write_fingerprints(file.id, &file.fingerprints)?;
        Ok(())
    }

    /// Persist all mutable attributes of an existing file. The stored
    /// fingerprint set is replaced wholesale by the in-memory one.
    pub fn update(&self, file: &CatFile) -> Result<()> {
        self.conn
            .prepare_cached(
                "UPDATE files SET path = ?2, basename = ?3, parent_folder_id = ?4,
                 zip_file_id = ?5, size = ?6, mod_time = ?7, metadata = ?8, updated_at = ?9
                 WHERE id = ?1",
            )?
            .execute(params![
                file.id.0,
                path_str(&file.path),
                file.basename,
                file.parent_folder_id.0,
                file.zip_file_id.map(|id| id.0),
                i64::try_from(file.size).unwrap_or(i64::MAX),
                model::format_timestamp(file.mod_time),
                serde_json::Value::Object(file.metadata.clone()).to_string(),
                model::format_timestamp(file.updated_at),
            ])?;
        self.conn
            .prepare_cached("DELETE FROM fingerprints WHERE file_id = ?1")?
            .execute(params![file.id.0])?;
        self.write_fingerprints(file.id, &file.fingerprints)?;
        Ok(())
    }

    /// Every file row, in ascending id order.
    pub fn all(&self) -> Result<Vec<CatFile>> {
        let sql = format!("SELECT {FILE_COLS} FROM files ORDER BY id ASC");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map([], row_to_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|f| self.with_fingerprints(f))
            .collect()
    }

    /// Total file count (test and report support).
    pub fn count(&self) -> Result<i64> {
        let count = self
            .conn
            .prepare_cached("SELECT COUNT(*) FROM files")?
            .query_row([], |row| row.get(0))?;
        Ok(count)
    }

    fn write_fingerprints(&self, file_id: FileId, set: &FingerprintSet) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO fingerprints (file_id, kind, value) VALUES (?1, ?2, ?3)")?;
        for fp in set.iter() {
            stmt.execute(params![file_id.0, fp.kind.as_str(), fp.value])?;
        }
        Ok(())
    }

    fn with_fingerprints(&self, mut file: CatFile) -> Result<CatFile> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT kind, value FROM fingerprints WHERE file_id = ?1")?;
        let rows = stmt.query_map(params![file.id.0], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut set = FingerprintSet::new();
        for row in rows {
            let (kind_raw, value) = row?;
            let kind = FingerprintKind::from_str(&kind_raw).map_err(|details| {
                ScanError::Fingerprint {
                    path: file.path.clone(),
                    details,
                }
            })?;
            set.insert(Fingerprint::new(kind, value));
        }
        file.fingerprints = set;
        Ok(file)
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<CatFile> {
    let metadata_raw: String = row.get(7)?;
    let metadata = serde_json::from_str::<serde_json::Value>(&metadata_raw)
        .ok()
        .and_then(|v| match v {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();
    Ok(CatFile {
        id: FileId(row.get(0)?),
        path: PathBuf::from(row.get::<_, String>(1)?),
        basename: row.get(2)?,
        parent_folder_id: FolderId(row.get(3)?),
        zip_file_id: row.get::<_, Option<i64>>(4)?.map(FileId),
        size: u64::try_from(row.get::<_, i64>(5)?).unwrap_or(0),
        mod_time: model::parse_timestamp(&row.get::<_, String>(6)?),
        fingerprints: FingerprintSet::new(),
        metadata,
        created_at: model::parse_timestamp(&row.get::<_, String>(8)?),
        updated_at: model::parse_timestamp(&row.get::<_, String>(9)?),
    })
}
