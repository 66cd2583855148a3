//! Folder table access.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::core::errors::Result;
use crate::model::{self, FileId, Folder, FolderId};

const FOLDER_COLS: &str = "id, path, parent_folder_id, zip_file_id, mod_time, created_at, updated_at";

/// Prepared-statement access to the `folders` table within one
/// transaction or probe scope.
pub struct FolderStore<'c> {
    pub(crate) conn: &'c Connection,
}

impl FolderStore<'_> {
    /// Look up a folder by exact or case-folded path.
    pub fn find_by_path(&self, path: &Path, case_sensitive: bool) -> Result<Option<Folder>> {
        let sql = if case_sensitive {
            format!("SELECT {FOLDER_COLS} FROM folders WHERE path = ?1 LIMIT 1")
        } else {
            format!(
                "SELECT {FOLDER_COLS} FROM folders WHERE path = ?1 COLLATE NOCASE \
                 ORDER BY id ASC LIMIT 1"
            )
        };
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let folder = stmt
            .query_row(params![path_str(path)], row_to_folder)
            .optional()?;
        Ok(folder)
    }

    /// Rename candidates: folders sharing a basename within one archive
    /// scope, in ascending id order (the deterministic tie-break).
    pub fn find_by_basename(
        &self,
        name: &str,
        zip_file_id: Option<FileId>,
    ) -> Result<Vec<Folder>> {
        let sql = format!(
            "SELECT {FOLDER_COLS} FROM folders \
             WHERE basename(path) = ?1 AND zip_file_id IS ?2 ORDER BY id ASC"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![name, zip_file_id.map(|id| id.0)], row_to_folder)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Direct children of a folder, in ascending id order.
    pub fn find_children(&self, parent: FolderId) -> Result<Vec<Folder>> {
        let sql =
            format!("SELECT {FOLDER_COLS} FROM folders WHERE parent_folder_id = ?1 ORDER BY id ASC");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![parent.0], row_to_folder)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Folders living directly inside the given archive.
    pub fn find_by_zip_file_id(&self, zip_file_id: FileId) -> Result<Vec<Folder>> {
        let sql =
            format!("SELECT {FOLDER_COLS} FROM folders WHERE zip_file_id = ?1 ORDER BY id ASC");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![zip_file_id.0], row_to_folder)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Insert a folder and assign its id.
    pub fn create(&self, folder: &mut Folder) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO folders (path, parent_folder_id, zip_file_id, mod_time, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![
                path_str(&folder.path),
                folder.parent_folder_id.map(|id| id.0),
                folder.zip_file_id.map(|id| id.0),
                model::format_timestamp(folder.mod_time),
                model::format_timestamp(folder.created_at),
                model::format_timestamp(folder.updated_at),
            ])?;
        folder.id = FolderId(self.conn.last_insert_rowid());
        Ok(())
    }

    /// Persist all mutable attributes of an existing folder.
    pub fn update(&self, folder: &Folder) -> Result<()> {
        self.conn
            .prepare_cached(
                "UPDATE folders SET path = ?2, parent_folder_id = ?3, zip_file_id = ?4,
                 mod_time = ?5, updated_at = ?6 WHERE id = ?1",
            )?
            .execute(params![
                folder.id.0,
                path_str(&folder.path),
                folder.parent_folder_id.map(|id| id.0),
                folder.zip_file_id.map(|id| id.0),
                model::format_timestamp(folder.mod_time),
                model::format_timestamp(folder.updated_at),
            ])?;
        Ok(())
    }

    /// Every folder row, in ascending id order.
    pub fn all(&self) -> Result<Vec<Folder>> {
        let sql = format!("SELECT {FOLDER_COLS} FROM folders ORDER BY id ASC");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map([], row_to_folder)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Total folder count (test and report support).
    pub fn count(&self) -> Result<i64> {
        let count = self
            .conn
            .prepare_cached("SELECT COUNT(*) FROM folders")?
            .query_row([], |row| row.get(0))?;
        Ok(count)
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn row_to_folder(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: FolderId(row.get(0)?),
        path: PathBuf::from(row.get::<_, String>(1)?),
        parent_folder_id: row.get::<_, Option<i64>>(2)?.map(FolderId),
        zip_file_id: row.get::<_, Option<i64>>(3)?.map(FileId),
        mod_time: model::parse_timestamp(&row.get::<_, String>(4)?),
        created_at: model::parse_timestamp(&row.get::<_, String>(5)?),
        updated_at: model::parse_timestamp(&row.get::<_, String>(6)?),
    })
}
