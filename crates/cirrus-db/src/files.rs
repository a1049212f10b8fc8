use crate::models::{FileRow, HolderKeyRow, OwnerRow, STORAGE_KEY_NONE};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::params;

impl Database {
    /// Metadata row plus the self-pointing ownership row, one transaction.
    pub fn insert_file_with_owner(&self, file: &FileRow, owner_id: &str) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO file_metadata (id, holder_id, file_name, size_bytes,
                                            content_type, created_at, storage_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    file.id,
                    file.holder_id,
                    file.file_name,
                    file.size_bytes,
                    file.content_type,
                    file.created_at,
                    file.storage_key,
                ],
            )?;
            tx.execute(
                "INSERT INTO file_owners (file_id, owner_id) VALUES (?1, ?2)",
                params![file.id, owner_id],
            )?;
            Ok(())
        })
    }

    pub fn get_file(&self, id: &str) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, holder_id, file_name, size_bytes, content_type, created_at, storage_key
                 FROM file_metadata WHERE id = ?1",
                [id],
                map_file,
            )
            .optional()
        })
    }

    /// Content attach commit: fill the real storage key, write the holder
    /// key record, and charge the holder's quota — all or nothing.
    pub fn attach_content_rows(
        &self,
        file_id: &str,
        storage_key: &str,
        holder_key: &HolderKeyRow,
        size_bytes: i64,
    ) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE file_metadata SET storage_key = ?1 WHERE id = ?2",
                params![storage_key, file_id],
            )?;
            tx.execute(
                "INSERT INTO holder_keys (file_id, holder_id, wrapped_key, content_iv,
                                          content_tag, key_iv, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    holder_key.file_id,
                    holder_key.holder_id,
                    holder_key.wrapped_key,
                    holder_key.content_iv,
                    holder_key.content_tag,
                    holder_key.key_iv,
                    holder_key.created_at,
                ],
            )?;
            tx.execute(
                "UPDATE accounts SET used_space_bytes = used_space_bytes + ?1 WHERE id = ?2",
                params![size_bytes, holder_key.holder_id],
            )?;
            Ok(())
        })
    }

    pub fn get_holder_key(&self, file_id: &str) -> Result<Option<HolderKeyRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT file_id, holder_id, wrapped_key, content_iv, content_tag, key_iv, created_at
                 FROM holder_keys WHERE file_id = ?1",
                [file_id],
                |row| {
                    Ok(HolderKeyRow {
                        file_id: row.get(0)?,
                        holder_id: row.get(1)?,
                        wrapped_key: row.get(2)?,
                        content_iv: row.get(3)?,
                        content_tag: row.get(4)?,
                        key_iv: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn get_owner(&self, file_id: &str) -> Result<Option<OwnerRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT file_id, owner_id FROM file_owners WHERE file_id = ?1",
                [file_id],
                |row| {
                    Ok(OwnerRow {
                        file_id: row.get(0)?,
                        owner_id: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Recipient copy after a transfer: new metadata row sharing the source's
    /// storage key, the re-wrapped holder key, and the lineage ownership row.
    pub fn insert_transfer_rows(
        &self,
        file: &FileRow,
        holder_key: &HolderKeyRow,
        lineage_owner_id: &str,
    ) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO file_metadata (id, holder_id, file_name, size_bytes,
                                            content_type, created_at, storage_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    file.id,
                    file.holder_id,
                    file.file_name,
                    file.size_bytes,
                    file.content_type,
                    file.created_at,
                    file.storage_key,
                ],
            )?;
            tx.execute(
                "INSERT INTO holder_keys (file_id, holder_id, wrapped_key, content_iv,
                                          content_tag, key_iv, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    holder_key.file_id,
                    holder_key.holder_id,
                    holder_key.wrapped_key,
                    holder_key.content_iv,
                    holder_key.content_tag,
                    holder_key.key_iv,
                    holder_key.created_at,
                ],
            )?;
            tx.execute(
                "INSERT INTO file_owners (file_id, owner_id) VALUES (?1, ?2)",
                params![file.id, lineage_owner_id],
            )?;
            Ok(())
        })
    }

    /// Remove one holder's copy and report how many other metadata rows still
    /// reference the same storage key. The caller deletes the ciphertext only
    /// when that count is zero, after this transaction has committed.
    pub fn delete_file_rows(&self, file_id: &str, holder_id: &str, size_bytes: i64) -> Result<i64> {
        self.with_tx(|tx| {
            let storage_key: String = tx.query_row(
                "SELECT storage_key FROM file_metadata WHERE id = ?1",
                [file_id],
                |row| row.get(0),
            )?;
            tx.execute("DELETE FROM holder_keys WHERE file_id = ?1", [file_id])?;
            tx.execute("DELETE FROM file_owners WHERE file_id = ?1", [file_id])?;
            tx.execute("DELETE FROM file_metadata WHERE id = ?1", [file_id])?;
            tx.execute(
                "UPDATE accounts SET used_space_bytes = MAX(0, used_space_bytes - ?1) WHERE id = ?2",
                params![size_bytes, holder_id],
            )?;

            if storage_key == STORAGE_KEY_NONE {
                return Ok(0);
            }
            let remaining: i64 = tx.query_row(
                "SELECT COUNT(*) FROM file_metadata WHERE storage_key = ?1",
                [&storage_key],
                |row| row.get(0),
            )?;
            Ok(remaining)
        })
    }

    pub fn list_files_page(
        &self,
        holder_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<FileRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, holder_id, file_name, size_bytes, content_type, created_at, storage_key
                 FROM file_metadata
                 WHERE holder_id = ?1
                 ORDER BY created_at DESC, id
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(
                    params![holder_id, page_size, page * page_size],
                    map_file,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_all_files(&self, holder_id: &str) -> Result<Vec<FileRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, holder_id, file_name, size_bytes, content_type, created_at, storage_key
                 FROM file_metadata WHERE holder_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([holder_id], map_file)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_files(&self, holder_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM file_metadata WHERE holder_id = ?1",
                [holder_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
        })
    }

    pub fn count_storage_key_refs(&self, storage_key: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM file_metadata WHERE storage_key = ?1",
                [storage_key],
                |row| row.get(0),
            )
            .map_err(Into::into)
        })
    }
}

fn map_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        id: row.get(0)?,
        holder_id: row.get(1)?,
        file_name: row.get(2)?,
        size_bytes: row.get(3)?,
        content_type: row.get(4)?,
        created_at: row.get(5)?,
        storage_key: row.get(6)?,
    })
}
