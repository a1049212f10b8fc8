use std::sync::Arc;

use chrono::Utc;
use cirrus_db::models::{FileRow, HolderKeyRow, STORAGE_KEY_NONE};
use cirrus_db::{Database, timestamp};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::blobstore::{BlobStore, folder_for};
use crate::error::{CoreError, Result};

pub const PAGE_SIZE: u32 = 30;

/// One file as a holder sees it in a listing.
pub struct FileSummary {
    pub id: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub created_at: String,
    /// "You" when the caller is the lineage owner, else the owner's name.
    pub owner: String,
}

pub struct FileListing {
    pub files: Vec<FileSummary>,
    pub has_more: bool,
    pub page: u32,
    pub total: i64,
}

/// Everything a client needs to decrypt one copy of a file.
#[derive(Debug)]
pub struct DownloadDetails {
    pub file_name: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub wrapped_key: String,
    pub content_iv: String,
    pub content_tag: String,
    pub key_iv: String,
    /// Lineage owner's public key, present only for shared copies.
    pub sender_public_key: Option<String>,
}

pub struct DownloadContent {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Access/sharing ledger. Each holder's copy is a metadata row + holder-key
/// row; transferred copies share one immutable ciphertext object, so "who can
/// decrypt this" is expressed purely as rows.
pub struct FileLedger {
    db: Arc<Database>,
    store: Arc<dyn BlobStore>,
}

impl FileLedger {
    pub fn new(db: Arc<Database>, store: Arc<dyn BlobStore>) -> Self {
        Self { db, store }
    }

    /// Phase one of an upload: the metadata row with the sentinel storage key
    /// and a self-pointing ownership row.
    pub fn create_metadata(
        &self,
        holder_id: &str,
        file_name: &str,
        size_bytes: u64,
        content_type: &str,
    ) -> Result<FileRow> {
        if file_name.is_empty() {
            return Err(CoreError::validation("File name is required"));
        }
        if content_type.is_empty() {
            return Err(CoreError::validation("Content type is required"));
        }

        let Some(account) = self.db.get_account_by_id(holder_id)? else {
            return Err(CoreError::NotFound("Account"));
        };
        if account.used_space_bytes + size_bytes as i64 > account.limit_space_bytes {
            return Err(CoreError::validation("Storage quota exceeded"));
        }

        let file = FileRow {
            id: Uuid::new_v4().to_string(),
            holder_id: holder_id.to_string(),
            file_name: file_name.to_string(),
            size_bytes: size_bytes as i64,
            content_type: content_type.to_string(),
            created_at: timestamp(Utc::now()),
            storage_key: STORAGE_KEY_NONE.to_string(),
        };
        self.db.insert_file_with_owner(&file, holder_id)?;

        info!("File metadata {} created for holder {}", file.id, holder_id);
        Ok(file)
    }

    /// Phase two: upload the ciphertext, then commit the storage key and the
    /// holder-key record. The blob goes out first so a crash strands an
    /// orphaned object, never a metadata row pointing at nothing.
    pub async fn attach_content(
        &self,
        file_id: &str,
        holder_id: &str,
        ciphertext: &[u8],
        wrapped_key: &str,
        content_iv: &str,
        content_tag: &str,
        key_iv: &str,
    ) -> Result<()> {
        let file = self.held_file(file_id, holder_id)?;
        if file.storage_key != STORAGE_KEY_NONE {
            return Err(CoreError::Conflict("File content is already uploaded"));
        }
        if ciphertext.is_empty() {
            return Err(CoreError::validation("File content is required"));
        }

        let storage_key = format!(
            "{}{}_{}",
            folder_for(&file.content_type),
            Uuid::new_v4(),
            sanitize_file_name(&file.file_name)
        );

        self.store
            .put(&storage_key, ciphertext, &file.content_type)
            .await
            .map_err(CoreError::Storage)?;

        let holder_key = HolderKeyRow {
            file_id: file_id.to_string(),
            holder_id: holder_id.to_string(),
            wrapped_key: wrapped_key.to_string(),
            content_iv: content_iv.to_string(),
            content_tag: content_tag.to_string(),
            key_iv: key_iv.to_string(),
            created_at: timestamp(Utc::now()),
        };
        if let Err(e) =
            self.db
                .attach_content_rows(file_id, &storage_key, &holder_key, file.size_bytes)
        {
            // The object is uploaded but unreferenced; it needs manual
            // reconciliation or garbage collection.
            error!(
                "Metadata commit failed after upload of {}; orphaned object requires reconciliation: {:#}",
                storage_key, e
            );
            return Err(e.into());
        }

        info!("File {} content attached as {}", file_id, storage_key);
        Ok(())
    }

    /// Holder-scoped duplication: the recipient gets their own metadata,
    /// holder-key and ownership rows against the same ciphertext object. The
    /// content IV and tag are copied unchanged — only the key wrap differs
    /// per recipient.
    pub fn transfer(
        &self,
        file_id: &str,
        source_holder_id: &str,
        recipient_email: &str,
        new_wrapped_key: &str,
        new_key_iv: &str,
    ) -> Result<String> {
        let file = self.held_file(file_id, source_holder_id)?;

        let Some(recipient) = self.db.get_account_by_email(recipient_email)? else {
            return Err(CoreError::NotFound("Recipient"));
        };

        // An unfinished upload has no holder key and cannot be shared.
        let Some(source_key) = self.db.get_holder_key(file_id)? else {
            return Err(CoreError::NotFound("File keys"));
        };

        let lineage_owner_id = match self.db.get_owner(file_id)? {
            Some(owner) => owner.owner_id,
            None => source_holder_id.to_string(),
        };

        let now = timestamp(Utc::now());
        let copy = FileRow {
            id: Uuid::new_v4().to_string(),
            holder_id: recipient.id.clone(),
            file_name: file.file_name,
            size_bytes: file.size_bytes,
            content_type: file.content_type,
            created_at: now.clone(),
            storage_key: file.storage_key,
        };
        let copy_key = HolderKeyRow {
            file_id: copy.id.clone(),
            holder_id: recipient.id.clone(),
            wrapped_key: new_wrapped_key.to_string(),
            content_iv: source_key.content_iv,
            content_tag: source_key.content_tag,
            key_iv: new_key_iv.to_string(),
            created_at: now,
        };

        self.db
            .insert_transfer_rows(&copy, &copy_key, &lineage_owner_id)?;

        info!(
            "File {} transferred from {} to {} as {}",
            file_id, source_holder_id, recipient.id, copy.id
        );
        Ok(copy.id)
    }

    /// Delete one holder's copy. The ciphertext object survives as long as
    /// any other metadata row still references its storage key.
    pub async fn delete_file(&self, file_id: &str, holder_id: &str) -> Result<()> {
        let file = self.held_file(file_id, holder_id)?;

        let remaining = self
            .db
            .delete_file_rows(file_id, holder_id, file.size_bytes)?;

        if file.storage_key != STORAGE_KEY_NONE && remaining == 0 {
            // Rows are committed; a failed blob delete strands an orphaned
            // object that can be collected later.
            if let Err(e) = self.store.delete(&file.storage_key).await {
                warn!("Failed to delete blob {}: {:#}", file.storage_key, e);
            }
        }

        info!("File {} deleted for holder {}", file_id, holder_id);
        Ok(())
    }

    /// Remove every copy an account holds. Per-file failures are logged and
    /// skipped so one bad row cannot wedge account deletion.
    pub async fn delete_all_for_account(&self, holder_id: &str) -> Result<()> {
        let files = self.db.list_all_files(holder_id)?;
        info!(
            "Deleting {} files for account {}",
            files.len(),
            holder_id
        );

        for file in files {
            if let Err(e) = self.delete_file(&file.id, holder_id).await {
                error!("Failed to delete file {}: {:#}", file.id, e);
            }
        }
        Ok(())
    }

    pub fn list_for_account(&self, holder_id: &str, page: u32) -> Result<FileListing> {
        let rows = self.db.list_files_page(holder_id, page, PAGE_SIZE)?;
        let total = self.db.count_files(holder_id)?;
        let has_more = (((page + 1) * PAGE_SIZE) as i64) < total;

        let mut files = Vec::with_capacity(rows.len());
        for row in rows {
            let owner = self.owner_label(&row)?;
            files.push(FileSummary {
                id: row.id,
                file_name: row.file_name,
                size_bytes: row.size_bytes,
                content_type: row.content_type,
                created_at: row.created_at,
                owner,
            });
        }

        Ok(FileListing {
            files,
            has_more,
            page,
            total,
        })
    }

    fn owner_label(&self, file: &FileRow) -> Result<String> {
        let Some(owner) = self.db.get_owner(&file.id)? else {
            warn!("No ownership record for file {}", file.id);
            return Ok("You".to_string());
        };
        if owner.owner_id == file.holder_id {
            return Ok("You".to_string());
        }
        match self.db.account_name(&owner.owner_id)? {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Ok("You".to_string()),
        }
    }

    /// Key material and metadata for a download; shared copies also carry the
    /// lineage owner's public key so the client can verify the sender's wrap.
    pub fn details_for_download(&self, file_id: &str, holder_id: &str) -> Result<DownloadDetails> {
        let file = self.held_file(file_id, holder_id)?;

        let Some(holder_key) = self.db.get_holder_key(file_id)? else {
            return Err(CoreError::NotFound("File keys"));
        };

        let sender_public_key = match self.db.get_owner(file_id)? {
            Some(owner) if owner.owner_id != holder_id => {
                let key = self.db.get_public_key(&owner.owner_id)?;
                if key.is_none() {
                    warn!(
                        "No public key for lineage owner {} of file {}",
                        owner.owner_id, file_id
                    );
                }
                key
            }
            _ => None,
        };

        Ok(DownloadDetails {
            file_name: file.file_name,
            size_bytes: file.size_bytes,
            content_type: file.content_type,
            wrapped_key: holder_key.wrapped_key,
            content_iv: holder_key.content_iv,
            content_tag: holder_key.content_tag,
            key_iv: holder_key.key_iv,
            sender_public_key,
        })
    }

    pub async fn download(&self, file_id: &str, holder_id: &str) -> Result<DownloadContent> {
        let file = self.held_file(file_id, holder_id)?;
        if file.storage_key == STORAGE_KEY_NONE {
            return Err(CoreError::NotFound("File content"));
        }

        let bytes = self
            .store
            .get(&file.storage_key)
            .await
            .map_err(CoreError::Storage)?;

        Ok(DownloadContent {
            file_name: file.file_name,
            content_type: file.content_type,
            bytes,
        })
    }

    fn held_file(&self, file_id: &str, holder_id: &str) -> Result<FileRow> {
        let Some(file) = self.db.get_file(file_id)? else {
            return Err(CoreError::NotFound("File"));
        };
        if file.holder_id != holder_id {
            return Err(CoreError::Unauthorized);
        }
        Ok(file)
    }
}

/// Storage keys embed the original file name; strip anything that could
/// escape the content-class folder.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}
