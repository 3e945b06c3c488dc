use crate::model::ListingId;
use crate::record::{ImageDescriptor, NormalizedRecord, Photo};
use async_trait::async_trait;
use crawler_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub const CARD_FILE_NAME: &str = "card.json";

/// Saves are assembled under `<root>/.<uuid>.tmp` before being renamed into place.
const STAGING_PREFIX: &str = ".";

/// Durable home of ingested records, one key per listing id.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Whether a complete record for the listing was written.
    async fn exists(&self, id: ListingId) -> Result<bool>;

    /// Every key present in storage, listing ids or not.
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Persist the record, storing the photo as a file next to it.
    async fn save(&self, id: ListingId, record: NormalizedRecord, photo: Option<&Photo>) -> Result<()>;
}

/// `<root>/<listing id>/card.json` plus an optional `image.<ext>`.
#[derive(Debug, Clone)]
pub struct DirectoryCardStore {
    root: PathBuf,
}

impl DirectoryCardStore {
    /// Opens the store, creating the root directory when it does not exist yet.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !fs::try_exists(&root).await? {
            info!(root = %root.display(), "Creating non-existing cards directory");
        }
        fs::create_dir_all(&root).await.map_err(|e| {
            Error::Storage(format!("cannot create cards directory {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    pub fn card_dir(&self, id: ListingId) -> PathBuf {
        self.root.join(id.to_string())
    }
}

#[async_trait]
impl CardStore for DirectoryCardStore {
    async fn exists(&self, id: ListingId) -> Result<bool> {
        Ok(fs::try_exists(self.card_dir(id)).await?)
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.root).await.map_err(|e| {
            Error::Storage(format!("cannot read cards directory {}: {e}", self.root.display()))
        })?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if !name.starts_with(STAGING_PREFIX) => keys.push(name.to_string()),
                _ => {}
            }
        }
        Ok(keys)
    }

    #[instrument(skip(self, record, photo), fields(listing_id = %id))]
    async fn save(
        &self,
        id: ListingId,
        mut record: NormalizedRecord,
        photo: Option<&Photo>,
    ) -> Result<()> {
        let dir = self.card_dir(id);
        let staging = self.root.join(format!("{STAGING_PREFIX}{}.tmp", Uuid::new_v4()));

        fs::create_dir(&staging).await.map_err(|e| {
            Error::Storage(format!("cannot create staging directory {}: {e}", staging.display()))
        })?;

        if let Some(photo) = photo {
            let file_name = photo.format.file_name();
            write_synced(&staging.join(&file_name), &photo.body).await?;
            record.images = vec![ImageDescriptor::file(file_name)];
            debug!(bytes = photo.body.len(), "Image file staged");
        }

        let serialized = record.to_json_pretty()?;
        write_synced(&staging.join(CARD_FILE_NAME), serialized.as_bytes()).await?;

        // The listing directory only ever appears complete
        if let Err(e) = fs::rename(&staging, &dir).await {
            let _ = fs::remove_dir_all(&staging).await;
            if fs::try_exists(dir.join(CARD_FILE_NAME)).await.unwrap_or(false) {
                debug!(dir = %dir.display(), "Card already stored by another writer");
                return Ok(());
            }
            return Err(Error::Storage(format!(
                "renaming {} -> {}: {e}",
                staging.display(),
                dir.display()
            )));
        }

        info!("Card saved to disk");
        Ok(())
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .await
        .map_err(|e| Error::Storage(format!("cannot create {}: {e}", path.display())))?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}
