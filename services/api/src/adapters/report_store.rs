//! services/api/src/adapters/report_store.rs
//!
//! Keeps one closeout report per chat on the local filesystem. It implements
//! the `ReportStore` port from the `core` crate.

use async_trait::async_trait;
use mindspark_core::ports::{PortError, PortResult, ReportStore};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct FsReportStore {
    dir: PathBuf,
}

impl FsReportStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// `<dir>/<chat_id>.pdf`. The id is a parsed UUID, so it cannot escape `dir`.
    pub fn report_path(&self, chat_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.pdf", chat_id))
    }
}

#[async_trait]
impl ReportStore for FsReportStore {
    /// Writes next to the final path, syncs, then renames over it, so readers
    /// never see a half-written file and concurrent closeouts cannot interleave.
    async fn save_report(&self, chat_id: Uuid, pdf: &[u8]) -> PortResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PortError::Unexpected(format!("creating {}: {}", self.dir.display(), e)))?;

        let final_path = self.report_path(chat_id);
        let tmp_path = self.dir.join(format!(".{}.{}.tmp", chat_id, Uuid::new_v4()));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(pdf).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &final_path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(PortError::Unexpected(format!(
                "writing {}: {}",
                final_path.display(),
                e
            )));
        }

        info!("Report for chat {} written to {}", chat_id, final_path.display());
        Ok(())
    }

    async fn load_report(&self, chat_id: Uuid) -> PortResult<Vec<u8>> {
        match tokio::fs::read(self.report_path(chat_id)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PortError::NotFound(format!("Report for chat {} not found", chat_id)))
            }
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        }
    }

    /// Removing a report that was never generated is not an error.
    async fn remove_report(&self, chat_id: Uuid) -> PortResult<()> {
        match tokio::fs::remove_file(self.report_path(chat_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        }
    }
}
