//! Restore container metadata from a snapshot directory

use super::{reason, Attempt, FileOutcome, RunOrchestrator};
use crate::artifacts::backup_metadata_path;
use crate::writers::{restore_blocking, WriteOutcome};
use std::path::Path;

impl RunOrchestrator {
    /// Replaces the whole tagging pipeline for restore runs
    pub(super) async fn phase_restore(&self, path: &Path, snapshot_dir: &Path) -> Attempt {
        let snapshot = backup_metadata_path(snapshot_dir, path, self.settings.root.as_deref());
        self.progress
            .note(&format!("  Restore: using {}", snapshot.display()));

        match restore_blocking(self.snapshotter.clone(), path.to_path_buf(), snapshot.clone()).await {
            WriteOutcome::Ok => {
                self.inspector.invalidate(path);
                Attempt::Done(FileOutcome::ok(reason::RESTORED))
            }
            WriteOutcome::Busy(message) => Attempt::Deferred { matched: None, message },
            WriteOutcome::Error(message) => {
                tracing::error!(path = %path.display(), %message, "Restore failed");
                self.artifacts
                    .run_log
                    .append(&format!("[restore] {}\nerror: {}", path.display(), message));
                Attempt::Done(FileOutcome::failed(reason::RESTORE_FAILED))
            }
        }
    }
}
