//! Existing-tag filter, backups and writer calls

use super::phase_mapping::{filter_existing, preview_lines, MappedTags};
use super::{reason, Attempt, FileError, FileOutcome, RunOrchestrator};
use crate::artifacts::{backup_metadata_path, backup_original_path, has_sufficient_backup_space};
use crate::inspect::query_blocking;
use crate::writers::{snapshot_blocking, write_blocking, WriteJob, WriteOutcome};
use std::collections::HashMap;
use std::fs::Metadata;
use std::path::Path;

impl RunOrchestrator {
    pub(super) async fn phase_write(
        &self,
        path: &Path,
        metadata: &Metadata,
        mapped: MappedTags,
    ) -> Result<Attempt, FileError> {
        let MappedTags {
            mut container,
            mut atom,
            atom_enabled,
            matched,
        } = mapped;
        let done = |outcome: FileOutcome| -> Result<Attempt, FileError> {
            Ok(Attempt::Done(outcome.with_match(matched.as_ref())))
        };

        if container.is_empty() && atom.is_empty() {
            return done(FileOutcome::skipped(reason::NO_TAGS));
        }

        let existing = query_blocking(&self.inspector, path, |inspector, p| inspector.read_existing_tags(p))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read existing tags");
                HashMap::new()
            });
        let has_artwork = query_blocking(&self.inspector, path, |inspector, p| inspector.has_embedded_artwork(p))
            .await
            .unwrap_or_else(|e| {
                tracing::debug!(path = %path.display(), error = %e, "Cannot check embedded artwork");
                false
            });

        let clear_keys: Vec<String> = if self.settings.override_existing {
            container
                .tags
                .keys()
                .chain(atom.tags.keys())
                .map(str::to_string)
                .collect()
        } else {
            filter_existing(&mut container, &existing, has_artwork);
            filter_existing(&mut atom, &existing, has_artwork);
            if container.is_empty() && atom.is_empty() {
                self.progress.note("  All planned tags already present.");
                return done(FileOutcome::skipped(reason::EXISTING_TAGS));
            }
            Vec::new()
        };

        if self.settings.verbose() {
            for line in preview_lines("Container", &container)
                .into_iter()
                .chain(preview_lines("Atom", &atom))
            {
                self.progress.note(&line);
            }
        }

        if !self.settings.write_enabled {
            return done(FileOutcome::ok(reason::WRITE_DISABLED));
        }

        if let Some(run_dir) = &self.artifacts.dirs.run_dir {
            if self.settings.backup_original
                && self.settings.check_backup_space
                && !has_sufficient_backup_space(run_dir, metadata.len())
            {
                tracing::warn!(path = %path.display(), size = metadata.len(), "Not enough space for backup");
                return done(FileOutcome::skipped(reason::INSUFFICIENT_BACKUP_SPACE));
            }

            let root = self.settings.root.as_deref();
            let snapshot = backup_metadata_path(run_dir, path, root);
            match snapshot_blocking(self.snapshotter.clone(), path.to_path_buf(), snapshot.clone()).await {
                Ok(()) if self.settings.is_simulated() => {}
                Ok(()) => self
                    .progress
                    .note(&format!("  Backup: metadata saved to {}", snapshot.display())),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Metadata snapshot failed");
                    self.artifacts
                        .run_log
                        .append(&format!("[snapshot] {}\nerror: {}", path.display(), e));
                }
            }

            if self.settings.backup_original && !self.settings.is_simulated() {
                let copy = backup_original_path(run_dir, path, root, &self.settings.backup_suffix);
                tokio::fs::copy(path, &copy).await?;
                self.progress
                    .note(&format!("  Backup: original copied to {}", copy.display()));
            }
        }

        let remove_existing_artwork = self.settings.override_existing && has_artwork;

        let container_job = WriteJob {
            path: path.to_path_buf(),
            tags: container.tags,
            artwork: container.artwork,
            clear_keys,
            remove_existing_artwork,
        };
        let mut outcomes = Vec::new();
        if !container_job.request().is_empty() {
            let writer = self.container_writer.clone();
            outcomes.push((writer.name(), write_blocking(writer, container_job).await));
        }

        let container_ok = outcomes.iter().all(|(_, outcome)| outcome.is_ok());
        if container_ok && atom_enabled && !atom.is_empty() {
            if let Some(writer) = &self.atom_writer {
                let atom_job = WriteJob {
                    path: path.to_path_buf(),
                    tags: atom.tags,
                    artwork: atom.artwork,
                    clear_keys: Vec::new(),
                    remove_existing_artwork,
                };
                outcomes.push((writer.name(), write_blocking(writer.clone(), atom_job).await));
            }
        }
        self.inspector.invalidate(path);

        for (tool, outcome) in &outcomes {
            if let WriteOutcome::Error(message) = outcome {
                tracing::error!(path = %path.display(), tool, %message, "Writer failed");
                return done(FileOutcome::failed(reason::WRITER_FAILED));
            }
        }
        for (tool, outcome) in outcomes {
            if let WriteOutcome::Busy(message) = outcome {
                tracing::warn!(path = %path.display(), tool, %message, "File busy, deferring");
                return Ok(Attempt::Deferred {
                    matched: matched.clone(),
                    message,
                });
            }
        }
        done(FileOutcome::ok(reason::UPDATED))
    }
}
