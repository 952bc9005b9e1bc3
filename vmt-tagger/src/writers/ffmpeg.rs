//! ffmpeg container-tag writer
//!
//! Remuxes the file with stream copy and `-metadata key=value` pairs. Also
//! takes and restores `ffmetadata` snapshots for backups.

use super::{
    render_command, run_tool, simulated_staging_path, MetadataSnapshotter, StagedOutput, TagWriter,
    WriteOutcome, WriteRequest, WriterError, WriterSettings,
};
use crate::mapping::{TagSet, ARTWORK_KEY, ITUNMOVI_KEY};
use std::ffi::OsString;
use std::path::Path;

const TOOL: &str = "ffmpeg";

/// Separator for list values in single-valued container tags
const LIST_SEPARATOR: &str = ", ";

/// Container tag name for a plan output key
pub fn container_key(key: &str) -> &str {
    match key {
        "year" => "date",
        "longdesc" => "synopsis",
        "tv_show" => "show",
        "tv_season" => "season_number",
        "tv_episode" => "episode_sort",
        "tv_network" => "network",
        other => other,
    }
}

pub struct FfmpegWriter {
    ffmpeg_path: String,
    settings: WriterSettings,
}

impl FfmpegWriter {
    pub fn new(ffmpeg_path: impl Into<String>, settings: WriterSettings) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            settings,
        }
    }

    fn run(&self, args: &[OsString], target: &Path) -> Result<(), WriterError> {
        run_tool(TOOL, &self.ffmpeg_path, args, target, &self.settings.run_log).map(|_| ())
    }
}

/// Arguments for a tag remux of `request.path` into `output`
pub fn build_tag_args(request: &WriteRequest<'_>, cover: Option<&Path>, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), request.path.into()];
    if let Some(cover) = cover {
        push_pair(&mut args, "-i", cover);
    }
    for spec in ["0:v:0", "0:a?", "0:s?"] {
        push_pair(&mut args, "-map", spec);
    }
    if cover.is_some() {
        push_pair(&mut args, "-map", "1");
        push_pair(&mut args, "-disposition:v:1", "attached_pic");
        push_pair(&mut args, "-metadata:s:v:1", "title=cover");
    }
    if request.clear_existing {
        push_pair(&mut args, "-map_metadata", "-1");
    }
    push_pair(&mut args, "-c", "copy");

    for (key, value) in writable_tags(request.tags) {
        push_pair(&mut args, "-metadata", format!("{}={}", key, value));
    }
    // Overridden keys without a new value are blanked
    for key in request.clear_keys {
        if !request.tags.contains(key) && key != ARTWORK_KEY {
            push_pair(&mut args, "-metadata", format!("{}=", container_key(key)));
        }
    }

    args.push(output.into());
    args
}

fn push_pair(args: &mut Vec<OsString>, flag: &str, value: impl Into<OsString>) {
    args.push(flag.into());
    args.push(value.into());
}

/// Container-level pairs; blank values and atom-only payloads are skipped
fn writable_tags(tags: &TagSet) -> Vec<(&str, String)> {
    tags.iter()
        .filter(|(key, _)| *key != ITUNMOVI_KEY && *key != ARTWORK_KEY)
        .map(|(key, value)| (container_key(key), value.joined(LIST_SEPARATOR)))
        .filter(|(_, value)| !value.trim().is_empty())
        .collect()
}

/// ffmpeg cannot mux this cover as an attached picture
fn should_retry_without_cover(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    lowered.contains("codec mjpeg") || lowered.contains("attached pic")
}

pub fn build_snapshot_args(input: &Path, dest: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-f".into(),
        "ffmetadata".into(),
        dest.into(),
    ]
}

pub fn build_restore_args(input: &Path, snapshot: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-i".into(),
        snapshot.into(),
        "-map".into(),
        "0".into(),
        "-map_metadata".into(),
        "1".into(),
        "-c".into(),
        "copy".into(),
        output.into(),
    ]
}

impl TagWriter for FfmpegWriter {
    fn name(&self) -> &'static str {
        TOOL
    }

    fn write(&self, request: &WriteRequest<'_>) -> WriteOutcome {
        if request.is_empty() {
            return WriteOutcome::Ok;
        }

        if self.settings.mode.is_simulated() {
            let preview = simulated_staging_path(request.path, "tagtmp");
            let args = build_tag_args(request, request.artwork, &preview);
            self.settings.report_simulated(TOOL, &self.ffmpeg_path, &args);
            return WriteOutcome::Ok;
        }

        let staged = match StagedOutput::new(request.path, "tagtmp") {
            Ok(staged) => staged,
            Err(e) => return WriteOutcome::Error(format!("cannot stage output: {}", e)),
        };

        let args = build_tag_args(request, request.artwork, staged.path());
        match self.run(&args, request.path) {
            Ok(()) => {}
            Err(WriterError::ToolFailed { stderr, .. })
                if request.artwork.is_some() && should_retry_without_cover(&stderr) =>
            {
                tracing::warn!(path = %request.path.display(), "Cover art rejected, retrying without it");
                self.settings
                    .run_log
                    .append(&format!("[ffmpeg] retry without cover art for {}", request.path.display()));
                let retry = build_tag_args(request, None, staged.path());
                if let Err(e) = self.run(&retry, request.path) {
                    return WriteOutcome::Error(e.to_string());
                }
            }
            Err(e) => return WriteOutcome::Error(e.to_string()),
        }

        match staged.commit(request.path, self.settings.atomic_replace, self.settings.replace_policy) {
            Ok(()) => WriteOutcome::Ok,
            Err(e) => {
                self.settings
                    .run_log
                    .append(&format!("[ffmpeg] {}\nerror: {}", request.path.display(), e));
                e.into()
            }
        }
    }
}

impl MetadataSnapshotter for FfmpegWriter {
    fn snapshot(&self, path: &Path, dest: &Path) -> Result<(), WriterError> {
        let args = build_snapshot_args(path, dest);
        if self.settings.mode.is_simulated() {
            self.settings.report_simulated(TOOL, &self.ffmpeg_path, &args);
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.run(&args, path)?;
        tracing::debug!(path = %path.display(), snapshot = %dest.display(), "Saved metadata snapshot");
        Ok(())
    }

    fn restore(&self, path: &Path, snapshot: &Path) -> WriteOutcome {
        if !snapshot.is_file() {
            return WriteOutcome::Error(format!("metadata backup not found: {}", snapshot.display()));
        }

        if self.settings.mode.is_simulated() {
            let preview = simulated_staging_path(path, "restore");
            let args = build_restore_args(path, snapshot, &preview);
            self.settings.report_simulated(TOOL, &self.ffmpeg_path, &args);
            return WriteOutcome::Ok;
        }

        let staged = match StagedOutput::new(path, "restore") {
            Ok(staged) => staged,
            Err(e) => return WriteOutcome::Error(format!("cannot stage output: {}", e)),
        };
        let args = build_restore_args(path, snapshot, staged.path());
        if let Err(e) = self.run(&args, path) {
            return WriteOutcome::Error(e.to_string());
        }
        tracing::debug!(cmd = %render_command(&self.ffmpeg_path, &args), "Restored metadata");
        staged
            .commit(path, self.settings.atomic_replace, self.settings.replace_policy)
            .map_or_else(WriteOutcome::from, |()| WriteOutcome::Ok)
    }
}
