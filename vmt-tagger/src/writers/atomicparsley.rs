//! AtomicParsley atom writer
//!
//! Writes iTunes-style atoms into MP4-family files. Keys without a dedicated
//! flag become reverse-DNS freeform atoms under the configured namespace; the
//! `iTunMOVI` plist goes under `com.apple.iTunes`.

use super::{
    run_tool, simulated_staging_path, StagedOutput, TagWriter, WriteOutcome, WriteRequest, WriterError,
    WriterSettings,
};
use crate::mapping::{ARTWORK_KEY, ITUNMOVI_KEY};
use std::ffi::OsString;
use std::path::Path;

const TOOL: &str = "AtomicParsley";
const ITUNES_DOMAIN: &str = "com.apple.iTunes";
const LIST_SEPARATOR: &str = ", ";

/// Dedicated AtomicParsley flag for a plan output key
fn atom_flag(key: &str) -> Option<&'static str> {
    let flag = match key {
        "title" => "--title",
        "artist" => "--artist",
        "album_artist" => "--albumArtist",
        "album" => "--album",
        "genre" => "--genre",
        "year" => "--year",
        "comment" => "--comment",
        "description" => "--description",
        "longdesc" => "--longdesc",
        "copyright" => "--copyright",
        "grouping" => "--grouping",
        "tv_show" => "--TVShowName",
        "tv_season" => "--TVSeasonNum",
        "tv_episode" => "--TVEpisodeNum",
        "tv_network" => "--TVNetwork",
        "hd_video" => "--hdvideo",
        "stik" => "--stik",
        _ => return None,
    };
    Some(flag)
}

pub struct AtomicParsleyWriter {
    program: String,
    rdns_namespace: String,
    settings: WriterSettings,
}

impl AtomicParsleyWriter {
    pub fn new(program: impl Into<String>, rdns_namespace: impl Into<String>, settings: WriterSettings) -> Self {
        Self {
            program: program.into(),
            rdns_namespace: rdns_namespace.into().trim().to_string(),
            settings,
        }
    }

    /// Arguments writing `request` into `output`
    pub fn build_args(&self, request: &WriteRequest<'_>, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![request.path.into(), "--output".into(), output.into()];
        if request.clear_existing {
            args.push("--metaEnema".into());
        }

        let mut freeform = Vec::new();
        for (key, value) in request.tags.iter() {
            if key == ARTWORK_KEY {
                continue;
            }
            let text = value.joined(LIST_SEPARATOR);
            if text.trim().is_empty() {
                continue;
            }
            match atom_flag(key) {
                Some(flag) => {
                    args.push(flag.into());
                    args.push(text.into());
                }
                None => freeform.push((key, text)),
            }
        }

        for (key, text) in freeform {
            let domain = if key == ITUNMOVI_KEY {
                ITUNES_DOMAIN
            } else if self.rdns_namespace.is_empty() {
                continue;
            } else {
                self.rdns_namespace.as_str()
            };
            args.push("--rDNSatom".into());
            args.push(text.into());
            args.push(format!("name={}", key).into());
            args.push(format!("domain={}", domain).into());
        }

        if let Some(artwork) = request.artwork {
            if request.remove_existing_artwork {
                args.push("--artwork".into());
                args.push("REMOVE_ALL".into());
            }
            args.push("--artwork".into());
            args.push(artwork.into());
        }
        args
    }

    fn run(&self, args: &[OsString], target: &Path) -> Result<(), WriterError> {
        run_tool(TOOL, &self.program, args, target, &self.settings.run_log).map(|_| ())
    }
}

impl TagWriter for AtomicParsleyWriter {
    fn name(&self) -> &'static str {
        TOOL
    }

    fn write(&self, request: &WriteRequest<'_>) -> WriteOutcome {
        if request.tags.is_empty() && request.artwork.is_none() {
            return WriteOutcome::Ok;
        }

        if self.settings.mode.is_simulated() {
            let preview = simulated_staging_path(request.path, "tagtmp");
            let args = self.build_args(request, &preview);
            self.settings.report_simulated(TOOL, &self.program, &args);
            return WriteOutcome::Ok;
        }

        let staged = match StagedOutput::new(request.path, "tagtmp") {
            Ok(staged) => staged,
            Err(e) => return WriteOutcome::Error(format!("cannot stage output: {}", e)),
        };
        let args = self.build_args(request, staged.path());
        tracing::info!(path = %request.path.display(), "AtomicParsley: write metadata");
        if let Err(e) = self.run(&args, request.path) {
            return WriteOutcome::Error(e.to_string());
        }

        match staged.commit(request.path, self.settings.atomic_replace, self.settings.replace_policy) {
            Ok(()) => {
                tracing::info!(path = %request.path.display(), "AtomicParsley: write metadata complete");
                WriteOutcome::Ok
            }
            Err(e) => {
                self.settings.run_log.append(&format!(
                    "[atomicparsley] {}\nerror: {}",
                    request.path.display(),
                    e
                ));
                e.into()
            }
        }
    }
}
