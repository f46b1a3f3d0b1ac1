// pydeps-aio/src/extract.rs
// Reads dependency metadata out of distribution archives held in memory.
// Nothing is unpacked to disk.

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use pydeps_common::error::{PydepsError, Result};
use tracing::debug;
use zip::ZipArchive;

/// Metadata-bearing files found at the top of a source distribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdistManifest {
    pub pkg_info: Option<String>,
    pub requires_txt: Option<String>,
    pub setup_py: Option<String>,
    pub setup_cfg: Option<String>,
}

impl SdistManifest {
    pub fn is_empty(&self) -> bool {
        self.pkg_info.is_none()
            && self.requires_txt.is_none()
            && self.setup_py.is_none()
            && self.setup_cfg.is_none()
    }
}

/// Which manifest slot a member path fills, and how deep it sits. Shallower
/// members win.
fn classify(path: &str) -> Option<(Slot, usize)> {
    let parts: Vec<&str> = path.trim_start_matches("./").split('/').filter(|p| !p.is_empty()).collect();
    let depth = parts.len();
    let file = *parts.last()?;
    let parent = if depth >= 2 { parts[depth - 2] } else { "" };
    match file {
        "PKG-INFO" if depth == 2 => Some((Slot::PkgInfo, depth)),
        "PKG-INFO" if depth <= 4 && parent.ends_with(".egg-info") => Some((Slot::PkgInfo, depth)),
        "requires.txt" if depth <= 4 && parent.ends_with(".egg-info") => {
            Some((Slot::RequiresTxt, depth))
        }
        "setup.py" if depth == 2 => Some((Slot::SetupPy, depth)),
        "setup.cfg" if depth == 2 => Some((Slot::SetupCfg, depth)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    PkgInfo,
    RequiresTxt,
    SetupPy,
    SetupCfg,
}

#[derive(Default)]
struct Collector {
    found: [Option<(usize, String)>; 4],
}

impl Collector {
    fn index(slot: Slot) -> usize {
        match slot {
            Slot::PkgInfo => 0,
            Slot::RequiresTxt => 1,
            Slot::SetupPy => 2,
            Slot::SetupCfg => 3,
        }
    }

    fn wants(&self, slot: Slot, depth: usize) -> bool {
        match &self.found[Self::index(slot)] {
            Some((existing, _)) => depth < *existing,
            None => true,
        }
    }

    fn offer(&mut self, slot: Slot, depth: usize, text: String) {
        if self.wants(slot, depth) {
            self.found[Self::index(slot)] = Some((depth, text));
        }
    }

    fn finish(self) -> SdistManifest {
        let [pkg_info, requires_txt, setup_py, setup_cfg] = self.found.map(|f| f.map(|(_, t)| t));
        SdistManifest {
            pkg_info,
            requires_txt,
            setup_py,
            setup_cfg,
        }
    }
}

fn read_text<R: Read>(reader: &mut R, path: &str) -> Result<String> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw).map_err(|e| {
        PydepsError::Generic(format!("Failed to read archive member {path}: {e}"))
    })?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// The `*.dist-info/METADATA` member of a wheel, if present.
pub fn read_wheel_metadata(bytes: &[u8]) -> Result<Option<String>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let member = archive
        .file_names()
        .filter(|name| {
            let parts: Vec<&str> = name.split('/').collect();
            parts.len() == 2 && parts[0].ends_with(".dist-info") && parts[1] == "METADATA"
        })
        .min()
        .map(str::to_string);
    let Some(member) = member else {
        debug!("Wheel has no dist-info METADATA member");
        return Ok(None);
    };
    let mut file = archive.by_name(&member)?;
    read_text(&mut file, &member).map(Some)
}

/// Collects `PKG-INFO`, `requires.txt`, `setup.py` and `setup.cfg` from an
/// sdist. The archive format follows the filename.
pub fn read_sdist_manifest(bytes: &[u8], filename: &str) -> Result<SdistManifest> {
    let lower = filename.to_ascii_lowercase();
    let manifest = if lower.ends_with(".zip") {
        read_zip_manifest(bytes)?
    } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        read_tar_manifest(GzDecoder::new(bytes))?
    } else if lower.ends_with(".tar") {
        read_tar_manifest(bytes)?
    } else {
        return Err(PydepsError::Generic(format!(
            "Unsupported source archive format: {filename}"
        )));
    };
    debug!(
        "Read {filename}: PKG-INFO={} requires.txt={} setup.py={} setup.cfg={}",
        manifest.pkg_info.is_some(),
        manifest.requires_txt.is_some(),
        manifest.setup_py.is_some(),
        manifest.setup_cfg.is_some()
    );
    Ok(manifest)
}

fn read_zip_manifest(bytes: &[u8]) -> Result<SdistManifest> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut collector = Collector::default();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let path = file.name().to_string();
        if let Some((slot, depth)) = classify(&path) {
            if collector.wants(slot, depth) {
                let text = read_text(&mut file, &path)?;
                collector.offer(slot, depth, text);
            }
        }
    }
    Ok(collector.finish())
}

fn read_tar_manifest<R: Read>(reader: R) -> Result<SdistManifest> {
    let mut archive = tar::Archive::new(reader);
    let mut collector = Collector::default();
    let entries = archive
        .entries()
        .map_err(|e| PydepsError::Generic(format!("Failed to read TAR archive: {e}")))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| PydepsError::Generic(format!("Failed to read TAR entry: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = match entry.path() {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) => {
                debug!("Skipping TAR entry with unreadable path: {e}");
                continue;
            }
        };
        if let Some((slot, depth)) = classify(&path) {
            if collector.wants(slot, depth) {
                let text = read_text(&mut entry, &path)?;
                collector.offer(slot, depth, text);
            }
        }
    }
    Ok(collector.finish())
}

pub async fn read_wheel_metadata_async(bytes: Vec<u8>) -> Result<Option<String>> {
    tokio::task::spawn_blocking(move || read_wheel_metadata(&bytes))
        .await
        .map_err(|e| PydepsError::Generic(format!("JoinError in wheel metadata read: {e}")))?
}

pub async fn read_sdist_manifest_async(bytes: Vec<u8>, filename: String) -> Result<SdistManifest> {
    tokio::task::spawn_blocking(move || read_sdist_manifest(&bytes, &filename))
        .await
        .map_err(|e| PydepsError::Generic(format!("JoinError in sdist read: {e}")))?
}
