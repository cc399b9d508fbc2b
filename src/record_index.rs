use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Suffixes of observation records written next to downloaded exposures.
pub const RECORD_SUFFIXES: &[&str] = &[".fits.fz.txt", ".fits.txt"];

/// One observation record found under the scan root.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    /// First path component below the root, used as the object identifier.
    pub object: String,
    pub path: PathBuf,
}

/// In-memory index of a download tree: every record, plus a filename lookup
/// for locating the exposures the records point at.
#[derive(Debug, Clone)]
pub struct RecordIndex {
    records: Vec<RecordEntry>,
    /// Records with no object directory between them and the root.
    unassigned: Vec<PathBuf>,
    file_map: HashMap<String, Vec<PathBuf>>,
}

impl RecordIndex {
    /// Walk `root` and collect records and file locations.
    pub fn build(root: &Path) -> Result<Self> {
        tracing::info!("🌳 Scanning for observation records in: {}", root.display());
        let start_time = std::time::Instant::now();

        if !root.is_dir() {
            return Err(anyhow::anyhow!("Not a directory: {}", root.display()));
        }

        let mut file_map: HashMap<String, Vec<PathBuf>> = HashMap::new();
        let mut total_dirs = 0;
        Self::scan_directory(root, &mut file_map, &mut total_dirs);

        let mut records = Vec::new();
        let mut unassigned = Vec::new();
        let record_paths = file_map
            .iter()
            .filter(|(name, _)| is_record(name))
            .flat_map(|(_, paths)| paths.iter());
        for path in record_paths {
            match object_id(root, path) {
                Some(object) => records.push(RecordEntry {
                    object,
                    path: path.clone(),
                }),
                None => {
                    tracing::warn!(
                        "⏭️  Skipping {}: could not determine object ID",
                        path.display()
                    );
                    unassigned.push(path.clone());
                }
            }
        }
        records.sort_by(|a, b| a.path.cmp(&b.path));
        unassigned.sort();

        tracing::info!(
            "🌳 Scanned {} directories in {:.2}s: {} records",
            total_dirs,
            start_time.elapsed().as_secs_f64(),
            records.len()
        );

        Ok(Self {
            records,
            unassigned,
            file_map,
        })
    }

    fn scan_directory(
        dir: &Path,
        file_map: &mut HashMap<String, Vec<PathBuf>>,
        total_dirs: &mut usize,
    ) {
        if let Some(dir_name) = dir.file_name() {
            let name = dir_name.to_string_lossy();
            if matches!(name.as_ref(), ".git" | "target" | ".cache") {
                tracing::trace!("⏭️  Skipping directory: {:?}", dir);
                return;
            }
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("⚠️  Cannot read directory {:?}: {}", dir, e);
                return;
            }
        };
        *total_dirs += 1;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::trace!("⚠️  Error reading entry in {:?}: {}", dir, e);
                    continue;
                }
            };

            let path = entry.path();
            if path.is_dir() {
                Self::scan_directory(&path, file_map, total_dirs);
            } else if let Some(filename) = path.file_name().and_then(|n| n.to_str()) {
                file_map
                    .entry(filename.to_string())
                    .or_default()
                    .push(path.clone());
            }
        }
    }

    pub fn records(&self) -> &[RecordEntry] {
        &self.records
    }

    /// Records found directly under the root, which name no object.
    pub fn unassigned(&self) -> &[PathBuf] {
        &self.unassigned
    }

    /// All paths carrying the given file name.
    pub fn find_file(&self, filename: &str) -> Option<&Vec<PathBuf>> {
        self.file_map.get(filename)
    }

    /// Locate `filename`, preferring the directory of `record`.
    pub fn locate(&self, record: &Path, filename: &str) -> Option<PathBuf> {
        if let Some(dir) = record.parent() {
            let sibling = dir.join(filename);
            if sibling.is_file() {
                return Some(sibling);
            }
        }
        self.find_file(filename)?.first().cloned()
    }
}

fn is_record(name: &str) -> bool {
    RECORD_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// First directory below `root` on the way to `path`.
fn object_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut components = relative.components();
    let first = components.next()?;
    // A record directly under the root has no object directory.
    components.next()?;
    match first {
        Component::Normal(name) => Some(name.to_string_lossy().to_string()),
        _ => None,
    }
}

/// Map a science file name from a record onto the image to process.
///
/// `ztf_..._sciimg.fits` becomes `ztf_..._scimrefdiffimg.fits` with the
/// default suffixes. Names without the science suffix are kept as is.
pub fn image_file_name(listed: &str, science_suffix: &str, image_suffix: &str) -> String {
    match listed.strip_suffix(science_suffix) {
        Some(stem) => format!("{stem}{image_suffix}"),
        None => listed.to_string(),
    }
}
