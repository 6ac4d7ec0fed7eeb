//! Archive extractor
//!
//! The corpus ships as ZIP bundles. A JSON manifest lists which archive
//! expands into which directory; extraction is skipped when the target
//! directory is already newer than the archive. A missing manifest is a
//! warning, not an error: an operator may have pre-extracted the bundles.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub version: Option<String>,
    pub archives: Vec<ArchiveEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveEntry {
    /// Archive path, relative to the data directory.
    pub archive: String,
    /// Extraction target directory, relative to the data directory.
    pub extract_dir: String,
}

#[derive(Debug, Default)]
pub struct ExtractSummary {
    pub extracted: usize,
    pub skipped: usize,
}

/// Load the manifest. Returns None when the file does not exist.
pub fn load_manifest(path: &Path) -> Result<Option<Manifest>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("cannot read manifest {}", path.display()))?;
    let manifest: Manifest = serde_json::from_str(&content)
        .with_context(|| format!("cannot parse manifest {}", path.display()))?;
    Ok(Some(manifest))
}

/// An archive needs extraction when the target directory is absent or its
/// mtime precedes the archive's mtime.
pub fn needs_extraction(archive: &Path, target: &Path) -> Result<bool> {
    if !target.exists() {
        return Ok(true);
    }
    let archive_mtime = fs::metadata(archive)
        .with_context(|| format!("cannot stat archive {}", archive.display()))?
        .modified()?;
    let target_mtime = fs::metadata(target)?.modified()?;
    Ok(target_mtime < archive_mtime)
}

/// Expand every member of `archive` into `target`. Returns the member count.
pub fn extract_archive(archive: &Path, target: &Path) -> Result<usize> {
    let file = fs::File::open(archive)
        .with_context(|| format!("cannot open archive {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("cannot read archive {}", archive.display()))?;

    fs::create_dir_all(target)?;

    let mut members = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            // Member path escapes the target directory; never write it.
            bail!(
                "archive {} has an unsafe member path {:?}",
                archive.display(),
                entry.name()
            );
        };
        let out_path = target.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)
            .with_context(|| format!("cannot create {}", out_path.display()))?;
        std::io::copy(&mut entry, &mut out)?;
        members += 1;
    }

    Ok(members)
}

/// Walk the manifest and extract whatever is stale.
pub fn extract_all(manifest: &Manifest, data_dir: &Path) -> Result<ExtractSummary> {
    let mut summary = ExtractSummary::default();
    for entry in &manifest.archives {
        let archive = resolve(data_dir, &entry.archive);
        let target = resolve(data_dir, &entry.extract_dir);

        if needs_extraction(&archive, &target)? {
            println!("  extracting {} -> {}", archive.display(), target.display());
            let members = extract_archive(&archive, &target)?;
            println!("    {} member(s)", members);
            summary.extracted += 1;
        } else {
            println!("  up to date: {}", target.display());
            summary.skipped += 1;
        }
    }
    Ok(summary)
}

fn resolve(data_dir: &Path, relative: &str) -> PathBuf {
    let p = Path::new(relative);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        data_dir.join(p)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, members: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in members {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_manifest_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(
            &path,
            r#"{"version":"1","archives":[{"archive":"bundles/prices.zip","extract_dir":"datasets/prices"}]}"#,
        )
        .unwrap();
        let manifest = load_manifest(&path).unwrap().unwrap();
        assert_eq!(manifest.archives.len(), 1);
        assert_eq!(manifest.archives[0].archive, "bundles/prices.zip");
    }

    #[test]
    fn test_manifest_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_manifest(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn test_needs_extraction_when_target_absent() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.zip");
        write_zip(&archive, &[("f.csv", "a,b\n")]);
        assert!(needs_extraction(&archive, &dir.path().join("out")).unwrap());
    }

    #[test]
    fn test_extract_then_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.zip");
        write_zip(&archive, &[("sub/f.csv", "a,b\n1,2\n"), ("g.csv", "x\n")]);
        let target = dir.path().join("out");

        let members = extract_archive(&archive, &target).unwrap();
        assert_eq!(members, 2);
        assert_eq!(
            fs::read_to_string(target.join("sub/f.csv")).unwrap(),
            "a,b\n1,2\n"
        );

        // Freshly created target is at least as new as the archive.
        assert!(!needs_extraction(&archive, &target).unwrap());
    }

    #[test]
    fn test_extract_all_skips_fresh_targets() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(&dir.path().join("a.zip"), &[("f.csv", "x\n")]);
        let manifest = Manifest {
            version: None,
            archives: vec![ArchiveEntry {
                archive: "a.zip".into(),
                extract_dir: "out".into(),
            }],
        };

        let first = extract_all(&manifest, dir.path()).unwrap();
        assert_eq!(first.extracted, 1);
        let second = extract_all(&manifest, dir.path()).unwrap();
        assert_eq!(second.skipped, 1);
    }
}
