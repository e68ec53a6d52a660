//! Expanding a project archive over the working tree.

use crate::detector::relative_path;
use crate::error::Result;
use crate::workspace::STATE_DIR;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use zip::ZipArchive;

#[derive(Debug, Default, Clone)]
pub struct ExpandReport {
    pub files_written: usize,
    pub bytes_written: u64,
    /// Entries refused for escaping the destination or targeting the state directory.
    pub skipped: Vec<String>,
}

/// Extract every file of a zip archive under `dest`, replacing existing files.
///
/// Files already in `dest` but absent from the archive are left alone.
pub fn expand_zip(archive_path: &Path, dest: &Path) -> Result<ExpandReport> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;
    let mut report = ExpandReport::default();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let raw_name = entry.name().to_string();
        let Some(rel) = entry.enclosed_name() else {
            tracing::warn!("Refusing unsafe archive entry {:?}", raw_name);
            report.skipped.push(raw_name);
            continue;
        };
        let Some(rel_str) = relative_path(Path::new(""), &rel) else {
            report.skipped.push(raw_name);
            continue;
        };
        if rel_str.is_empty() {
            continue;
        }
        if rel_str.split('/').next() == Some(STATE_DIR) {
            tracing::warn!("Refusing archive entry inside {}: {}", STATE_DIR, rel_str);
            report.skipped.push(rel_str);
            continue;
        }

        if through_symlink(dest, &rel) {
            tracing::warn!("Refusing archive entry below a symlink: {}", rel_str);
            report.skipped.push(rel_str);
            continue;
        }

        let target = dest.join(&rel);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        // Replace a link at the target itself instead of writing through it.
        if fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink()) {
            fs::remove_file(&target)?;
        }
        let mut out = File::create(&target)?;
        report.bytes_written += io::copy(&mut entry, &mut out)?;
        report.files_written += 1;
        tracing::debug!("extracted {}", rel_str);
    }

    Ok(report)
}

/// Whether an existing directory between `dest` and `rel`'s final component is a symlink.
fn through_symlink(dest: &Path, rel: &Path) -> bool {
    let mut current = dest.to_path_buf();
    let Some(parent) = rel.parent() else {
        return false;
    };
    for component in parent.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(m) if m.file_type().is_symlink() => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_expand_overlays_without_removing() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("tree");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("local_only.txt"), "keep").unwrap();
        fs::write(dest.join("a.txt"), "old").unwrap();

        let zip_path = tmp.path().join("p.zip");
        build_zip(&zip_path, &[("a.txt", "new"), ("src/lib.rs", "fn x() {}")]);

        let report = expand_zip(&zip_path, &dest).unwrap();
        assert_eq!(report.files_written, 2);
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dest.join("src/lib.rs")).unwrap(), "fn x() {}");
        assert_eq!(fs::read_to_string(dest.join("local_only.txt")).unwrap(), "keep");
    }

    #[test]
    fn test_expand_refuses_escape_and_state_dir() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("tree");
        fs::create_dir_all(&dest).unwrap();

        let zip_path = tmp.path().join("p.zip");
        build_zip(
            &zip_path,
            &[("../evil.txt", "x"), (".pmg/vcs.db", "x"), ("ok.txt", "fine")],
        );

        let report = expand_zip(&zip_path, &dest).unwrap();
        assert_eq!(report.files_written, 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(!tmp.path().join("evil.txt").exists());
        assert!(!dest.join(".pmg").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_expand_does_not_write_through_symlinks() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("tree");
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&dest).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("target.txt"), "precious").unwrap();
        symlink(outside.join("target.txt"), dest.join("link.txt")).unwrap();
        symlink(&outside, dest.join("linkdir")).unwrap();

        let zip_path = tmp.path().join("p.zip");
        build_zip(&zip_path, &[("link.txt", "from archive"), ("linkdir/x.txt", "x")]);

        let report = expand_zip(&zip_path, &dest).unwrap();
        assert_eq!(report.files_written, 1);
        assert_eq!(report.skipped, vec!["linkdir/x.txt"]);
        assert_eq!(fs::read_to_string(outside.join("target.txt")).unwrap(), "precious");
        assert!(!fs::symlink_metadata(dest.join("link.txt")).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(dest.join("link.txt")).unwrap(), "from archive");
        assert!(!outside.join("x.txt").exists());
    }
}
