//! Archive extraction for downloaded launcher builds.
//!
//! Release assets and CI artifacts are ZIP files; CI artifacts sometimes wrap
//! a single `.tar.gz` so that file modes survive the artifact store. Both are
//! unpacked in place with every entry kept at its recorded relative path.
//!
//! Entry paths are validated before anything is written: absolute paths and
//! `..` components abort the whole extraction with an `Io` error, so no entry
//! can land outside the destination directory.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use crate::errors::LauncherError;

/// Permission bits restored from archive entries (setuid/setgid are dropped).
#[cfg(unix)]
const MODE_MASK: u32 = 0o777;

const ZIP_MAGIC: [u8; 2] = *b"PK";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Recognized archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// PKZIP archive.
    Zip,
    /// Gzip-compressed tarball.
    TarGz,
}

/// Detects the archive format of `archive_path` from its leading bytes.
///
/// # Errors
///
/// Returns an `Io` error if the file cannot be read or is neither ZIP nor gzip.
pub fn detect_format(archive_path: &Path) -> Result<ArchiveFormat> {
    let mut file = open(archive_path)?;
    let mut magic = [0u8; 2];
    file.read_exact(&mut magic).map_err(|e| {
        LauncherError::io(format!("failed to read {}", archive_path.display()), e)
    })?;

    match magic {
        ZIP_MAGIC => Ok(ArchiveFormat::Zip),
        GZIP_MAGIC => Ok(ArchiveFormat::TarGz),
        _ => Err(LauncherError::io_message(format!(
            "unrecognized archive format: {}",
            archive_path.display()
        ))
        .into()),
    }
}

/// Extracts an archive (ZIP or tar.gz) into `dest_dir`.
///
/// The format is sniffed from the file contents, not its name. Returns the
/// number of files written.
///
/// # Errors
///
/// Returns an `Io` error if the archive is unreadable, contains an entry that
/// would escape `dest_dir`, or any entry fails to extract. Extraction stops at
/// the first failing entry.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    match detect_format(archive_path)? {
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir),
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest_dir),
    }
}

/// Extracts a ZIP archive into `dest_dir`, restoring recorded unix modes.
///
/// If the archive holds nothing but a single `.tar.gz` (plus optional
/// `.sha256`), that tarball is extracted as well and removed.
///
/// # Errors
///
/// See [`extract_archive`].
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let file = open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        LauncherError::io_other(
            format!("failed to read ZIP archive {}", archive_path.display()),
            e,
        )
    })?;

    create_dir_all(dest_dir)?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| {
            LauncherError::io_other(format!("failed to read archive entry {i}"), e)
        })?;

        let relative_path = checked_relative_path(entry.name())?;
        let output_path = dest_dir.join(&relative_path);
        debug!(entry = %relative_path.display(), "extracting");

        if entry.is_dir() {
            create_dir_all(&output_path)?;
            continue;
        }

        write_entry(&mut entry, &output_path)?;
        if let Some(mode) = entry.unix_mode() {
            set_mode(&output_path, mode)?;
        }
        written += 1;
    }

    Ok(extract_nested_tar_gz_if_present(dest_dir)?.unwrap_or(written))
}

/// Extracts a tar.gz archive into `dest_dir`, restoring recorded unix modes.
///
/// Only regular files and directories are accepted.
///
/// # Errors
///
/// See [`extract_archive`].
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    create_dir_all(dest_dir)?;

    let decoder = GzDecoder::new(open(archive_path)?);
    let mut archive = Archive::new(decoder);
    let entries = archive.entries().map_err(|e| {
        LauncherError::io(
            format!("failed to read tar entries: {}", archive_path.display()),
            e,
        )
    })?;

    let mut written = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| {
            LauncherError::io(
                format!("failed to read tar entry: {}", archive_path.display()),
                e,
            )
        })?;

        let raw_path = entry
            .path()
            .map_err(|e| LauncherError::io("failed to get tar entry path", e))?
            .to_string_lossy()
            .into_owned();
        let relative_path = checked_relative_path(&raw_path)?;
        if relative_path.as_os_str().is_empty() {
            continue;
        }
        let output_path = dest_dir.join(&relative_path);
        debug!(entry = %relative_path.display(), "extracting");

        let entry_type = entry.header().entry_type();
        if entry_type.is_pax_global_extensions() {
            continue;
        }
        if entry_type.is_dir() {
            create_dir_all(&output_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = output_path.parent() {
                create_dir_all(parent)?;
            }
            entry.unpack(&output_path).map_err(|e| {
                LauncherError::io(format!("failed to extract {}", output_path.display()), e)
            })?;
            written += 1;
        } else {
            return Err(LauncherError::io_message(format!(
                "refusing to extract non-regular entry: {raw_path}"
            ))
            .into());
        }
    }

    Ok(written)
}

/// Validates an archive entry name and returns it as a relative path.
///
/// Rejects absolute paths, drive prefixes and `..` components. `.` components
/// are dropped.
fn checked_relative_path(name: &str) -> Result<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut relative = PathBuf::new();

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(LauncherError::io_message(format!(
                    "refusing to extract path with parent directory or absolute reference: {name}"
                ))
                .into());
            }
        }
    }

    Ok(relative)
}

/// Extracts a nested tar.gz if it is the only content of `dest_dir`.
///
/// Checksum files and dotfiles next to the tarball do not count as content.
/// Only the tarball and its `<name>.sha256` sibling are removed afterwards.
///
/// Returns the number of files extracted from it, or `None` when there is no
/// lone tarball to unpack.
fn extract_nested_tar_gz_if_present(dest_dir: &Path) -> Result<Option<usize>> {
    let entries: Vec<PathBuf> = std::fs::read_dir(dest_dir)
        .map_err(|e| LauncherError::io(format!("failed to read {}", dest_dir.display()), e))?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .collect();

    let is_tar_gz = |p: &PathBuf| {
        p.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".tar.gz") || n.ends_with(".tgz"))
    };
    let is_meta = |p: &PathBuf| {
        p.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".sha256") || n.starts_with('.'))
    };

    let tarballs: Vec<&PathBuf> = entries.iter().filter(|p| is_tar_gz(p)).collect();
    let content: Vec<&PathBuf> = entries.iter().filter(|p| !is_meta(p)).collect();
    if tarballs.len() != 1 || content.len() != 1 || !tarballs[0].is_file() {
        return Ok(None);
    }

    let tar_gz_path = tarballs[0].clone();
    debug!(archive = %tar_gz_path.display(), "unpacking nested tarball");
    let written = extract_tar_gz(&tar_gz_path, dest_dir)?;

    std::fs::remove_file(&tar_gz_path).ok();
    let mut checksum = tar_gz_path.into_os_string();
    checksum.push(".sha256");
    std::fs::remove_file(checksum).ok();

    Ok(Some(written))
}

fn open(path: &Path) -> Result<File> {
    File::open(path)
        .map_err(|e| LauncherError::io(format!("failed to open {}", path.display()), e).into())
}

fn create_dir_all(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| {
        LauncherError::io(format!("failed to create directory {}", path.display()), e).into()
    })
}

fn write_entry<R: Read>(entry: &mut R, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        create_dir_all(parent)?;
    }
    let mut outfile = File::create(output_path).map_err(|e| {
        LauncherError::io(format!("failed to create {}", output_path.display()), e)
    })?;
    std::io::copy(entry, &mut outfile).map_err(|e| {
        LauncherError::io(format!("failed to extract {}", output_path.display()), e)
    })?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & MODE_MASK)).map_err(
        |e| LauncherError::io(format!("failed to set permissions on {}", path.display()), e),
    )?;
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::classify;
    use crate::release::github::fake::zip_bytes;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tar::Builder;

    fn temp_test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bootstrap_archive_{}_{}",
            name,
            rand::random::<u64>()
        ));
        std::fs::create_dir_all(&dir).expect("Should create temp dir");
        dir
    }

    fn write_tar_gz(archive_path: &Path, entries: &[(&str, &[u8], u32)]) {
        let file = File::create(archive_path).expect("Should create file");
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = Builder::new(encoder);

        for (name, contents, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder
                .append_data(&mut header, name, *contents)
                .expect("Should append file");
        }

        builder
            .into_inner()
            .expect("Should finish tar")
            .finish()
            .expect("Should finish gzip");
    }

    fn classify_io(err: &anyhow::Error) -> bool {
        matches!(classify(err), Some(LauncherError::Io { .. }))
    }

    #[test]
    fn detect_format_sniffs_magic_bytes() {
        let dir = temp_test_dir("detect");
        let zip_path = dir.join("artifact.download");
        std::fs::write(&zip_path, zip_bytes(&[("launcher", b"bin", 0o755)]))
            .expect("Should write");
        let tgz_path = dir.join("other.download");
        write_tar_gz(&tgz_path, &[("launcher", b"bin", 0o755)]);
        let junk_path = dir.join("junk.download");
        std::fs::write(&junk_path, b"<html>not found</html>").expect("Should write");

        assert_eq!(detect_format(&zip_path).expect("Should detect"), ArchiveFormat::Zip);
        assert_eq!(detect_format(&tgz_path).expect("Should detect"), ArchiveFormat::TarGz);
        assert!(classify_io(&detect_format(&junk_path).unwrap_err()));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn extract_zip_writes_all_nested_files_with_original_lengths() {
        let dir = temp_test_dir("zip_nested");
        let archive_path = dir.join("artifact.download");
        let dest = dir.join("out");
        let files: [(&str, &[u8], u32); 4] = [
            ("launcher", b"binary content", 0o755),
            ("lib/libfoo.so", b"library", 0o644),
            ("share/doc/README", b"read me please", 0o644),
            ("share/doc/deep/nested/file.txt", b"", 0o644),
        ];
        std::fs::write(&archive_path, zip_bytes(&files)).expect("Should write");

        let written = extract_archive(&archive_path, &dest).expect("Should extract");

        assert_eq!(written, files.len());
        for (name, contents, _) in files {
            let meta = std::fs::metadata(dest.join(name)).expect("Should exist");
            assert_eq!(meta.len(), contents.len() as u64, "length of {name}");
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn extract_zip_creates_directory_entries() {
        let dir = temp_test_dir("zip_dirs");
        let archive_path = dir.join("artifact.download");
        let dest = dir.join("out");
        std::fs::write(
            &archive_path,
            zip_bytes(&[("empty/", b"", 0o755), ("launcher", b"x", 0o755)]),
        )
        .expect("Should write");

        extract_zip(&archive_path, &dest).expect("Should extract");

        assert!(dest.join("empty").is_dir());
        assert!(dest.join("launcher").is_file());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn extract_zip_keeps_common_root_folder() {
        let dir = temp_test_dir("zip_root");
        let archive_path = dir.join("artifact.download");
        let dest = dir.join("out");
        std::fs::write(
            &archive_path,
            zip_bytes(&[("bundle/launcher", b"x", 0o755), ("bundle/lib/a", b"y", 0o644)]),
        )
        .expect("Should write");

        extract_zip(&archive_path, &dest).expect("Should extract");

        assert!(dest.join("bundle").join("launcher").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn extract_zip_restores_recorded_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = temp_test_dir("zip_modes");
        let archive_path = dir.join("artifact.download");
        let dest = dir.join("out");
        std::fs::write(
            &archive_path,
            zip_bytes(&[("launcher", b"x", 0o755), ("config.json", b"{}", 0o600)]),
        )
        .expect("Should write");

        extract_zip(&archive_path, &dest).expect("Should extract");

        let mode = |name: &str| {
            std::fs::metadata(dest.join(name))
                .expect("Should stat")
                .permissions()
                .mode()
                & 0o777
        };
        assert_eq!(mode("launcher"), 0o755);
        assert_eq!(mode("config.json"), 0o600);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn extract_zip_rejects_parent_traversal() {
        let dir = temp_test_dir("zip_traversal");
        let archive_path = dir.join("artifact.download");
        let dest = dir.join("out");
        std::fs::write(
            &archive_path,
            zip_bytes(&[("ok", b"x", 0o644), ("../escaped", b"evil", 0o644)]),
        )
        .expect("Should write");

        let err = extract_zip(&archive_path, &dest).unwrap_err();

        assert!(classify_io(&err));
        assert!(!dir.join("escaped").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn checked_relative_path_rejects_escapes() {
        assert!(checked_relative_path("../x").is_err());
        assert!(checked_relative_path("a/../../x").is_err());
        assert!(checked_relative_path("/etc/passwd").is_err());
        assert!(checked_relative_path("..\\windows\\x").is_err());
        assert_eq!(
            checked_relative_path("./a/b").expect("Should accept"),
            PathBuf::from("a").join("b")
        );
    }

    #[test]
    fn extract_tar_gz_writes_files() {
        let dir = temp_test_dir("tgz");
        let archive_path = dir.join("artifact.download");
        let dest = dir.join("out");
        write_tar_gz(
            &archive_path,
            &[("launcher", b"binary", 0o755), ("lib/a.so", b"lib", 0o644)],
        );

        let written = extract_archive(&archive_path, &dest).expect("Should extract");

        assert_eq!(written, 2);
        assert!(dest.join("launcher").is_file());
        assert!(dest.join("lib").join("a.so").is_file());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn extract_zip_with_nested_tar_gz_unpacks_it() {
        let dir = temp_test_dir("nested");
        let tarball = dir.join("launcher-linux-amd64.tar.gz");
        write_tar_gz(
            &tarball,
            &[("launcher", b"binary", 0o755), ("lib/a.so", b"lib", 0o644)],
        );
        let tar_bytes = std::fs::read(&tarball).expect("Should read");
        let archive_path = dir.join("artifact.download");
        std::fs::write(
            &archive_path,
            zip_bytes(&[
                ("launcher-linux-amd64.tar.gz", &tar_bytes, 0o644),
                ("launcher-linux-amd64.tar.gz.sha256", b"abc", 0o644),
            ]),
        )
        .expect("Should write");
        let dest = dir.join("out");

        extract_zip(&archive_path, &dest).expect("Should extract");

        assert!(dest.join("launcher").is_file());
        assert!(dest.join("lib").join("a.so").is_file());
        assert!(!dest.join("launcher-linux-amd64.tar.gz").exists());
        assert!(!dest.join("launcher-linux-amd64.tar.gz.sha256").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn nested_tar_gz_keeps_dotfiles() {
        let dir = temp_test_dir("nested_dotfiles");
        let tarball = dir.join("launcher-linux-amd64.tar.gz");
        write_tar_gz(
            &tarball,
            &[("launcher", b"binary", 0o755), (".launcherrc", b"from tar", 0o644)],
        );
        let tar_bytes = std::fs::read(&tarball).expect("Should read");
        let archive_path = dir.join("artifact.download");
        std::fs::write(
            &archive_path,
            zip_bytes(&[
                ("launcher-linux-amd64.tar.gz", &tar_bytes, 0o644),
                (".launcherrc", b"from zip", 0o644),
                (".keep", b"", 0o644),
            ]),
        )
        .expect("Should write");
        let dest = dir.join("out");

        extract_zip(&archive_path, &dest).expect("Should extract");

        assert!(dest.join("launcher").is_file());
        assert_eq!(
            std::fs::read(dest.join(".launcherrc")).expect("Should read"),
            b"from tar"
        );
        assert!(dest.join(".keep").is_file());
        assert!(!dest.join("launcher-linux-amd64.tar.gz").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn extract_zip_with_mixed_content_leaves_tarball() {
        let dir = temp_test_dir("mixed");
        let archive_path = dir.join("artifact.download");
        std::fs::write(
            &archive_path,
            zip_bytes(&[("bundle.tar.gz", b"not really", 0o644), ("launcher", b"x", 0o755)]),
        )
        .expect("Should write");
        let dest = dir.join("out");

        extract_zip(&archive_path, &dest).expect("Should extract");

        assert!(dest.join("bundle.tar.gz").is_file());
        assert!(dest.join("launcher").is_file());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn extract_corrupt_zip_is_io_error() {
        let dir = temp_test_dir("corrupt");
        let archive_path = dir.join("artifact.download");
        std::fs::write(&archive_path, b"PK\x03\x04garbage").expect("Should write");

        let err = extract_archive(&archive_path, &dir.join("out")).unwrap_err();

        assert!(classify_io(&err));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
