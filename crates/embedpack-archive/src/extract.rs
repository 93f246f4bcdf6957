use std::path::{Path, PathBuf};

use log::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("expected exactly one nested stdlib archive, found {found}")]
    StdlibArchive { found: usize },
}

impl ArchiveError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    pub(crate) fn io_with_path(
        context: &'static str,
        path: &Path,
        source: &std::io::Error,
    ) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }
}

/// Unpack an embeddable distribution archive into `dest` and normalize the
/// layout: the nested `pythonXY.zip` standard-library archive is expanded
/// into `Lib/` and removed, and the `DLLs/` and `Lib/site-packages/`
/// directories the isolated layout expects are created.
///
/// # Errors
/// Returns an error if any zip or filesystem operation fails, or if the
/// extracted tree does not contain exactly one nested stdlib archive.
pub fn extract_distribution(archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    extract_zip(archive_path, dest)?;

    let stdlib = find_stdlib_archive(dest)?;
    let lib_dir = dest.join("Lib");
    extract_zip(&stdlib, &lib_dir)?;
    std::fs::remove_file(&stdlib)
        .map_err(|e| ArchiveError::io_with_path("failed to remove stdlib archive", &stdlib, &e))?;

    for dir in [dest.join("DLLs"), lib_dir.join("site-packages")] {
        std::fs::create_dir_all(&dir)
            .map_err(|e| ArchiveError::io_with_path("failed to create layout directory", &dir, &e))?;
    }

    debug!("distribution extracted to {}", dest.display());
    Ok(())
}

/// Locate the nested standard-library archive (`python39.zip` and friends)
/// among the extracted top-level files. Zero or several candidates means
/// the upstream layout changed and is reported as an error rather than an
/// arbitrary pick.
fn find_stdlib_archive(dest: &Path) -> Result<PathBuf, ArchiveError> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dest)
        .map_err(|e| ArchiveError::io_with_path("failed to read extracted tree", dest, &e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path.file_name().and_then(|n| n.to_str()).is_some_and(|name| {
                    name.starts_with("python") && name.ends_with(".zip")
                })
        })
        .collect();

    if candidates.len() != 1 {
        return Err(ArchiveError::StdlibArchive {
            found: candidates.len(),
        });
    }
    Ok(candidates.remove(0))
}

pub(crate) fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = std::fs::File::open(zip_path)
        .map_err(|e| ArchiveError::io_with_path("failed to open zip file", zip_path, &e))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| ArchiveError::zip("failed to read zip archive", e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArchiveError::zip("failed to read zip entry", e))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| {
                ArchiveError::io_with_path("failed to create extraction directory", &out_path, &e)
            })?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ArchiveError::io_with_path(
                        "failed to create extraction parent directory",
                        parent,
                        &e,
                    )
                })?;
            }
            let mut outfile = std::fs::File::create(&out_path).map_err(|e| {
                ArchiveError::io_with_path("failed to create extracted file", &out_path, &e)
            })?;
            std::io::copy(&mut entry, &mut outfile).map_err(|e| {
                ArchiveError::io_with_path("failed to extract archive entry", &out_path, &e)
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    let _ =
                        std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::path::Path;

    use super::{ArchiveError, extract_distribution};

    fn nested_stdlib_bytes() -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        writer
            .start_file("encodings/__init__.pyc", options)
            .expect("stdlib entry should be started");
        writer
            .write_all(b"stdlib-bytecode")
            .expect("stdlib entry should be written");
        writer.finish().expect("stdlib archive should be finalized");
        buffer.into_inner()
    }

    fn write_distribution(path: &Path, stdlib_names: &[&str]) {
        let file = std::fs::File::create(path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);

        writer
            .start_file("python.exe", options)
            .expect("interpreter entry should be started");
        writer
            .write_all(b"interpreter")
            .expect("interpreter entry should be written");

        writer
            .start_file("python39._pth", options)
            .expect("pth entry should be started");
        writer
            .write_all(b"python39.zip\n.\n")
            .expect("pth entry should be written");

        let stdlib = nested_stdlib_bytes();
        for name in stdlib_names {
            writer
                .start_file(*name, options)
                .expect("stdlib entry should be started");
            writer
                .write_all(&stdlib)
                .expect("stdlib entry should be written");
        }

        writer.finish().expect("zip archive should be finalized");
    }

    #[test]
    fn extracts_and_normalizes_layout() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let archive = temp.path().join("python-3.9.13-embed-amd64.zip");
        let dest = temp.path().join("work");
        write_distribution(&archive, &["python39.zip"]);

        extract_distribution(&archive, &dest).expect("distribution should extract");

        assert!(dest.join("python.exe").exists());
        assert!(dest.join("python39._pth").exists());
        assert!(
            !dest.join("python39.zip").exists(),
            "nested stdlib archive should have been removed"
        );
        assert!(dest.join("DLLs").is_dir());
        assert!(dest.join("Lib/site-packages").is_dir());

        let stdlib_file = std::fs::read(dest.join("Lib/encodings/__init__.pyc"))
            .expect("stdlib file should have been expanded into Lib");
        assert_eq!(stdlib_file, b"stdlib-bytecode");
    }

    #[test]
    fn missing_stdlib_archive_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let archive = temp.path().join("dist.zip");
        let dest = temp.path().join("work");
        write_distribution(&archive, &[]);

        let result = extract_distribution(&archive, &dest);
        assert!(matches!(
            result,
            Err(ArchiveError::StdlibArchive { found: 0 })
        ));
    }

    #[test]
    fn multiple_stdlib_candidates_are_an_error() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let archive = temp.path().join("dist.zip");
        let dest = temp.path().join("work");
        write_distribution(&archive, &["python39.zip", "python38.zip"]);

        let result = extract_distribution(&archive, &dest);
        assert!(matches!(
            result,
            Err(ArchiveError::StdlibArchive { found: 2 })
        ));
    }
}
