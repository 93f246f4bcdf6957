use std::io::{Read, Write as _};
use std::path::Path;

use log::debug;

use crate::extract::ArchiveError;

/// Serialize a working tree into a compressed archive at `out_path`.
///
/// Entries are walked in sorted order so identical trees produce identical
/// archives; names are relative to the tree root and use forward slashes.
/// Files are stored with maximum Deflate compression.
///
/// # Errors
/// Returns an error if the tree cannot be walked or the archive cannot be
/// written.
pub fn pack_tree(work_dir: &Path, out_path: &Path) -> Result<(), ArchiveError> {
    let file = std::fs::File::create(out_path)
        .map_err(|e| ArchiveError::io_with_path("failed to create archive", out_path, &e))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(9));

    let mut count: usize = 0;
    pack_dir(&mut writer, options, work_dir, work_dir, &mut count)?;

    writer
        .finish()
        .map_err(|e| ArchiveError::Zip {
            context: "failed to finalize archive",
            source: e,
        })?;

    debug!("packed {count} files into {}", out_path.display());
    Ok(())
}

fn pack_dir(
    writer: &mut zip::ZipWriter<std::fs::File>,
    options: zip::write::SimpleFileOptions,
    root: &Path,
    dir: &Path,
    count: &mut usize,
) -> Result<(), ArchiveError> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| ArchiveError::io_with_path("failed to read tree directory", dir, &e))?
        .collect::<Result<_, _>>()
        .map_err(|e| ArchiveError::io_with_path("failed to read tree entry", dir, &e))?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            pack_dir(writer, options, root, &path, count)?;
        } else {
            let name = archive_name(root, &path)?;
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| ArchiveError::Zip {
                    context: "failed to start archive entry",
                    source: e,
                })?;

            let mut file = std::fs::File::open(&path)
                .map_err(|e| ArchiveError::io_with_path("failed to open tree file", &path, &e))?;
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)
                .map_err(|e| ArchiveError::io_with_path("failed to read tree file", &path, &e))?;
            writer
                .write_all(&buffer)
                .map_err(|e| ArchiveError::io_with_path("failed to write archive entry", &path, &e))?;
            *count += 1;
        }
    }
    Ok(())
}

/// Archive-internal name: relative to the tree root, forward slashes, never
/// containing the root segment itself.
fn archive_name(root: &Path, path: &Path) -> Result<String, ArchiveError> {
    let relative = path.strip_prefix(root).map_err(|_| ArchiveError::Io {
        context: "tree file escaped the working tree root",
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            path.display().to_string(),
        ),
    })?;

    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(test)]
mod tests {
    use std::io::Read as _;

    use super::pack_tree;

    fn build_tree(root: &std::path::Path) {
        std::fs::create_dir_all(root.join("Lib/site-packages")).unwrap();
        std::fs::create_dir_all(root.join("DLLs")).unwrap();
        std::fs::write(root.join("python.exe"), b"interpreter").unwrap();
        std::fs::write(root.join("python39._pth"), b"Lib\n.\nimport site\n").unwrap();
        std::fs::write(root.join("Lib/os.py"), b"# os module").unwrap();
    }

    #[test]
    fn archive_names_are_root_relative() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let work = temp.path().join("3.9.13");
        build_tree(&work);
        let out = temp.path().join("packed.zip");

        pack_tree(&work, &out).expect("tree should pack");

        let file = std::fs::File::open(&out).expect("archive should open");
        let mut archive = zip::ZipArchive::new(file).expect("archive should parse");
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();

        assert!(names.contains(&"python.exe".to_string()));
        assert!(names.contains(&"Lib/os.py".to_string()));
        assert!(
            names.iter().all(|n| !n.contains("3.9.13")),
            "archive names must not include the tree root segment"
        );
    }

    #[test]
    fn round_trip_preserves_contents() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let work = temp.path().join("tree");
        build_tree(&work);
        let out = temp.path().join("packed.zip");

        pack_tree(&work, &out).expect("tree should pack");

        let file = std::fs::File::open(&out).expect("archive should open");
        let mut archive = zip::ZipArchive::new(file).expect("archive should parse");
        let mut entry = archive
            .by_name("Lib/os.py")
            .expect("nested file should be present");
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).expect("entry should read");
        assert_eq!(contents, b"# os module");
    }

    #[test]
    fn identical_trees_pack_identically() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let work = temp.path().join("tree");
        build_tree(&work);

        let first = temp.path().join("first.zip");
        let second = temp.path().join("second.zip");
        pack_tree(&work, &first).expect("first pack should succeed");
        pack_tree(&work, &second).expect("second pack should succeed");

        let first_names = archive_names(&first);
        let second_names = archive_names(&second);
        assert_eq!(first_names, second_names);
    }

    fn archive_names(path: &std::path::Path) -> Vec<String> {
        let file = std::fs::File::open(path).expect("archive should open");
        let mut archive = zip::ZipArchive::new(file).expect("archive should parse");
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }
}
