use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io;
use std::path::Path;

/// Pack `entries` (files or directories relative to `root`) into a gzipped tarball at `output`.
///
/// Returns the archive size in bytes. A missing entry is an error.
pub fn create_tar_gz(root: &Path, entries: &[String], output: &Path) -> io::Result<u64> {
    let file = File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut archive = tar::Builder::new(encoder);
    archive.follow_symlinks(false);

    for entry in entries {
        let source = root.join(entry);
        if source.is_dir() {
            archive.append_dir_all(entry, &source)?;
        } else if source.is_file() {
            archive.append_path_with_name(&source, entry)?;
        } else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("package entry {} does not exist", source.display()),
            ));
        }
    }

    archive.into_inner()?.finish()?;
    Ok(std::fs::metadata(output)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;

    #[test]
    fn packs_directories_and_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dist/public")).unwrap();
        fs::write(dir.path().join("dist/index.js"), "console.log('up')").unwrap();
        fs::write(dir.path().join("dist/public/app.css"), "body{}").unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();

        let output = dir.path().join("out.tar.gz");
        let size = create_tar_gz(
            dir.path(),
            &["dist".to_string(), "package.json".to_string()],
            &output,
        )
        .unwrap();
        assert!(size > 0);

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&output).unwrap()));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();

        assert!(names.iter().any(|n| n == "dist/index.js"));
        assert!(names.iter().any(|n| n == "dist/public/app.css"));
        assert!(names.iter().any(|n| n == "package.json"));
    }

    #[test]
    fn missing_entry_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_tar_gz(
            dir.path(),
            &["package-lock.json".to_string()],
            &dir.path().join("out.tar.gz"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
