//! Archive member extraction
//!
//! Reads a single named member out of a zip container (ePub). The archive
//! handle lives only for the duration of each call, so it is released on
//! every exit path.

use crate::error::ArchiveError;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

/// Extractor for members of zip-based containers
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    /// Read the full contents of `member` from the archive at `archive_path`
    ///
    /// # Errors
    /// - `MemberNotFound` when the manifest has no such entry
    /// - `Io` / `Zip` when the archive cannot be opened or read
    pub fn extract_member(
        &self,
        archive_path: impl AsRef<Path>,
        member: &str,
    ) -> Result<Vec<u8>, ArchiveError> {
        let archive_path = archive_path.as_ref();
        let mut archive = open(archive_path)?;

        let mut entry = archive.by_name(member).map_err(|e| match e {
            ZipError::FileNotFound => ArchiveError::MemberNotFound {
                archive: archive_path.to_path_buf(),
                member: member.to_string(),
            },
            other => ArchiveError::Zip {
                path: archive_path.to_path_buf(),
                source: other,
            },
        })?;

        let mut content = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry
            .read_to_end(&mut content)
            .map_err(|e| ArchiveError::io_error(archive_path, e))?;

        tracing::debug!(
            archive = %archive_path.display(),
            member,
            bytes = content.len(),
            "extracted archive member"
        );
        Ok(content)
    }

    /// List every member name in the archive manifest
    ///
    /// # Errors
    /// The archive cannot be opened or is not a valid zip
    pub fn member_names(
        &self,
        archive_path: impl AsRef<Path>,
    ) -> Result<Vec<String>, ArchiveError> {
        let archive = open(archive_path.as_ref())?;
        Ok(archive.file_names().map(str::to_string).collect())
    }
}

fn open(path: &Path) -> Result<ZipArchive<BufReader<File>>, ArchiveError> {
    let file = File::open(path).map_err(|e| ArchiveError::io_error(path, e))?;
    ZipArchive::new(BufReader::new(file)).map_err(|source| ArchiveError::Zip {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsat_test_utils::build_zip;

    fn sample_epub(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("sample.epub");
        let bytes = build_zip(&[
            ("mimetype", b"application/epub+zip".as_slice()),
            ("OEBPS/content.opf", b"<package/>".as_slice()),
            ("OEBPS/images/cover.png", b"\x89PNG fake".as_slice()),
        ]);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn extracts_named_member() {
        let dir = tempfile::tempdir().unwrap();
        let epub = sample_epub(dir.path());

        let data = ArchiveExtractor.extract_member(&epub, "OEBPS/content.opf").unwrap();
        assert_eq!(data, b"<package/>");
    }

    #[test]
    fn missing_member_is_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let epub = sample_epub(dir.path());

        let err = ArchiveExtractor
            .extract_member(&epub, "OEBPS/definitely_missing.xhtml")
            .unwrap_err();
        match err {
            ArchiveError::MemberNotFound { archive, member } => {
                assert_eq!(archive, epub);
                assert_eq!(member, "OEBPS/definitely_missing.xhtml");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lists_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let epub = sample_epub(dir.path());

        let mut names = ArchiveExtractor.member_names(&epub).unwrap();
        names.sort();
        assert_eq!(names, ["OEBPS/content.opf", "OEBPS/images/cover.png", "mimetype"]);
    }

    #[test]
    fn non_archive_is_zip_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.epub");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        assert!(matches!(
            ArchiveExtractor.extract_member(&path, "mimetype"),
            Err(ArchiveError::Zip { .. })
        ));
    }

    #[test]
    fn missing_archive_is_io_error() {
        assert!(matches!(
            ArchiveExtractor.extract_member("/nonexistent/book.epub", "mimetype"),
            Err(ArchiveError::Io { .. })
        ));
    }
}
