//! Placing fixtures on the resource server's ingest mount
//!
//! Every run gets its own folder `rs-test-<8 uppercase letters>` under the
//! mount. An asset for ISBN `9780000000001` stored at `images/a.png` lands at
//! `<mount>/<folder>/9780/000/000/001/images/a.png` and is then served at
//! `/<folder>/9780/000/000/001/images/a.png`.

use crate::error::{FixtureError, FixtureResult};
use crate::store::{FixtureEntry, FixtureStore, Which};
use rand::Rng;
use rsat_core::AssetRecord;
use std::path::{Path, PathBuf};

/// Prefix of every per-run folder
pub const FOLDER_PREFIX: &str = "rs-test-";

/// A run's upload folder on the mount
///
/// The folder is removed by [`UploadSession::teardown`], or best-effort on drop.
#[derive(Debug)]
pub struct UploadSession {
    mount_dir: PathBuf,
    folder: String,
    active: bool,
}

impl UploadSession {
    /// Session on an existing mount directory
    ///
    /// # Errors
    /// `MountNotADirectory` when `mount_dir` does not exist or is a file
    pub fn open(mount_dir: impl Into<PathBuf>) -> FixtureResult<Self> {
        let mount_dir = mount_dir.into();
        if !mount_dir.is_dir() {
            return Err(FixtureError::MountNotADirectory(mount_dir));
        }
        Ok(Self::new(mount_dir))
    }

    /// Session with a fresh random folder name
    #[must_use]
    pub fn new(mount_dir: impl Into<PathBuf>) -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..8)
            .map(|_| char::from(rng.random_range(b'A'..=b'Z')))
            .collect();
        Self::with_folder(mount_dir, format!("{FOLDER_PREFIX}{suffix}"))
    }

    /// Session using a given folder name
    #[must_use]
    pub fn with_folder(mount_dir: impl Into<PathBuf>, folder: impl Into<String>) -> Self {
        Self {
            mount_dir: mount_dir.into(),
            folder: folder.into(),
            active: true,
        }
    }

    /// Folder name under the mount
    #[inline]
    #[must_use]
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Absolute path of the run folder
    #[must_use]
    pub fn folder_path(&self) -> PathBuf {
        self.mount_dir.join(&self.folder)
    }

    /// Mount-relative path an asset is uploaded to
    ///
    /// # Errors
    /// `InvalidIsbn` when the ISBN is shorter than four characters or not ASCII
    pub fn relative_path(&self, isbn: &str, local_path: &Path) -> FixtureResult<String> {
        if !isbn.is_ascii() || isbn.len() < 4 {
            return Err(FixtureError::InvalidIsbn(isbn.to_string()));
        }
        let (prefix, rest) = isbn.split_at(4);
        let mut parts = vec![self.folder.clone(), prefix.to_string()];
        // Only complete three-character groups form directories
        parts.extend(
            rest.as_bytes()
                .chunks_exact(3)
                .map(|chunk| String::from_utf8_lossy(chunk).into_owned()),
        );
        parts.push(
            local_path
                .to_string_lossy()
                .trim_start_matches('/')
                .to_string(),
        );
        Ok(parts.join("/"))
    }

    /// Copy `entry` onto the mount and return its record with `uploaded_path` set
    ///
    /// # Errors
    /// Invalid ISBN, or the copy fails
    pub fn upload(&self, store: &FixtureStore, entry: &FixtureEntry) -> FixtureResult<AssetRecord> {
        let relative = self.relative_path(&entry.isbn, &entry.local_path)?;
        let source = store.local_path(entry);
        let target = self.mount_dir.join(&relative);

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FixtureError::io_error(parent, e))?;
        }
        std::fs::copy(&source, &target).map_err(|e| FixtureError::io_error(&source, e))?;
        tracing::info!(
            source = %source.display(),
            uploaded = %relative,
            "uploaded fixture"
        );

        Ok(entry
            .to_record(store.data_dir())
            .uploaded_at(format!("/{relative}")))
    }

    /// Look up and upload in one step
    ///
    /// # Errors
    /// Fixture not found, invalid ISBN, or the copy fails
    pub fn upload_fixture(
        &self,
        store: &FixtureStore,
        object_type: &str,
        which: &Which,
    ) -> FixtureResult<AssetRecord> {
        let entry = store.lookup(object_type, which)?;
        self.upload(store, entry)
    }

    /// Remove the run folder and everything uploaded into it
    ///
    /// # Errors
    /// The folder exists but cannot be removed
    pub fn teardown(&mut self) -> FixtureResult<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        let path = self.folder_path();
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::debug!(folder = %path.display(), "removed upload folder");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FixtureError::io_error(path, e)),
        }
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::warn!(error = %e, "failed to remove upload folder");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn entry(local_path: &str, isbn: &str) -> FixtureEntry {
        FixtureEntry {
            which: "is standard".into(),
            local_path: local_path.into(),
            isbn: isbn.into(),
            kind: None,
            internal_paths: BTreeMap::new(),
        }
    }

    #[test]
    fn folder_name_shape() {
        let session = UploadSession::new("/mnt/resource-server");
        let suffix = session.folder().strip_prefix(FOLDER_PREFIX).unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn open_requires_existing_mount() {
        let dir = tempfile::tempdir().unwrap();
        let session = UploadSession::open(dir.path()).unwrap();
        assert!(session.folder_path().starts_with(dir.path()));

        let missing = dir.path().join("not-mounted");
        let err = UploadSession::open(&missing).unwrap_err();
        assert!(matches!(&err, FixtureError::MountNotADirectory(path) if path == &missing));
        assert!(!missing.exists());

        let file = dir.path().join("plain-file");
        std::fs::write(&file, b"").unwrap();
        assert!(matches!(
            UploadSession::open(&file),
            Err(FixtureError::MountNotADirectory(_))
        ));
    }

    #[test]
    fn isbn_layout() {
        let session = UploadSession::with_folder("/mnt", "rs-test-ABCDEFGH");
        assert_eq!(
            session
                .relative_path("9780000000001", Path::new("images/a.png"))
                .unwrap(),
            "rs-test-ABCDEFGH/9780/000/000/001/images/a.png"
        );
        // Trailing partial group is dropped
        assert_eq!(
            session.relative_path("97812", Path::new("a.png")).unwrap(),
            "rs-test-ABCDEFGH/9781/a.png"
        );
        assert!(session.relative_path("978", Path::new("a.png")).is_err());
    }

    #[test]
    fn upload_and_teardown() {
        let data = tempfile::tempdir().unwrap();
        let mount = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(data.path().join("images")).unwrap();
        std::fs::write(data.path().join("images/a.png"), b"png bytes").unwrap();

        let store = FixtureStore::from_entries(
            data.path(),
            [("image".to_string(), vec![entry("images/a.png", "9780000000001")])]
                .into_iter()
                .collect(),
        );
        let mut session = UploadSession::with_folder(mount.path(), "rs-test-TESTTEST");
        let record = session
            .upload_fixture(&store, "image", &Which::Standard)
            .unwrap();

        let uploaded = record.uploaded_path.clone().unwrap();
        assert_eq!(uploaded, "/rs-test-TESTTEST/9780/000/000/001/images/a.png");
        let on_mount = mount.path().join(uploaded.trim_start_matches('/'));
        assert_eq!(std::fs::read(&on_mount).unwrap(), b"png bytes");

        session.teardown().unwrap();
        assert!(!session.folder_path().exists());
        // Second teardown is a no-op
        session.teardown().unwrap();
    }

    #[test]
    fn drop_removes_folder() {
        let mount = tempfile::tempdir().unwrap();
        let folder = {
            let session = UploadSession::with_folder(mount.path(), "rs-test-DROPDROP");
            std::fs::create_dir_all(session.folder_path().join("x")).unwrap();
            session.folder_path()
        };
        assert!(!folder.exists());
    }

    proptest! {
        #[test]
        fn layout_uses_complete_groups(isbn in "[0-9]{4,17}") {
            let session = UploadSession::with_folder("/mnt", "rs-test-PROPTEST");
            let path = session.relative_path(&isbn, Path::new("f.bin")).unwrap();
            let parts: Vec<&str> = path.split('/').collect();
            prop_assert_eq!(parts[1], &isbn[..4]);
            prop_assert_eq!(parts.len(), 3 + (isbn.len() - 4) / 3);
            prop_assert!(parts[2..parts.len() - 1].iter().all(|p| p.len() == 3));
        }
    }
}
