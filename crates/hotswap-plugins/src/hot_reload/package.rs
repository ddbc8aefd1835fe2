//! Plugin packages on disk
//!
//! A package is a zip archive carrying a `plugin.toml` manifest:
//!
//! ```toml
//! id = "reporting"
//! name = "Reporting"
//! version = "1.4.0"
//! requires = ["core", "scheduler"]
//! ```

use std::io::{Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use hotswap_kernel::{
    HostError, HostResult, PackageError, PackageParser, PackageStore, PluginDescriptor,
    PluginVersion, StoredPackage,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use zip::ZipArchive;

/// Manifest entry name inside a package archive
pub const MANIFEST_FILE: &str = "plugin.toml";

#[derive(Debug, Deserialize)]
struct PackageManifest {
    id: String,
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    requires: Vec<String>,
}

/// Reads plugin identity from zip packages.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchivePackageParser;

impl ArchivePackageParser {
    pub fn new() -> Self {
        Self
    }

    fn read_manifest(package: &[u8]) -> Result<PackageManifest, PackageError> {
        let mut archive = ZipArchive::new(Cursor::new(package))
            .map_err(|e| PackageError::InvalidArchive(e.to_string()))?;
        let mut entry = archive
            .by_name(MANIFEST_FILE)
            .map_err(|_| PackageError::MissingManifest(MANIFEST_FILE.to_string()))?;

        let mut content = String::new();
        entry.read_to_string(&mut content)?;

        toml::from_str(&content).map_err(|e| PackageError::InvalidManifest(e.to_string()))
    }
}

impl PackageParser for ArchivePackageParser {
    fn parse(&self, package: &[u8]) -> Result<PluginDescriptor, PackageError> {
        let manifest = Self::read_manifest(package)?;

        let id = manifest.id.trim();
        if id.is_empty() {
            return Err(PackageError::InvalidManifest("empty plugin id".to_string()));
        }

        let version = match manifest.version.as_deref() {
            Some(v) => PluginVersion::parse(v).map_err(PackageError::InvalidManifest)?,
            None => PluginVersion::default(),
        };

        let descriptor = manifest.requires.iter().fold(
            PluginDescriptor::new(id, version).with_name(manifest.name.as_deref().unwrap_or(id)),
            |d, dep| d.with_dependency(dep),
        );

        debug!(
            "Parsed package manifest for {} v{} (requires: {:?})",
            descriptor.id, descriptor.version, descriptor.required_plugins
        );
        Ok(descriptor)
    }
}

/// Writes packages into a plugin directory.
///
/// The bytes go to a temporary file in the same directory which then replaces
/// the target, so readers never observe a half-written package.
#[derive(Debug, Clone)]
pub struct DirectoryPackageStore {
    dir: PathBuf,
}

impl DirectoryPackageStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target_path(&self, filename: &str) -> HostResult<PathBuf> {
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Ok(self.dir.join(name)),
            _ => Err(HostError::StorageFailed(format!(
                "Refusing to store package under {:?}",
                filename
            ))),
        }
    }
}

/// Hex-encoded SHA-256 of `bytes`
pub fn package_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[async_trait::async_trait]
impl PackageStore for DirectoryPackageStore {
    async fn insert(&self, package: &[u8], filename: &str) -> HostResult<StoredPackage> {
        let target = self.target_path(filename)?;
        let dir = self.dir.clone();
        let bytes = package.to_vec();

        // Filesystem work runs on the blocking pool.
        let stored = tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &bytes))
            .await
            .map_err(|e| HostError::StorageFailed(format!("package write task failed: {e}")))??;

        info!(
            "Stored package {:?} ({} bytes, sha256 {})",
            stored.path,
            package.len(),
            stored.digest
        );
        Ok(stored)
    }
}

/// Stage `bytes` next to `target`, flush, then rename over it.
fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> HostResult<StoredPackage> {
    std::fs::create_dir_all(dir)?;

    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged
        .persist(target)
        .map_err(|e| HostError::StorageFailed(e.to_string()))?;

    Ok(StoredPackage {
        path: target.to_path_buf(),
        digest: package_digest(bytes),
    })
}
