//! Artifact storage.
//!
//! Layout under the tunnel directory:
//!
//! ```text
//! <dir>/<interface>.conf            interface artifact
//! <dir>/<interface>/<client>.conf   client artifacts
//! ```
//!
//! Every file is written owner-only since it carries private keys.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};
use wgpool_wireguard::{parse_interface, InterfaceRecord, WireGuardError};

use crate::error::{ProvisionError, Result};

const ARTIFACT_EXTENSION: &str = "conf";

#[cfg(unix)]
const PRIVATE_FILE_MODE: u32 = 0o600;
#[cfg(unix)]
const PRIVATE_DIR_MODE: u32 = 0o700;

fn open_private(path: &Path, create_new: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if create_new {
        options.create_new(true);
    } else {
        options.create(true).truncate(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PRIVATE_FILE_MODE);
    }
    options.open(path)
}

fn create_private_dir(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(PRIVATE_DIR_MODE);
    }
    builder.create(path)
}

/// Stems of `*.conf` files directly inside `dir`, sorted. A missing
/// directory yields an empty list.
fn artifact_stems(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ProvisionError::io(dir, e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ProvisionError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != ARTIFACT_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Durable storage for interface and client artifacts.
pub trait ArtifactStore {
    /// Location of an interface artifact.
    fn interface_path(&self, interface: &str) -> PathBuf;

    /// Location of a client artifact.
    fn client_path(&self, interface: &str, client: &str) -> PathBuf;

    /// Whether an interface artifact exists.
    fn interface_exists(&self, interface: &str) -> bool;

    /// Names of all interfaces with an artifact, sorted.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be listed.
    fn interface_names(&self) -> Result<Vec<String>>;

    /// Raw text of an interface artifact.
    ///
    /// # Errors
    ///
    /// `InterfaceNotFound` if there is no artifact, `Io` if it is unreadable.
    fn read_interface(&self, interface: &str) -> Result<String>;

    /// Writes a new interface artifact and returns its location.
    ///
    /// # Errors
    ///
    /// `InterfaceExists` if one is already present, `Io` otherwise.
    fn create_interface(&self, interface: &str, content: &str) -> Result<PathBuf>;

    /// Appends a block to an existing interface artifact.
    ///
    /// # Errors
    ///
    /// `InterfaceNotFound` if there is no artifact, `Io` otherwise.
    fn append_interface(&self, interface: &str, block: &str) -> Result<()>;

    /// Atomically replaces the content of an interface artifact.
    ///
    /// # Errors
    ///
    /// Fails if the new content cannot be written.
    fn replace_interface(&self, interface: &str, content: &str) -> Result<()>;

    /// Deletes an interface artifact. A missing artifact is not an error.
    ///
    /// # Errors
    ///
    /// Fails if the artifact exists but cannot be removed.
    fn remove_interface(&self, interface: &str) -> Result<()>;

    /// Names of the client artifacts of an interface, sorted.
    ///
    /// # Errors
    ///
    /// Fails if the client artifacts cannot be listed.
    fn client_names(&self, interface: &str) -> Result<Vec<String>>;

    /// Writes a new client artifact and returns its location.
    ///
    /// # Errors
    ///
    /// `ClientExists` if the artifact is already present, `Io` otherwise.
    fn create_client(&self, interface: &str, client: &str, content: &str) -> Result<PathBuf>;

    /// Deletes a client artifact. A missing artifact is not an error.
    ///
    /// # Errors
    ///
    /// Fails if the artifact exists but cannot be removed.
    fn remove_client(&self, interface: &str, client: &str) -> Result<()>;

    /// Reads and parses an interface artifact.
    ///
    /// # Errors
    ///
    /// As [`ArtifactStore::read_interface`], plus `InvalidPublicAddress` for a
    /// malformed IPv4 SNAT address and `Artifact` for any other parse error.
    fn load_interface(&self, interface: &str) -> Result<InterfaceRecord> {
        let text = self.read_interface(interface)?;
        let path = self.interface_path(interface);
        parse_interface(&text).map_err(|e| match e {
            WireGuardError::InvalidPublicAddress(value) => ProvisionError::InvalidPublicAddress {
                artifact: path,
                value,
            },
            source => ProvisionError::Artifact { path, source },
        })
    }
}

/// Artifact store over a tunnel configuration directory.
#[derive(Debug)]
pub struct FileArtifactStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileArtifactStore {
    /// Creates a store rooted at `dir`. Nothing is touched until first use.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding the client artifacts of an interface.
    #[must_use]
    pub fn client_dir(&self, interface: &str) -> PathBuf {
        self.dir.join(interface)
    }
}

impl ArtifactStore for FileArtifactStore {
    fn interface_path(&self, interface: &str) -> PathBuf {
        self.dir.join(format!("{interface}.{ARTIFACT_EXTENSION}"))
    }

    fn client_path(&self, interface: &str, client: &str) -> PathBuf {
        self.client_dir(interface)
            .join(format!("{client}.{ARTIFACT_EXTENSION}"))
    }

    fn interface_exists(&self, interface: &str) -> bool {
        self.interface_path(interface).is_file()
    }

    fn interface_names(&self) -> Result<Vec<String>> {
        artifact_stems(&self.dir)
    }

    fn read_interface(&self, interface: &str) -> Result<String> {
        let path = self.interface_path(interface);
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ProvisionError::InterfaceNotFound(interface.to_string()),
            _ => ProvisionError::io(path, e),
        })
    }

    fn create_interface(&self, interface: &str, content: &str) -> Result<PathBuf> {
        let _guard = self.lock.lock();
        create_private_dir(&self.dir).map_err(|e| ProvisionError::io(&self.dir, e))?;

        let path = self.interface_path(interface);
        let mut file = open_private(&path, true).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => ProvisionError::InterfaceExists(interface.to_string()),
            _ => ProvisionError::io(&path, e),
        })?;
        file.write_all(content.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| ProvisionError::io(&path, e))?;

        debug!(interface, artifact = %path.display(), "wrote interface artifact");
        Ok(path)
    }

    fn append_interface(&self, interface: &str, block: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let path = self.interface_path(interface);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ProvisionError::InterfaceNotFound(interface.to_string()),
                _ => ProvisionError::io(&path, e),
            })?;
        file.write_all(block.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| ProvisionError::io(&path, e))
    }

    fn replace_interface(&self, interface: &str, content: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let path = self.interface_path(interface);
        let tmp = path.with_extension("conf.tmp");
        let write = || -> io::Result<()> {
            let mut file = open_private(&tmp, false)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };
        write().map_err(|e| ProvisionError::io(&path, e))
    }

    fn remove_interface(&self, interface: &str) -> Result<()> {
        let _guard = self.lock.lock();
        remove_if_present(&self.interface_path(interface))
    }

    fn client_names(&self, interface: &str) -> Result<Vec<String>> {
        artifact_stems(&self.client_dir(interface))
    }

    fn create_client(&self, interface: &str, client: &str, content: &str) -> Result<PathBuf> {
        let _guard = self.lock.lock();
        let dir = self.client_dir(interface);
        create_private_dir(&dir).map_err(|e| ProvisionError::io(&dir, e))?;

        let path = self.client_path(interface, client);
        let mut file = open_private(&path, true).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => ProvisionError::ClientExists {
                interface: interface.to_string(),
                client: client.to_string(),
            },
            _ => ProvisionError::io(&path, e),
        })?;
        file.write_all(content.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| ProvisionError::io(&path, e))?;

        debug!(interface, client, artifact = %path.display(), "wrote client artifact");
        Ok(path)
    }

    fn remove_client(&self, interface: &str, client: &str) -> Result<()> {
        let _guard = self.lock.lock();
        remove_if_present(&self.client_path(interface, client))
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(artifact = %path.display(), "removed artifact");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(artifact = %path.display(), "artifact already absent");
            Ok(())
        }
        Err(e) => Err(ProvisionError::io(path, e)),
    }
}
