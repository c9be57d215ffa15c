//! Public address pools backed by flat files.
//!
//! Each family has an operator-maintained candidate list and a used ledger,
//! both newline-delimited address lists:
//!
//! ```text
//! public_ips.txt   used_ips.txt     (IPv4)
//! public_ip6s.txt  used_ip6s.txt    (IPv6)
//! ```
//!
//! Allocation returns the first candidate, in file order, that the ledger
//! does not hold. Committing appends to the ledger and syncs it; rolling back
//! removes the first matching ledger line and replaces the file atomically.
//! Rolling back an address this store committed restores the ledger bytes
//! exactly, including a missing final newline or a missing file.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Family, NetworkError, Result};

/// Candidate file for IPv4 public addresses.
pub const IPV4_POOL_FILE: &str = "public_ips.txt";
/// Candidate file for IPv6 public addresses.
pub const IPV6_POOL_FILE: &str = "public_ip6s.txt";
/// Used ledger for IPv4 public addresses.
pub const IPV4_USED_FILE: &str = "used_ips.txt";
/// Used ledger for IPv6 public addresses.
pub const IPV6_USED_FILE: &str = "used_ip6s.txt";

/// A snapshot of one family's pool: ordered candidates plus the used set.
#[derive(Debug, Clone)]
pub struct AddressPool {
    family: Family,
    source: PathBuf,
    candidates: Vec<IpAddr>,
    used: HashSet<IpAddr>,
}

impl AddressPool {
    /// Builds a pool snapshot.
    #[must_use]
    pub fn new(
        family: Family,
        source: PathBuf,
        candidates: Vec<IpAddr>,
        used: impl IntoIterator<Item = IpAddr>,
    ) -> Self {
        Self {
            family,
            source,
            candidates,
            used: used.into_iter().collect(),
        }
    }

    /// First candidate not in the used set.
    #[must_use]
    pub fn first_free(&self) -> Option<IpAddr> {
        self.candidates
            .iter()
            .copied()
            .find(|ip| !self.used.contains(ip))
    }

    /// Returns the first free candidate.
    ///
    /// # Errors
    ///
    /// `PoolExhausted` if every candidate is used.
    pub fn allocate(&self) -> Result<IpAddr> {
        self.first_free().ok_or_else(|| NetworkError::PoolExhausted {
            family: self.family,
            pool: self.source.clone(),
        })
    }

    /// Returns true if the address is a candidate.
    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.candidates.contains(ip)
    }

    /// Returns true if the address is in the used set.
    #[must_use]
    pub fn is_used(&self, ip: &IpAddr) -> bool {
        self.used.contains(ip)
    }

    /// Counts for reporting.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let used = self
            .candidates
            .iter()
            .filter(|ip| self.used.contains(ip))
            .count();
        PoolStatus {
            family: self.family,
            total: self.candidates.len(),
            used,
            available: self.candidates.len() - used,
        }
    }
}

/// Pool occupancy for one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Family of the pool.
    pub family: Family,
    /// Number of candidates.
    pub total: usize,
    /// Candidates recorded as used.
    pub used: usize,
    /// Candidates still free.
    pub available: usize,
}

/// Durable storage for public address pools.
pub trait PoolStore {
    /// Loads the current pool snapshot for a family.
    ///
    /// # Errors
    ///
    /// Fails if the pool cannot be read or holds malformed entries.
    fn load(&self, family: Family) -> Result<AddressPool>;

    /// Returns the first free address without recording it.
    ///
    /// # Errors
    ///
    /// `PoolExhausted` when every candidate is used.
    fn allocate(&self, family: Family) -> Result<IpAddr> {
        self.load(family)?.allocate()
    }

    /// Durably records an address as used.
    ///
    /// # Errors
    ///
    /// Fails if the address is not a candidate, is already used, or the
    /// ledger cannot be written.
    fn commit(&self, ip: IpAddr) -> Result<()>;

    /// Removes an address from the used ledger. Returns false if it was absent.
    ///
    /// # Errors
    ///
    /// Fails if the ledger cannot be rewritten.
    fn rollback(&self, ip: IpAddr) -> Result<bool>;

    /// Allocates and commits in one step.
    ///
    /// # Errors
    ///
    /// Any error from [`PoolStore::allocate`] or [`PoolStore::commit`].
    fn claim(&self, family: Family) -> Result<IpAddr> {
        let ip = self.allocate(family)?;
        self.commit(ip)?;
        Ok(ip)
    }
}

/// Locations of the four pool files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPaths {
    /// IPv4 candidates.
    pub ipv4_pool: PathBuf,
    /// IPv4 used ledger.
    pub ipv4_used: PathBuf,
    /// IPv6 candidates.
    pub ipv6_pool: PathBuf,
    /// IPv6 used ledger.
    pub ipv6_used: PathBuf,
}

impl PoolPaths {
    /// Standard file names under one directory.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            ipv4_pool: dir.join(IPV4_POOL_FILE),
            ipv4_used: dir.join(IPV4_USED_FILE),
            ipv6_pool: dir.join(IPV6_POOL_FILE),
            ipv6_used: dir.join(IPV6_USED_FILE),
        }
    }

    fn pool(&self, family: Family) -> &Path {
        match family {
            Family::V4 => &self.ipv4_pool,
            Family::V6 => &self.ipv6_pool,
        }
    }

    fn used(&self, family: Family) -> &Path {
        match family {
            Family::V4 => &self.ipv4_used,
            Family::V6 => &self.ipv6_used,
        }
    }
}

/// Ledger state observed by a commit, used to undo it byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LedgerOrigin {
    /// The ledger file did not exist before the commit.
    created: bool,
    /// The commit added a newline after an unterminated last line.
    separator_added: bool,
}

/// Flat-file [`PoolStore`]. All ledger writes are serialised by one lock,
/// which also guards the origins of the commits made through this store.
#[derive(Debug)]
pub struct FilePoolStore {
    paths: PoolPaths,
    commits: Mutex<HashMap<IpAddr, LedgerOrigin>>,
}

impl FilePoolStore {
    /// Creates a store over the given files.
    #[must_use]
    pub fn new(paths: PoolPaths) -> Self {
        Self {
            paths,
            commits: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the file locations.
    #[must_use]
    pub fn paths(&self) -> &PoolPaths {
        &self.paths
    }

    fn load_unlocked(&self, family: Family) -> Result<AddressPool> {
        let pool_path = self.paths.pool(family);
        let candidates = read_address_list(pool_path, family, false)?;
        let used = read_address_list(self.paths.used(family), family, true)?;
        debug!(
            %family,
            candidates = candidates.len(),
            used = used.len(),
            "loaded address pool"
        );
        Ok(AddressPool::new(family, pool_path.to_path_buf(), candidates, used))
    }

    fn commit_unlocked(&self, ip: IpAddr, commits: &mut HashMap<IpAddr, LedgerOrigin>) -> Result<()> {
        let family = Family::of(&ip);
        let pool = self.load_unlocked(family)?;
        let ledger = self.paths.used(family);
        if !pool.contains(&ip) {
            return Err(NetworkError::NotInPool {
                ip,
                pool: self.paths.pool(family).to_path_buf(),
            });
        }
        if pool.is_used(&ip) {
            return Err(NetworkError::AlreadyCommitted {
                ip,
                ledger: ledger.to_path_buf(),
            });
        }

        let origin = match fs::read_to_string(ledger) {
            Ok(content) => LedgerOrigin {
                created: false,
                separator_added: !content.is_empty() && !content.ends_with('\n'),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => LedgerOrigin {
                created: true,
                separator_added: false,
            },
            Err(e) => return Err(NetworkError::io(ledger, e)),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(ledger)
            .map_err(|e| NetworkError::io(ledger, e))?;
        let entry = if origin.separator_added {
            format!("\n{ip}\n")
        } else {
            format!("{ip}\n")
        };
        file.write_all(entry.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| NetworkError::io(ledger, e))?;
        commits.insert(ip, origin);

        info!(%ip, ledger = %ledger.display(), "committed public address");
        Ok(())
    }
}

impl PoolStore for FilePoolStore {
    fn load(&self, family: Family) -> Result<AddressPool> {
        let _guard = self.commits.lock();
        self.load_unlocked(family)
    }

    fn commit(&self, ip: IpAddr) -> Result<()> {
        let mut commits = self.commits.lock();
        self.commit_unlocked(ip, &mut commits)
    }

    fn rollback(&self, ip: IpAddr) -> Result<bool> {
        let mut commits = self.commits.lock();
        let origin = commits.remove(&ip);
        let ledger = self.paths.used(Family::of(&ip));
        let content = match fs::read_to_string(ledger) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(NetworkError::io(ledger, e)),
        };

        let Some(rewritten) = remove_entry(&content, &ip.to_string(), origin) else {
            warn!(%ip, ledger = %ledger.display(), "rollback found no ledger entry");
            return Ok(false);
        };

        if rewritten.is_empty() && origin.is_some_and(|o| o.created) {
            fs::remove_file(ledger).map_err(|e| NetworkError::io(ledger, e))?;
        } else {
            replace_file(ledger, rewritten.as_bytes()).map_err(|e| NetworkError::io(ledger, e))?;
        }

        info!(%ip, ledger = %ledger.display(), "rolled back public address");
        Ok(true)
    }

    fn claim(&self, family: Family) -> Result<IpAddr> {
        let mut commits = self.commits.lock();
        let ip = self.load_unlocked(family)?.allocate()?;
        self.commit_unlocked(ip, &mut commits)?;
        Ok(ip)
    }
}

/// Drops the first line equal to `target`, keeping every other byte.
///
/// When the dropped line was last and its commit had terminated a previous
/// unterminated line, that newline is dropped too. Returns `None` if no line
/// matches.
fn remove_entry(content: &str, target: &str, origin: Option<LedgerOrigin>) -> Option<String> {
    let segments: Vec<&str> = content.split_inclusive('\n').collect();
    let index = segments
        .iter()
        .position(|segment| segment.trim() == target)?;

    let mut rewritten: String = segments
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, segment)| *segment)
        .collect();
    let was_last = index + 1 == segments.len();
    if was_last && origin.is_some_and(|o| o.separator_added) && rewritten.ends_with('\n') {
        rewritten.pop();
    }
    Some(rewritten)
}

/// Reads an address list, skipping blank lines and `#` comments.
///
/// A missing file is an empty list only when `missing_ok` is set.
fn read_address_list(path: &Path, family: Family, missing_ok: bool) -> Result<Vec<IpAddr>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if missing_ok && e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(NetworkError::io(path, e)),
    };

    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_number, line)| {
            line.parse::<IpAddr>()
                .ok()
                .filter(|ip| Family::of(ip) == family)
                .ok_or_else(|| NetworkError::InvalidPoolEntry {
                    path: path.to_path_buf(),
                    line: line_number,
                    family,
                    value: line.to_string(),
                })
        })
        .collect()
}

/// Replaces a file's content through a synced sibling temp file and a rename.
fn replace_file(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp)?;
    file.write_all(content)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}
