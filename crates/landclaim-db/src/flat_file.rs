//! Flat-file backend.
//!
//! Layout under the data directory:
//! - `ClaimData/<id>.ron` - one [`ClaimRecord`] per claim
//! - `PlayerData/<uuid>` - accrued blocks, bonus blocks, blank line
//! - `PlayerData/<uuid>.ignore` - ignored players, `*` prefix = admin-enforced
//! - `PlayerData/$<group>` - group bonus total, with every byte outside
//!   `[A-Za-z0-9_-]` written as `%XX`
//! - `schema_version` - a single integer
//!
//! Every write goes to a sibling temp file first and is renamed into place, so
//! an interrupted write leaves the previous record intact.

use crate::error::{Error, Result};
use crate::record::ClaimRecord;
use crate::storage::Storage;
use indexmap::IndexMap;
use landclaim_core::{Balances, Claim, ClaimId, PlayerId};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

const CLAIM_DIR: &str = "ClaimData";
const PLAYER_DIR: &str = "PlayerData";
const SCHEMA_FILE: &str = "schema_version";
const CLAIM_EXT: &str = "ron";
const IGNORE_EXT: &str = "ignore";
const GROUP_PREFIX: char = '$';
const ADMIN_IGNORE_PREFIX: char = '*';

/// Attempts made to read a player record before giving up.
const PLAYER_READ_ATTEMPTS: usize = 5;
/// Pause between player record read attempts.
const PLAYER_READ_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Stores claims and players as individual files under a data directory.
#[derive(Debug, Clone)]
pub struct FlatFileStorage {
    root: PathBuf,
}

impl FlatFileStorage {
    /// Open a data directory, creating the folder structure if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(CLAIM_DIR))?;
        fs::create_dir_all(root.join(PLAYER_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn claim_path(&self, id: ClaimId) -> PathBuf {
        self.root
            .join(CLAIM_DIR)
            .join(format!("{}.{}", id.raw(), CLAIM_EXT))
    }

    fn player_path(&self, player: PlayerId) -> PathBuf {
        self.root.join(PLAYER_DIR).join(player.to_string())
    }

    fn ignore_path(&self, player: PlayerId) -> PathBuf {
        self.root
            .join(PLAYER_DIR)
            .join(format!("{}.{}", player, IGNORE_EXT))
    }

    fn group_path(&self, group: &str) -> PathBuf {
        self.root
            .join(PLAYER_DIR)
            .join(format!("{}{}", GROUP_PREFIX, encode_group(group)))
    }

    fn read_claim(path: &Path) -> Result<Claim> {
        let name = path.display().to_string();
        let text = fs::read_to_string(path)?;
        let record: ClaimRecord = ron::from_str(&text).map_err(|e| Error::corrupt(&name, e))?;
        let claim = record.into_claim()?;
        let expected = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if expected != claim.id.raw().to_string() {
            return Err(Error::corrupt(
                name,
                format!("file name does not match id {}", claim.id.raw()),
            ));
        }
        Ok(claim)
    }

    fn parse_balances(text: &str) -> Option<Balances> {
        let mut lines = text.lines();
        let accrued = lines.next()?.trim().parse().ok()?;
        let bonus = lines.next()?.trim().parse().ok()?;
        Some(Balances { accrued, bonus })
    }
}

/// Write `contents` next to `path` and rename it into place.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Make a group name safe to use as a file name
fn encode_group(group: &str) -> String {
    let mut encoded = String::with_capacity(group.len());
    for byte in group.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

fn decode_group(encoded: &str) -> Option<String> {
    let raw = encoded.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8(bytes).ok()
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl Storage for FlatFileStorage {
    fn load_claims(&self) -> Result<Vec<Claim>> {
        let mut claims = Vec::new();
        for entry in fs::read_dir(self.root.join(CLAIM_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CLAIM_EXT) {
                continue;
            }
            match Self::read_claim(&path) {
                Ok(claim) => claims.push(claim),
                Err(e) => error!(file = %path.display(), error = %e, "skipping unreadable claim record"),
            }
        }
        claims.sort_by_key(|c| c.id);
        debug!(count = claims.len(), "read claim records");
        Ok(claims)
    }

    fn save_claim(&self, claim: &Claim) -> Result<()> {
        let record = ClaimRecord::from_claim(claim);
        let text = ron::ser::to_string_pretty(&record, ron::ser::PrettyConfig::default())?;
        write_atomic(&self.claim_path(claim.id), &text)
    }

    fn delete_claim(&self, id: ClaimId) -> Result<()> {
        remove_if_present(&self.claim_path(id))
    }

    fn load_balances(&self, player: PlayerId) -> Result<Option<Balances>> {
        let path = self.player_path(player);
        if !path.exists() {
            return Ok(None);
        }
        let mut last_problem = String::new();
        for attempt in 1..=PLAYER_READ_ATTEMPTS {
            match fs::read_to_string(&path) {
                Ok(text) => match Self::parse_balances(&text) {
                    Some(balances) => return Ok(Some(balances)),
                    None => last_problem = "unparseable balances".to_string(),
                },
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => last_problem = e.to_string(),
            }
            if attempt < PLAYER_READ_ATTEMPTS {
                thread::sleep(PLAYER_READ_RETRY_DELAY);
            }
        }
        error!(
            player = %player,
            attempts = PLAYER_READ_ATTEMPTS,
            reason = %last_problem,
            "failed to read player record, using defaults"
        );
        Ok(Some(Balances::default()))
    }

    fn save_balances(&self, player: PlayerId, balances: &Balances) -> Result<()> {
        let text = format!("{}\n{}\n\n", balances.accrued, balances.bonus);
        write_atomic(&self.player_path(player), &text)
    }

    fn load_ignore_list(&self, player: PlayerId) -> Result<IndexMap<PlayerId, bool>> {
        let path = self.ignore_path(player);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(IndexMap::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ignored = IndexMap::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (admin, id) = match line.strip_prefix(ADMIN_IGNORE_PREFIX) {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            match PlayerId::parse(id) {
                Ok(id) => {
                    ignored.insert(id, admin);
                }
                Err(e) => warn!(player = %player, entry = line, error = %e, "skipping unreadable ignore entry"),
            }
        }
        Ok(ignored)
    }

    fn save_ignore_list(&self, player: PlayerId, ignored: &IndexMap<PlayerId, bool>) -> Result<()> {
        let path = self.ignore_path(player);
        if ignored.is_empty() {
            return remove_if_present(&path);
        }
        let mut text = String::new();
        for (id, admin) in ignored {
            if *admin {
                text.push(ADMIN_IGNORE_PREFIX);
            }
            text.push_str(&id.to_string());
            text.push('\n');
        }
        write_atomic(&path, &text)
    }

    fn load_group_bonuses(&self) -> Result<IndexMap<String, i32>> {
        let mut groups = IndexMap::new();
        for entry in fs::read_dir(self.root.join(PLAYER_DIR))? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(encoded) = name.strip_prefix(GROUP_PREFIX) else {
                continue;
            };
            if encoded.ends_with(".tmp") {
                continue;
            }
            let Some(group) = decode_group(encoded) else {
                warn!(file = name, "skipping group bonus with an undecodable name");
                continue;
            };
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(group = %group, error = %e, "skipping unreadable group bonus");
                    continue;
                }
            };
            match text.trim().parse::<i32>() {
                Ok(amount) => {
                    groups.insert(group, amount);
                }
                Err(e) => warn!(group = %group, error = %e, "skipping unreadable group bonus"),
            }
        }
        Ok(groups)
    }

    fn save_group_bonus(&self, group: &str, amount: i32) -> Result<()> {
        write_atomic(&self.group_path(group), &amount.to_string())
    }

    /// A missing or unreadable version file reads as 0, which reruns migration.
    fn schema_version(&self) -> Result<u32> {
        let text = match fs::read_to_string(self.root.join(SCHEMA_FILE)) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                warn!(error = %e, "schema version unreadable, assuming 0");
                return Ok(0);
            }
        };
        match text.trim().parse() {
            Ok(version) => Ok(version),
            Err(e) => {
                warn!(contents = text.trim(), error = %e, "schema version corrupt, assuming 0");
                Ok(0)
            }
        }
    }

    fn set_schema_version(&self, version: u32) -> Result<()> {
        write_atomic(&self.root.join(SCHEMA_FILE), &version.to_string())
    }
}
