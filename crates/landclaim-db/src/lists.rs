//! Newline-delimited auxiliary lists: soft mutes and banned words.

use crate::error::Result;
use crate::flat_file::write_atomic;
use dashmap::DashSet;
use landclaim_core::PlayerId;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default soft mute list file name inside the data directory.
pub const SOFT_MUTE_FILE: &str = "softMute.txt";
/// Default banned word list file name inside the data directory.
pub const BANNED_WORDS_FILE: &str = "bannedWords.txt";

/// Players whose chat is only shown to themselves.
#[derive(Debug)]
pub struct SoftMutes {
    path: PathBuf,
    muted: DashSet<PlayerId>,
}

impl SoftMutes {
    /// Load the list, one UUID per line. A missing file is an empty list.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let muted = DashSet::new();
        match fs::read_to_string(&path) {
            Ok(text) => {
                for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    match PlayerId::parse(line) {
                        Ok(id) => {
                            muted.insert(id);
                        }
                        Err(e) => warn!(file = %path.display(), entry = line, error = %e, "skipping unreadable soft mute entry"),
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self { path, muted })
    }

    pub fn is_muted(&self, player: PlayerId) -> bool {
        self.muted.contains(&player)
    }

    /// Flip a player's mute and save. Returns the new state.
    pub fn toggle(&self, player: PlayerId) -> Result<bool> {
        let now_muted = if self.muted.remove(&player).is_some() {
            false
        } else {
            self.muted.insert(player);
            true
        };
        self.save()?;
        Ok(now_muted)
    }

    pub fn len(&self) -> usize {
        self.muted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.muted.is_empty()
    }

    fn save(&self) -> Result<()> {
        let mut ids: Vec<String> = self.muted.iter().map(|id| id.to_string()).collect();
        ids.sort();
        let mut text = ids.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        write_atomic(&self.path, &text)
    }
}

/// Read banned word tokens, one per line, creating an empty list if absent.
pub fn load_banned_words(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            write_atomic(path, "")?;
            String::new()
        }
        Err(e) => return Err(e.into()),
    };
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
