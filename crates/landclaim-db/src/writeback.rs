//! Background write-back.
//!
//! Mutations are queued on an unbounded channel and applied by one worker
//! thread in submission order, so the last write for a record always wins.
//! Callers never wait on disk; failures are logged by the worker and dropped.

use crate::storage::Storage;
use crossbeam_channel::{bounded, unbounded, Sender};
use indexmap::IndexMap;
use landclaim_core::{Balances, Claim, ClaimId, PlayerId};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// One queued write.
#[derive(Debug)]
enum Job {
    SaveClaim(Box<Claim>),
    DeleteClaim(ClaimId),
    SaveBalances(PlayerId, Balances),
    SaveIgnoreList(PlayerId, IndexMap<PlayerId, bool>),
    SaveGroupBonus(String, i32),
    Flush(Sender<()>),
}

/// Handle to the writer thread plus direct read access to the backend.
pub struct WriteBack {
    storage: Arc<dyn Storage>,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl WriteBack {
    /// Spawn the writer thread for `storage`.
    pub fn start(storage: Arc<dyn Storage>) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let backend = Arc::clone(&storage);
        let worker = thread::Builder::new()
            .name("landclaim-writer".to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    apply(backend.as_ref(), job);
                }
                debug!("writer thread exiting");
            });
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = %e, "could not start writer thread, writes will be synchronous");
                None
            }
        };
        let sender = worker.as_ref().map(|_| sender);
        Self {
            storage,
            sender,
            worker,
        }
    }

    /// The backend, for reads.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn submit(&self, job: Job) {
        match &self.sender {
            Some(sender) => {
                if let Err(e) = sender.send(job) {
                    // Worker is gone; keep the write rather than lose it
                    warn!("writer thread unavailable, writing inline");
                    apply(self.storage.as_ref(), e.into_inner());
                }
            }
            None => apply(self.storage.as_ref(), job),
        }
    }

    pub fn save_claim(&self, claim: &Claim) {
        self.submit(Job::SaveClaim(Box::new(claim.clone())));
    }

    pub fn delete_claim(&self, id: ClaimId) {
        self.submit(Job::DeleteClaim(id));
    }

    pub fn save_balances(&self, player: PlayerId, balances: Balances) {
        self.submit(Job::SaveBalances(player, balances));
    }

    pub fn save_ignore_list(&self, player: PlayerId, ignored: IndexMap<PlayerId, bool>) {
        self.submit(Job::SaveIgnoreList(player, ignored));
    }

    pub fn save_group_bonus(&self, group: impl Into<String>, amount: i32) {
        self.submit(Job::SaveGroupBonus(group.into(), amount));
    }

    /// Block until every write submitted before this call has been applied.
    pub fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (done_tx, done_rx) = bounded(1);
        if sender.send(Job::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }
}

impl Drop for WriteBack {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("writer thread panicked");
            }
        }
    }
}

fn apply(storage: &dyn Storage, job: Job) {
    let (what, result) = match job {
        Job::SaveClaim(claim) => ("save claim", storage.save_claim(&claim)),
        Job::DeleteClaim(id) => ("delete claim", storage.delete_claim(id)),
        Job::SaveBalances(player, balances) => ("save player", storage.save_balances(player, &balances)),
        Job::SaveIgnoreList(player, ignored) => ("save ignore list", storage.save_ignore_list(player, &ignored)),
        Job::SaveGroupBonus(group, amount) => ("save group bonus", storage.save_group_bonus(&group, amount)),
        Job::Flush(done) => {
            let _ = done.send(());
            return;
        }
    };
    if let Err(e) = result {
        error!(operation = what, error = %e, "background write failed");
    }
}
