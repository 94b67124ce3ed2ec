use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

use crate::models::job::Job;

#[derive(Debug, Default)]
struct Entries {
    jobs: HashMap<Uuid, Job>,
    /// Batches currently running. Snapshots for any other batch are ignored.
    open: HashSet<Uuid>,
}

/// Latest snapshot of every admitted job in a batch that has not yet settled.
#[derive(Debug, Default)]
pub struct JobRegistry {
    entries: RwLock<Entries>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_batch(&self, batch_id: Uuid) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.open.insert(batch_id);
    }

    /// Record a snapshot. Returns false if the job's batch is not open, e.g.
    /// a cancelled job task writing after its batch was released.
    pub fn upsert(&self, job: &Job) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if !entries.open.contains(&job.batch_id) {
            return false;
        }
        entries.jobs.insert(job.id, job.clone());
        true
    }

    pub fn get(&self, job_id: Uuid) -> Option<Job> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.jobs.get(&job_id).cloned()
    }

    /// Close a batch and drop every snapshot it left. Returns how many were
    /// removed.
    pub fn release_batch(&self, batch_id: Uuid) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.open.remove(&batch_id);
        let before = entries.jobs.len();
        entries.jobs.retain(|_, job| job.batch_id != batch_id);
        before - entries.jobs.len()
    }

    /// Jobs that have not reached a terminal state.
    pub fn active_count(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.jobs.values().filter(|job| !job.is_terminal()).count()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
