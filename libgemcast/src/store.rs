//! Store contracts for jobs and Gems
//!
//! The poll loop only needs `list`, a persona lookup and a partial update.
//! Writes are last-write-wins; nothing here is transactional across calls.
//! [`Database`](crate::Database) implements both traits on SQLite and
//! [`MemoryStore`] keeps everything in process.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::types::{Gem, JobUpdate, ScheduledJob};
use crate::Result;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// All jobs, in the store's stable listing order
    async fn list_jobs(&self) -> Result<Vec<ScheduledJob>>;

    async fn get_job(&self, id: &str) -> Result<Option<ScheduledJob>> {
        Ok(self.list_jobs().await?.into_iter().find(|j| j.id == id))
    }

    async fn create_job(&self, job: &ScheduledJob) -> Result<()>;

    /// Apply a partial update; returns false when no job has this id
    async fn update_job(&self, id: &str, update: &JobUpdate) -> Result<bool>;

    /// Returns false when no job has this id
    async fn delete_job(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait GemStore: Send + Sync {
    async fn list_gems(&self) -> Result<Vec<Gem>>;

    async fn get_gem(&self, id: &str) -> Result<Option<Gem>> {
        Ok(self.list_gems().await?.into_iter().find(|g| g.id == id))
    }

    async fn create_gem(&self, gem: &Gem) -> Result<()>;

    /// Replace name, instructions and files; returns false when missing
    async fn update_gem(&self, gem: &Gem) -> Result<bool>;

    async fn delete_gem(&self, id: &str) -> Result<bool>;
}

/// In-process store, newest records first like the SQLite store
#[derive(Clone, Default)]
pub struct MemoryStore {
    jobs: Arc<Mutex<Vec<ScheduledJob>>>,
    gems: Arc<Mutex<Vec<Gem>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a job, for assertions
    pub fn job(&self, id: &str) -> Option<ScheduledJob> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn list_jobs(&self) -> Result<Vec<ScheduledJob>> {
        Ok(self.jobs.lock().unwrap().clone())
    }

    async fn create_job(&self, job: &ScheduledJob) -> Result<()> {
        self.jobs.lock().unwrap().insert(0, job.clone());
        Ok(())
    }

    async fn update_job(&self, id: &str, update: &JobUpdate) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => {
                update.apply(job);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_job(&self, id: &str) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        Ok(jobs.len() != before)
    }
}

#[async_trait]
impl GemStore for MemoryStore {
    async fn list_gems(&self) -> Result<Vec<Gem>> {
        Ok(self.gems.lock().unwrap().clone())
    }

    async fn create_gem(&self, gem: &Gem) -> Result<()> {
        self.gems.lock().unwrap().insert(0, gem.clone());
        Ok(())
    }

    async fn update_gem(&self, gem: &Gem) -> Result<bool> {
        let mut gems = self.gems.lock().unwrap();
        match gems.iter_mut().find(|g| g.id == gem.id) {
            Some(existing) => {
                *existing = gem.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_gem(&self, id: &str) -> Result<bool> {
        let mut gems = self.gems.lock().unwrap();
        let before = gems.len();
        gems.retain(|g| g.id != id);
        Ok(gems.len() != before)
    }
}
