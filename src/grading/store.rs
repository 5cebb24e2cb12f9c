use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::{io::AsyncWriteExt, sync::Mutex};
use uuid::Uuid;

use crate::grading::GradedAttempt;

/// Storage collaborator for graded attempts. Records are append-only.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn insert(&self, attempt: GradedAttempt) -> anyhow::Result<()>;

    /// Most recent attempts first.
    async fn recent(
        &self,
        user_id: &str,
        exercise_id: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<GradedAttempt>>;
}

/// Keeps attempts in memory and optionally appends each one to a JSON-lines file.
#[derive(Clone)]
pub struct InMemoryAttemptStore {
    records: Arc<DashMap<Uuid, GradedAttempt>>,
    persistence_path: Option<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl InMemoryAttemptStore {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            persistence_path,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn append_line(&self, path: &Path, attempt: &GradedAttempt) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(attempt).context("failed to encode attempt")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to append to {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn insert(&self, attempt: GradedAttempt) -> anyhow::Result<()> {
        if self.records.contains_key(&attempt.id) {
            anyhow::bail!("attempt {} already recorded", attempt.id);
        }
        if let Some(path) = &self.persistence_path {
            self.append_line(path, &attempt).await?;
        }
        self.records.insert(attempt.id, attempt);
        Ok(())
    }

    async fn recent(
        &self,
        user_id: &str,
        exercise_id: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<GradedAttempt>> {
        let mut attempts: Vec<GradedAttempt> = self
            .records
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.exercise_id == exercise_id)
            .map(|entry| entry.value().clone())
            .collect();
        attempts.sort_by(|a, b| b.attempted_at.cmp(&a.attempted_at));
        attempts.truncate(limit);
        Ok(attempts)
    }
}
