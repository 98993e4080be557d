use crate::config::Config;
use crate::storage::Task;
use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MAX_ID_LEN: usize = 64;

/// Ids become file names, so only a conservative character set is accepted.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// One pretty-printed JSON file per task under `<base_dir>/tasks`.
pub struct StoreManager {
    base_dir: PathBuf,
    config: Config,
}

impl StoreManager {
    pub fn new_with_config(config: Config) -> Result<Self> {
        Self::with_base_dir(Config::data_dir(), config)
    }

    pub fn with_base_dir(base_dir: PathBuf, config: Config) -> Result<Self> {
        let tasks_dir = base_dir.join("tasks");
        fs::create_dir_all(&tasks_dir)
            .with_context(|| format!("failed to create {}", tasks_dir.display()))?;

        Ok(Self { base_dir, config })
    }

    fn tasks_dir(&self) -> PathBuf {
        self.base_dir.join("tasks")
    }

    fn task_path(&self, id: &str) -> Result<PathBuf> {
        if !is_valid_id(id) {
            bail!("invalid task id '{id}'");
        }
        Ok(self.tasks_dir().join(format!("{id}.json")))
    }

    /// Write the task, pruning executions past the retention window first.
    pub fn save_task(&self, task: &mut Task) -> Result<()> {
        let path = self.task_path(&task.id)?;

        let retention_days = self.config.storage.max_retention_days;
        if retention_days > 0 {
            let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
            let before = task.task_executions.len();
            task.task_executions.retain(|r| r.start_time() > cutoff);
            let pruned = before - task.task_executions.len();
            if pruned > 0 {
                info!(task = %task.id, pruned, "pruned expired executions");
            }
        }

        let file = fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, task)
            .with_context(|| format!("failed to save task {}", task.id))?;

        debug!(task = %task.id, path = %path.display(), "task saved");
        Ok(())
    }

    pub fn find_task(&self, id: &str) -> Result<Option<Task>> {
        let path = self.task_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        self.load_task(&path).map(Some)
    }

    fn load_task(&self, path: &Path) -> Result<Task> {
        let file =
            fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let task = serde_json::from_reader(file)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(task)
    }

    /// Every readable task, sorted by name then id. Corrupt files are skipped.
    pub fn get_all_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();

        for entry in fs::read_dir(self.tasks_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match self.load_task(&path) {
                Ok(task) => tasks.push(task),
                Err(err) => warn!(path = %path.display(), error = %format!("{err:#}"), "skipping unreadable task file"),
            }
        }

        tasks.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    /// Case-insensitive substring match on task names.
    pub fn find_by_name(&self, query: &str) -> Result<Vec<Task>> {
        let query = query.trim().to_lowercase();
        let tasks = self.get_all_tasks()?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.name.to_lowercase().contains(&query))
            .collect())
    }

    pub fn find_by_owner(&self, owner: &str) -> Result<Vec<Task>> {
        let tasks = self.get_all_tasks()?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.owner.as_deref() == Some(owner))
            .collect())
    }

    /// Returns false when there was nothing to delete.
    pub fn delete_task(&self, id: &str) -> Result<bool> {
        let path = self.task_path(id)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("failed to delete {}", path.display()))?;
        info!(task = %id, "task deleted");
        Ok(true)
    }
}
