use crate::executor::{CommandExecutor, UnsafeCommand};
use crate::shell::{Shell, ShellLauncher};
use crate::storage::{ExecutionRecord, Task};
use crate::store_manager::{is_valid_id, StoreManager};
use crate::validator;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task '{0}' not found")]
    NotFound(String),
    #[error("invalid task id '{0}': use 1-64 letters, digits, '-' or '_'")]
    InvalidId(String),
    #[error(transparent)]
    Unsafe(#[from] UnsafeCommand),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// What a caller supplies to create or replace a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub id: Option<String>,
    pub name: String,
    pub owner: Option<String>,
    pub command: String,
}

pub struct TaskService<S = Shell> {
    store: StoreManager,
    executor: CommandExecutor<S>,
}

impl<S: ShellLauncher> TaskService<S> {
    pub fn new(store: StoreManager, executor: CommandExecutor<S>) -> Self {
        Self { store, executor }
    }

    /// Validate the command and upsert the task.
    ///
    /// Updating an existing id keeps its execution history.
    pub fn register(&self, new_task: NewTask) -> Result<Task, TaskError> {
        if let Err(reason) = validator::check(&new_task.command) {
            return Err(UnsafeCommand {
                command: new_task.command,
                reason,
            }
            .into());
        }

        let id = match new_task.id {
            Some(id) => id,
            None => derive_task_id(&new_task.name, &new_task.command),
        };
        if !is_valid_id(&id) {
            return Err(TaskError::InvalidId(id));
        }

        let mut task = match self.store.find_task(&id)? {
            Some(mut existing) => {
                existing.name = new_task.name;
                existing.owner = new_task.owner;
                existing.command = new_task.command;
                existing
            }
            None => Task::new(id, new_task.name, new_task.owner, new_task.command),
        };

        self.store.save_task(&mut task)?;
        info!(task = %task.id, command = %task.command, "task registered");
        Ok(task)
    }

    /// Run the stored command and append the record to the task's history.
    pub fn run(&self, id: &str) -> Result<Task, TaskError> {
        let mut task = self.get(id)?;
        let record = self.executor.execute(&task.command)?;
        task.add_execution(record);
        self.store.save_task(&mut task)?;
        Ok(task)
    }

    /// Execute a command without registering it.
    pub fn execute(&self, command: &str) -> Result<ExecutionRecord, TaskError> {
        Ok(self.executor.execute(command)?)
    }

    pub fn get(&self, id: &str) -> Result<Task, TaskError> {
        if !is_valid_id(id) {
            return Err(TaskError::InvalidId(id.to_string()));
        }
        self.store
            .find_task(id)?
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    pub fn list(&self, owner: Option<&str>) -> Result<Vec<Task>, TaskError> {
        let tasks = match owner {
            Some(owner) => self.store.find_by_owner(owner)?,
            None => self.store.get_all_tasks()?,
        };
        Ok(tasks)
    }

    pub fn search(&self, name: &str) -> Result<Vec<Task>, TaskError> {
        Ok(self.store.find_by_name(name)?)
    }

    pub fn delete(&self, id: &str) -> Result<(), TaskError> {
        if !is_valid_id(id) {
            return Err(TaskError::InvalidId(id.to_string()));
        }
        if self.store.delete_task(id)? {
            Ok(())
        } else {
            Err(TaskError::NotFound(id.to_string()))
        }
    }
}

/// Stable id for tasks registered without one: a short hash of name and command.
pub fn derive_task_id(name: &str, command: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(command.trim().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::validator::Rejection;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    /// Echoes a fixed marker instead of running the real command line.
    struct MarkerShell;

    impl ShellLauncher for MarkerShell {
        fn command(&self, _command_line: &str) -> Command {
            let (program, flag) = if cfg!(windows) { ("cmd.exe", "/c") } else { ("sh", "-c") };
            let mut command = Command::new(program);
            command.args([flag, "echo marker"]);
            command
        }

        fn program(&self) -> &str {
            "marker-shell"
        }
    }

    fn service(dir: &TempDir) -> TaskService<MarkerShell> {
        let store =
            StoreManager::with_base_dir(dir.path().to_path_buf(), Config::default()).unwrap();
        TaskService::new(store, CommandExecutor::with_shell(MarkerShell))
    }

    fn new_task(id: Option<&str>, name: &str, command: &str) -> NewTask {
        NewTask {
            id: id.map(str::to_string),
            name: name.to_string(),
            owner: Some("ana".to_string()),
            command: command.to_string(),
        }
    }

    #[test]
    fn register_rejects_unsafe_commands() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let err = service
            .register(new_task(Some("bad"), "wipe", "rm -rf /"))
            .unwrap_err();
        match err {
            TaskError::Unsafe(unsafe_command) => {
                assert_eq!(unsafe_command.reason, Rejection::Denylisted("rm".into()))
            }
            other => panic!("expected unsafe command, got {other:?}"),
        }
        assert!(service.list(None).unwrap().is_empty());
    }

    #[test]
    fn register_derives_id_when_missing() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let task = service.register(new_task(None, "greet", "echo hi")).unwrap();
        assert_eq!(task.id, derive_task_id("greet", "echo hi"));
        assert_eq!(task.id.len(), 12);
        assert!(is_valid_id(&task.id));
    }

    #[test]
    fn register_rejects_bad_ids() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        let err = service
            .register(new_task(Some("../x"), "greet", "echo hi"))
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidId(_)));
    }

    #[test]
    fn run_appends_execution_and_update_keeps_history() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.register(new_task(Some("t1"), "greet", "echo hi")).unwrap();

        let task = service.run("t1").unwrap();
        assert_eq!(task.task_executions.len(), 1);
        assert_eq!(task.task_executions[0].output(), "marker");

        let updated = service
            .register(new_task(Some("t1"), "greet loudly", "echo HI"))
            .unwrap();
        assert_eq!(updated.name, "greet loudly");
        assert_eq!(updated.task_executions.len(), 1);

        let task = service.run("t1").unwrap();
        assert_eq!(task.task_executions.len(), 2);
        assert_eq!(service.get("t1").unwrap(), task);
    }

    #[test]
    fn run_revalidates_tampered_commands() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.register(new_task(Some("t2"), "list", "ls")).unwrap();

        // Someone edits the stored file behind the service's back.
        let path = dir.path().join("tasks").join("t2.json");
        let tampered = fs::read_to_string(&path).unwrap().replace("\"ls\"", "\"ls; reboot\"");
        fs::write(&path, tampered).unwrap();

        let err = service.run("t2").unwrap_err();
        assert!(matches!(err, TaskError::Unsafe(ref e) if e.reason == Rejection::Chaining));
        assert!(service.get("t2").unwrap().task_executions.is_empty());
    }

    #[test]
    fn missing_tasks_are_not_found() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        assert!(matches!(service.run("nope"), Err(TaskError::NotFound(_))));
        assert!(matches!(service.delete("nope"), Err(TaskError::NotFound(_))));
        assert!(matches!(service.get("nope"), Err(TaskError::NotFound(_))));
    }

    #[test]
    fn search_and_delete() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.register(new_task(Some("a"), "Disk usage", "ls /")).unwrap();
        service.register(new_task(Some("b"), "who", "whoami")).unwrap();

        let found = service.search("DISK").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");

        service.delete("a").unwrap();
        assert!(service.search("disk").unwrap().is_empty());
        assert_eq!(service.list(Some("ana")).unwrap().len(), 1);
    }

    #[test]
    fn direct_execution_goes_through_the_gate() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        assert_eq!(service.execute("date").unwrap().output(), "marker");
        assert!(matches!(service.execute("date; id"), Err(TaskError::Unsafe(_))));
    }
}
