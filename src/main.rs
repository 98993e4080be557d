mod config;
mod executor;
mod shell;
mod storage;
mod store_manager;
mod tasks;
mod validator;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use config::Config;
use executor::CommandExecutor;
use storage::{ExecutionRecord, Task};
use store_manager::StoreManager;
use tasks::{NewTask, TaskError, TaskService};

#[derive(Parser)]
#[command(name = "tg", version)]
#[command(about = "Register shell commands as tasks, run them through a safety gate, and keep their history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update a task (the command is validated first)
    Add {
        /// Task name
        name: String,
        /// Command to store (quote it if it has spaces)
        command: String,
        /// Task id; derived from name and command when omitted
        #[arg(long)]
        id: Option<String>,
        /// Owner recorded with the task
        #[arg(long)]
        owner: Option<String>,
    },
    /// List tasks
    List {
        /// Only tasks with this owner
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show a task and its recent executions
    Show {
        id: String,
    },
    /// Find tasks whose name contains the text (case-insensitive)
    Search {
        name: String,
    },
    /// Run a stored task and record the execution
    Run {
        id: String,
    },
    /// Run a command once without storing it
    Exec {
        command: String,
    },
    /// Delete a task
    Delete {
        id: String,
    },
    /// Print the allowed command shapes
    Allowed,
    /// Check whether a command would be accepted
    Check {
        command: String,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr so command output on stdout stays clean (RUST_LOG=tg=debug for more)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tg=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::new()?;
    if !config.display.color {
        colored::control::set_override(false);
    }

    // These two never touch the store.
    match &cli.command {
        Commands::Allowed => {
            print_allowed();
            return Ok(());
        }
        Commands::Check { command } => {
            match validator::check(command) {
                Ok(()) => println!("{} {}", "safe:".green().bold(), command),
                Err(reason) => {
                    println!("{} {} ({})", "unsafe:".red().bold(), command, reason);
                    print_allowed();
                    std::process::exit(1);
                }
            }
            return Ok(());
        }
        _ => {}
    }

    let max_history = config.display.max_history_shown;
    let store = StoreManager::new_with_config(config)?;
    let service = TaskService::new(store, CommandExecutor::new());

    let outcome = match cli.command {
        Commands::Add { name, command, id, owner } => service
            .register(NewTask { id, name, owner, command })
            .map(|task| {
                println!("{}", "Task saved".green().bold());
                print_task(&task, 0);
            }),
        Commands::List { owner } => service.list(owner.as_deref()).map(|tasks| {
            if tasks.is_empty() {
                println!("{}", "No tasks found".yellow());
            }
            for task in &tasks {
                print_task_line(task);
            }
        }),
        Commands::Show { id } => service.get(&id).map(|task| print_task(&task, max_history)),
        Commands::Search { name } => service.search(&name).map(|tasks| {
            if tasks.is_empty() {
                println!("{}", format!("No tasks found matching '{name}'").yellow());
            }
            for task in &tasks {
                print_task_line(task);
            }
        }),
        Commands::Run { id } => service.run(&id).map(|task| {
            if let Some(record) = task.last_execution() {
                print_record(record);
            }
        }),
        Commands::Exec { command } => service.execute(&command).map(|record| print_record(&record)),
        Commands::Delete { id } => service
            .delete(&id)
            .map(|()| println!("{}", format!("Task {id} deleted").green())),
        Commands::Allowed | Commands::Check { .. } => Ok(()),
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(TaskError::Unsafe(err)) => {
            eprintln!("{} {}", "Error:".red().bold(), err);
            std::process::exit(2);
        }
        Err(TaskError::NotFound(id)) => {
            eprintln!("{} task '{}' not found", "Error:".red().bold(), id);
            std::process::exit(3);
        }
        Err(err) => Err(err.into()),
    }
}

fn print_allowed() {
    println!("{}", "Allowed commands:".cyan().bold());
    for usage in validator::allowed_commands() {
        println!("  {}", usage);
    }
}

fn print_task_line(task: &Task) {
    let owner = task.owner.as_deref().unwrap_or("-");
    println!(
        "{}  {}  {}  {}  {}",
        task.id.yellow(),
        task.name.bold(),
        owner.dimmed(),
        task.command.cyan(),
        format!("[{} runs]", task.task_executions.len()).dimmed()
    );
}

/// Print a task and up to `max_history` of its latest executions.
fn print_task(task: &Task, max_history: usize) {
    println!("{}: {}", "Id".yellow(), task.id);
    println!("{}: {}", "Name".yellow(), task.name);
    println!("{}: {}", "Owner".yellow(), task.owner.as_deref().unwrap_or("-"));
    println!("{}: {}", "Command".yellow(), task.command.cyan());
    println!("{}: {}", "Executions".yellow(), task.task_executions.len());

    let skip = task.task_executions.len().saturating_sub(max_history);
    for record in task.task_executions.iter().skip(skip) {
        println!();
        print_record(record);
    }
}

fn print_record(record: &ExecutionRecord) {
    println!(
        "{} {} -> {} ({}ms)",
        "Executed".green().bold(),
        record.start_time().format("%Y-%m-%d %H:%M:%S%.3fZ"),
        record.end_time().format("%Y-%m-%d %H:%M:%S%.3fZ"),
        record.duration().num_milliseconds()
    );
    if !record.output().is_empty() {
        println!("{}", record.output());
    }
}
