//! taskindex - CLI entry point

use std::fs;
use std::path::PathBuf;

use clap::Parser as ClapParser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use taskindex::cli::{Cli, Command, QueryCommand};
use taskindex::config::Config;
use taskindex::domain::{DateField, TaskRecord, TaskStatus};
use taskindex::orchestrator::Indexer;
use taskindex::query::QueryService;
use taskindex::sources::{PollingSource, Source};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskindex")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("taskindex.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Command::Run => run_daemon(config).await,
        Command::Scan => run_scan(config).await,
        Command::Query { query } => run_query(config, query).await,
        Command::Projects => run_projects(config).await,
    }
}

async fn run_daemon(config: Config) -> Result<()> {
    let corpus = config.corpus.clone();
    let indexer = Indexer::spawn(config)?;
    indexer.initialize().await?;

    let queries = QueryService::new(indexer.repository());
    println!(
        "{} {} tasks indexed from {}",
        "ready:".green().bold(),
        queries.all_tasks().len(),
        corpus.root.display()
    );

    let source = Box::new(PollingSource::new(&corpus, indexer.clone()));
    let source_task = tokio::spawn(source.run());

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    info!("Shutdown requested");
    source_task.abort();
    indexer.shutdown().await?;

    println!("{}", "stopped".yellow());
    Ok(())
}

async fn run_scan(config: Config) -> Result<()> {
    let root = config.corpus.root.clone();
    let indexer = Indexer::spawn(config)?;
    indexer.initialize().await?;
    indexer.rebuild().await?;

    let queries = QueryService::new(indexer.repository());
    let tasks = queries.all_tasks();
    let files: std::collections::BTreeSet<_> = tasks.iter().map(|t| t.path.clone()).collect();
    let open = tasks.iter().filter(|t| !t.is_closed()).count();

    println!("scan {}", root.display());
    println!("  files with tasks: {}", files.len());
    println!("  tasks indexed: {}", tasks.len());
    println!("  open: {}", open);
    println!("{}", "ok".green());

    indexer.shutdown().await?;
    Ok(())
}

async fn run_query(config: Config, query: QueryCommand) -> Result<()> {
    let indexer = Indexer::spawn(config)?;
    indexer.initialize().await?;
    let queries = QueryService::new(indexer.repository());

    match query {
        QueryCommand::All => print_tasks(&queries.all_tasks()),
        QueryCommand::Project { name } => print_tasks(&queries.tasks_by_project(&name)),
        QueryCommand::Id { id } => match queries.task_by_id(&id) {
            Some(task) => print_tasks(&[task]),
            None => println!("{} no task with id {}", "not found:".red(), id),
        },
        QueryCommand::Range { from, to, field } => {
            let from = chrono::NaiveDate::parse_from_str(&from, "%Y-%m-%d").context("Invalid from date")?;
            let to = chrono::NaiveDate::parse_from_str(&to, "%Y-%m-%d").context("Invalid to date")?;
            let field: DateField = field.parse().map_err(|e: String| eyre::eyre!(e))?;
            print_tasks(&queries.tasks_by_date_range(from, to, field));
        }
    }

    indexer.shutdown().await?;
    Ok(())
}

async fn run_projects(config: Config) -> Result<()> {
    let indexer = Indexer::spawn(config)?;
    indexer.initialize().await?;
    let queries = QueryService::new(indexer.repository());

    let (projects, contexts) = queries.projects_and_contexts();
    println!("{}", "projects:".bold());
    for project in projects {
        println!("  {project}");
    }
    println!("{}", "contexts:".bold());
    for context in contexts {
        println!("  @{context}");
    }

    indexer.shutdown().await?;
    Ok(())
}

fn print_tasks(tasks: &[TaskRecord]) {
    if tasks.is_empty() {
        println!("{}", "no tasks".dimmed());
        return;
    }

    for task in tasks {
        let marker = match task.status {
            TaskStatus::Done => "x".green(),
            TaskStatus::InProgress => "/".yellow(),
            TaskStatus::Cancelled => "-".red(),
            TaskStatus::Open => " ".normal(),
        };
        let due = task
            .meta
            .due
            .map(|d| format!(" 📅 {d}").cyan().to_string())
            .unwrap_or_default();
        let project = task
            .meta
            .project
            .as_deref()
            .map(|p| format!(" [{p}]").dimmed().to_string())
            .unwrap_or_default();

        println!(
            "[{}] {}{}{}  {}",
            marker,
            task.text,
            due,
            project,
            format!("{}:{}", task.path.display(), task.position.line() + 1).dimmed()
        );
    }
    println!("{} {}", tasks.len(), "task(s)".dimmed());
}
