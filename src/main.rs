use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ticket_notify::{Commit, Config, DeployContext, Pipeline, RunReport};

#[derive(Parser)]
#[command(name = "ticket-notify")]
#[command(about = "Notify Slack about tracker tickets referenced in deployed commits")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan commits, fetch tickets, and post a deploy summary
    Notify {
        /// Path to a JSON array of {sha, message, author} commits
        /// (or read from stdin if not provided)
        #[arg(long)]
        commits_file: Option<PathBuf>,

        /// Branch being deployed
        #[arg(long, env = "GITHUB_REF_NAME")]
        branch: String,

        /// Who triggered the deploy
        #[arg(long, env = "GITHUB_ACTOR")]
        actor: String,

        /// Head commit SHA of the deploy
        #[arg(long, env = "GITHUB_SHA")]
        commit_sha: String,

        /// Repository URL for the message footer
        #[arg(long, env = "REPO_URL")]
        repo_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("ticket_notify=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Notify {
            commits_file,
            branch,
            actor,
            commit_sha,
            repo_url,
        } => {
            run_notify(commits_file, branch, actor, commit_sha, repo_url).await?;
        }
    }

    Ok(())
}

async fn run_notify(
    commits_file: Option<PathBuf>,
    branch: String,
    actor: String,
    commit_sha: String,
    repo_url: String,
) -> Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    let commits = read_commits(commits_file)?;
    info!(commits = commits.len(), "Loaded commit list");

    let deploy = DeployContext {
        branch,
        environment: config.environment.clone(),
        actor,
        commit_sha,
        repo_url,
    };

    let pipeline = Pipeline::from_config(config)?;
    let report = pipeline.run(&commits, &deploy).await?;

    println!("tickets found:    {}", report.tickets_found);
    println!("tickets notified: {}", report.tickets_notified);
    if let Some(ts) = &report.message_ts {
        println!("message ts:       {ts}");
    }

    write_workflow_outputs(&report)?;

    Ok(())
}

fn read_commits(commits_file: Option<PathBuf>) -> Result<Vec<Commit>> {
    let raw = match commits_file {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("Failed to read commits file: {}", path.display()))?,
        None => {
            use std::io::Read;
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read commits from stdin")?;
            buffer
        }
    };

    serde_json::from_str(&raw).context("Failed to parse commit list JSON")
}

/// Export run results as workflow outputs when running under CI.
fn write_workflow_outputs(report: &RunReport) -> Result<()> {
    let Ok(path) = std::env::var("GITHUB_OUTPUT") else {
        return Ok(());
    };

    use std::io::Write;
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open workflow output file: {path}"))?;

    writeln!(file, "tickets_found={}", report.tickets_found)?;
    writeln!(file, "tickets_notified={}", report.tickets_notified)?;
    if let Some(ts) = &report.message_ts {
        writeln!(file, "message_ts={ts}")?;
    }

    Ok(())
}
