use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dodo_tools::generate::{self, PackageOptions};
use dodo_tools::io::publish::{
    ArchivePublisher, DEFAULT_BRANCH, DEFAULT_REMOTE_PATH, GitHubPublisher,
};
use dodo_tools::plan::SheetPlan;
use dodo_tools::{Result, ToolError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging().and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| ToolError::Logging(err.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate(args) => execute_generate(args),
        Command::Plan(args) => execute_plan(args),
    }
}

fn execute_generate(args: GenerateArgs) -> Result<()> {
    if args.lob.is_empty() && args.reinsurance.is_empty() {
        return Err(ToolError::NoInputs);
    }

    let plan = resolve_plan(&args)?;

    let publisher = match &args.publish {
        Some(repository) => {
            let token = args
                .github_token
                .as_deref()
                .ok_or(ToolError::MissingToken)?;
            Some(GitHubPublisher::new(repository, &args.branch, token)?)
        }
        None => None,
    };

    let uploads = generate::load_uploads(&args.lob, &args.reinsurance)?;
    let report = generate::generate(&uploads, &plan)?;

    let options = PackageOptions {
        output: args.output,
        results_dir: args.results_dir,
        remote_path: args.publish_path,
        message: args.message,
    };
    let summary = generate::package(
        report,
        &options,
        publisher.as_ref().map(|publisher| publisher as &dyn ArchivePublisher),
    )?;

    for issue in &summary.report.issues {
        eprintln!("warning: {issue}");
    }
    println!(
        "wrote {} sheets ({} bytes) to {}",
        summary.report.outputs.len(),
        summary.archive_size,
        options.output.display()
    );
    if let Some(outcome) = summary.published {
        println!("published {} ({outcome:?})", options.remote_path);
    }
    Ok(())
}

/// Loads the plan file, if any, and applies command line overrides.
fn resolve_plan(args: &GenerateArgs) -> Result<SheetPlan> {
    let mut plan = match &args.plan {
        Some(path) => SheetPlan::load(path)?,
        None => SheetPlan::default(),
    };
    if let Some(header_rows) = args.header_rows {
        plan.header_rows = header_rows;
    }
    Ok(plan)
}

fn execute_plan(args: PlanArgs) -> Result<()> {
    let json = serde_json::to_string_pretty(&SheetPlan::default())?;
    match args.output {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Merge line of business and reinsurance workbooks into a CSV archive."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge the configured sheets across all workbooks and package them.
    Generate(GenerateArgs),
    /// Print the built-in sheet plan as JSON.
    Plan(PlanArgs),
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Line of business workbooks, in merge order.
    #[arg(long, num_args = 1..)]
    lob: Vec<PathBuf>,

    /// Reinsurance workbooks, merged after the line of business ones.
    #[arg(long, num_args = 1..)]
    reinsurance: Vec<PathBuf>,

    /// Path the ZIP archive is written to.
    #[arg(long, default_value = "Dodo_results.zip")]
    output: PathBuf,

    /// Also write the individual CSV files to this folder.
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// JSON sheet plan overriding the built-in one.
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Rows preceding the header row in every sheet.
    #[arg(long)]
    header_rows: Option<usize>,

    /// Publish the archive to this GitHub repository (owner/name).
    #[arg(long)]
    publish: Option<String>,

    /// Path of the archive inside the repository.
    #[arg(long, default_value = DEFAULT_REMOTE_PATH)]
    publish_path: String,

    /// Branch to commit to.
    #[arg(long, default_value = DEFAULT_BRANCH)]
    branch: String,

    /// Access token used for publishing.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Commit message used for publishing.
    #[arg(long, default_value = "Update merged results")]
    message: String,
}

#[derive(clap::Args)]
struct PlanArgs {
    /// Write the plan to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}
