use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use projforge::config::AppConfig;
use projforge::pipeline::{Pipeline, RunReport};

#[derive(Parser)]
#[command(
    name = "projforge",
    about = "Scaffold a project, run its tests, and repair what it can"
)]
struct Cli {
    /// Free-text description of the project to generate
    description: Option<String>,

    /// Directory generated projects are written to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Ask for confirmation before creating the project
    #[arg(short, long)]
    interactive: bool,

    /// List previously generated projects
    #[arg(short, long)]
    list: bool,

    /// Show the status of a generated project
    #[arg(short, long, value_name = "NAME")]
    status: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(short, long)]
    json: bool,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the report
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if cli.description.is_none() && !cli.list && cli.status.is_none() {
        Cli::command().print_help()?;
        eprintln!("\nerror: a project description, --list or --status is required");
        std::process::exit(1);
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(output) = cli.output {
        config.pipeline.output_dir = output;
    }
    if cli.interactive {
        config.pipeline.interactive = true;
    }

    let pipeline = Pipeline::new(config);

    if cli.list {
        let projects = pipeline.list_projects()?;
        if cli.json {
            let body = serde_json::json!({
                "output_dir": pipeline.output_dir(),
                "projects": projects,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else if projects.is_empty() {
            println!("No projects in {}", pipeline.output_dir().display());
        } else {
            println!("Projects in {}:", pipeline.output_dir().display());
            for name in &projects {
                println!("  {name}");
            }
        }
        return Ok(());
    }

    if let Some(name) = cli.status.as_deref() {
        let status = pipeline.project_status(name).await;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            println!("{}", status.render());
        }
        return Ok(());
    }

    if let Some(description) = cli.description.as_deref() {
        tracing::info!(output_dir = %pipeline.output_dir().display(), "Generating project");
        let state = pipeline.generate_project(description).await;
        let report = RunReport::from_state(&state);
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{}", report.summary);
            println!("Success: {}", report.success);
        }
    }

    Ok(())
}
