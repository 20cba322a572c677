use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use glyphforge::orchestrator::Orchestrator;
use glyphforge::pipeline::PipelineStatus;
use glyphforge::types::{Artifact, GenerationOptions, GenerationRequest, TargetKind};
use glyphforge::{ConfigLoader, MemoryStore};

/// Parse target kind from string
fn parse_target_kind(s: &str) -> Result<TargetKind, String> {
    TargetKind::parse(&s.to_lowercase()).ok_or_else(|| {
        format!(
            "Invalid kind '{}'. Valid values: icon-pack, ui-bundle, component",
            s
        )
    })
}

#[derive(Parser)]
#[command(name = "glyphforge")]
#[command(
    version,
    about = "Generate icon packs, UI bundles, and components from free-text requests"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a generation request through the step pipeline
    Generate {
        /// Free-text description of what to generate
        description: String,
        #[arg(long, short, default_value = "icon-pack", value_parser = parse_target_kind)]
        kind: TargetKind,
        #[arg(long, help = "Style hint forwarded to the provider")]
        style: Option<String>,
        #[arg(long, help = "Color hint forwarded to the provider")]
        color: Option<String>,
        #[arg(long, help = "Also generate stylistic variants")]
        variants: bool,
        #[arg(long, help = "Allow the analysis step to pause on vague requests")]
        analyze: bool,
        #[arg(long, help = "Single-shot dispatch without a pipeline session")]
        once: bool,
    },

    /// Check provider endpoint availability
    Doctor,

    /// Show configuration file paths
    ConfigPath,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "glyphforge=debug"
    } else if cli.quiet {
        "glyphforge=error"
    } else {
        "glyphforge=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} failed to start runtime: {}", style("error:").red(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let config = ConfigLoader::load()?;
    let orchestrator = Orchestrator::from_config(&config, MemoryStore::shared())?;

    match command {
        Commands::Generate {
            description,
            kind,
            style,
            color,
            variants,
            analyze,
            once,
        } => {
            let mut request = GenerationRequest::new(description, kind);
            if let Some(style) = style {
                request = request.with_style(style);
            }
            if let Some(color) = color {
                request = request.with_color(color);
            }
            if analyze {
                request = request.with_analysis();
            }

            if once {
                let (artifacts, stats) = orchestrator.generate_once(&request).await?;
                print_artifacts(&artifacts);
                println!(
                    "{} via {} in {}ms",
                    console::style("done").green(),
                    stats.successful_provider.as_deref().unwrap_or("unknown"),
                    stats.total_duration_ms
                );
                return Ok(());
            }

            let options = GenerationOptions {
                include_variants: variants,
            };
            let id = orchestrator.start(request, options).await?;
            println!("pipeline {}", console::style(&id).cyan());

            loop {
                tokio::time::sleep(Duration::from_millis(250)).await;
                let snapshot = orchestrator.get_pipeline(&id).await?;
                match snapshot.status {
                    PipelineStatus::Completed => {
                        for step in &snapshot.steps {
                            println!(
                                "  {} {} ({}ms)",
                                console::style("+").green(),
                                step.name,
                                step.duration_ms.unwrap_or(0)
                            );
                        }
                        if let Some(artifacts) = orchestrator.load_artifacts(&id).await {
                            print_artifacts(&artifacts);
                        }
                        println!("{}", console::style("completed").green());
                        return Ok(());
                    }
                    PipelineStatus::Failed => {
                        let failed = snapshot
                            .steps
                            .iter()
                            .find(|s| s.status == glyphforge::pipeline::StepStatus::Failed);
                        if let Some(step) = failed {
                            anyhow::bail!(
                                "step '{}' failed after {} attempts: {}",
                                step.id,
                                step.retries,
                                step.last_error.as_deref().unwrap_or("unknown error")
                            );
                        }
                        anyhow::bail!("pipeline failed");
                    }
                    PipelineStatus::Paused => {
                        let question = snapshot
                            .current()
                            .and_then(|s| s.result.as_ref())
                            .and_then(|r| r.get("question"))
                            .and_then(|q| q.as_str())
                            .unwrap_or("more detail needed");
                        anyhow::bail!(
                            "pipeline paused: {} (resume with a fuller description)",
                            question
                        );
                    }
                    _ => {}
                }
            }
        }

        Commands::Doctor => {
            let report = orchestrator.provider_health().await;
            if report.is_empty() {
                println!("{} no providers configured", style("!").yellow());
                return Ok(());
            }
            for (name, healthy) in report {
                let mark = if healthy {
                    style("ok").green()
                } else {
                    style("unreachable").red()
                };
                println!("  {:<20} {}", name, mark);
            }
            Ok(())
        }

        Commands::ConfigPath => {
            if let Some(global) = ConfigLoader::global_config_path() {
                println!("global:  {}", global.display());
            }
            println!("project: {}", ConfigLoader::project_config_path().display());
            Ok(())
        }
    }
}

fn print_artifacts(artifacts: &[Artifact]) {
    for artifact in artifacts {
        match artifact {
            Artifact::Icon(icon) => println!(
                "  {} {} ({}px, {})",
                style("icon").cyan(),
                icon.semantic_name,
                icon.bounding_size,
                icon.category
            ),
            Artifact::Bundle(bundle) => println!(
                "  {} html {}B, css {}B, js {}B, {} icons",
                style("bundle").cyan(),
                bundle.html.len(),
                bundle.css.len(),
                bundle.js.len(),
                bundle.icons.len()
            ),
            Artifact::Component(component) => println!(
                "  {} {} ({} deps)",
                style("component").cyan(),
                component.name,
                component.dependencies.len()
            ),
            Artifact::Stylesheet { css } => {
                println!("  {} {}B", style("stylesheet").cyan(), css.len())
            }
        }
    }
}
