use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use locus_common::{CapturedEvidence, RecordedStep};
use locus_engine::config::{ConfigLoader, LocusConfig};
use locus_engine::{
    ChainBuilder, DecisionEngine, EvaluatorRegistry, VerificationError, VerificationOrchestrator,
    formatter,
};
use locus_h::HeadlessSession;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "locus", version, about = "Resilient element location for recorded browser steps")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults: ./locus.yaml, then ~/.locus/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Launch browser in visible mode (not headless)
    #[arg(long, global = true)]
    visible: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build a fallback chain from captured evidence (JSON file)
    BuildChain {
        #[arg(long)]
        evidence: PathBuf,
    },
    /// Resolve each recorded step against a live page
    Resolve {
        /// Recorded steps (JSON array)
        #[arg(long)]
        steps: PathBuf,
        #[arg(long)]
        url: String,
        /// Click each resolved point, in order
        #[arg(long)]
        click: bool,
    },
    /// Verify every recorded step without acting, then print the summary
    Verify {
        #[arg(long)]
        steps: PathBuf,
        #[arg(long)]
        url: String,
        /// Write the full session as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the results.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ConfigLoader::load_from(path).await?,
        None => ConfigLoader::load_default().await?,
    };

    match args.command {
        Command::BuildChain { evidence } => build_chain(&config, &evidence).await,
        Command::Resolve { steps, url, click } => {
            resolve(&config, &steps, &url, click, args.visible).await
        }
        Command::Verify { steps, url, report } => {
            verify(&config, &steps, &url, report.as_deref(), args.visible).await
        }
    }
}

async fn build_chain(config: &LocusConfig, path: &Path) -> anyhow::Result<()> {
    let evidence: CapturedEvidence = read_json(path).await?;
    let chain = ChainBuilder::new(config.resolution.max_chain_length).build(&evidence);
    println!("{}", formatter::format_chain(&chain));
    println!("{}", serde_json::to_string_pretty(&chain)?);
    Ok(())
}

async fn resolve(
    config: &LocusConfig,
    steps: &Path,
    url: &str,
    click: bool,
    visible: bool,
) -> anyhow::Result<()> {
    let steps: Vec<RecordedStep> = read_json(steps).await?;
    let session = launch(url, visible).await?;
    let page = session.page();
    let engine = DecisionEngine::new(Arc::new(EvaluatorRegistry::with_defaults(config, None)));
    let builder = ChainBuilder::new(config.resolution.max_chain_length);
    let min_confidence = config.resolution.min_confidence;

    let mut outcome = Ok(());
    for step in steps.iter().filter(|s| !s.is_navigation()) {
        let chain = match &step.fallback_chain {
            Some(chain) => chain.clone(),
            None => builder.build(&step.evidence),
        };
        let result = if click {
            engine
                .resolve_and_click(page.as_ref(), &chain, min_confidence)
                .await
        } else {
            engine.resolve(page.as_ref(), &chain, min_confidence).await
        };
        match result {
            Ok(evaluation) => {
                println!("{}: {}", step.id, formatter::format_evaluation(&evaluation));
                if evaluation.below_threshold && click {
                    outcome = Err(anyhow!("Step {} did not resolve; stopping", step.id));
                    break;
                }
            }
            Err(e) => {
                outcome = Err(anyhow!("Step {}: {}", step.id, e));
                break;
            }
        }
    }

    close(session).await?;
    outcome
}

async fn verify(
    config: &LocusConfig,
    steps: &Path,
    url: &str,
    report: Option<&Path>,
    visible: bool,
) -> anyhow::Result<()> {
    let steps: Vec<RecordedStep> = read_json(steps).await?;
    let session = launch(url, visible).await?;
    let page = session.page();

    let registry = Arc::new(EvaluatorRegistry::with_defaults(config, None));
    let orchestrator = VerificationOrchestrator::new(registry, config.verification.clone())
        .with_chain_builder(ChainBuilder::new(config.resolution.max_chain_length));
    orchestrator.subscribe(|event| {
        if let Some(step) = &event.step_state {
            tracing::debug!("{:?} step {}: {:?}", event.kind, step.step_index, step.state);
        }
    });

    let control = orchestrator.control();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Stopping verification...");
            control.stop();
        }
    });

    let result = orchestrator.start_verification(&steps, page.as_ref()).await;
    ctrl_c.abort();

    let verified = match result {
        Ok(verified) => verified,
        Err(VerificationError::Cancelled) => orchestrator
            .session()
            .context("Cancelled session has no state")?,
        Err(e) => {
            close(session).await?;
            return Err(e.into());
        }
    };

    println!("{}", formatter::format_session(&verified));
    if let Some(path) = report {
        tokio::fs::write(path, formatter::session_report(&verified)?)
            .await
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }

    close(session).await?;
    Ok(())
}

async fn launch(url: &str, visible: bool) -> anyhow::Result<HeadlessSession> {
    let session = HeadlessSession::launch(visible)
        .await
        .map_err(|e| anyhow!("Failed to launch browser: {}", e))?;
    session.navigate(url).await?;
    Ok(session)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

async fn close(session: HeadlessSession) -> anyhow::Result<()> {
    session
        .close()
        .await
        .map_err(|e| anyhow!("Failed to close browser: {}", e))
}
