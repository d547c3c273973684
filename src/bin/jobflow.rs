use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use jobflow::logging::LoggingConfig;
use jobflow::nodes::keys;
use jobflow::validation::InputValidator;
use jobflow::{
    application_pipeline, CareerProfile, JsonFileStore, LocalEchoClient, PipelineDeps,
    ProfileStore, SharedContext, TextDocumentSource,
};

#[derive(Parser)]
#[command(name = "jobflow", version, about = "Job application assistant", author)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline and produce a tailored CV and cover letter
    Tailor {
        #[arg(long)]
        profile: PathBuf,
        #[arg(long)]
        posting: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Company pages to research, in fetch order
        #[arg(long = "company-url")]
        company_urls: Vec<String>,
        #[arg(long, default_value_t = 3)]
        research_budget: u64,
    },
    /// Print a summary of a stored career profile
    InspectProfile { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    LoggingConfig::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Tailor {
            profile,
            posting,
            out,
            company_urls,
            research_budget,
        } => handle_tailor(profile, posting, out, company_urls, research_budget).await?,
        Command::InspectProfile { path } => handle_inspect_profile(path).await?,
    }
    Ok(())
}

fn build_deps() -> PipelineDeps {
    PipelineDeps {
        llm: Arc::new(LocalEchoClient),
        profiles: Arc::new(JsonFileStore::new(".")),
        documents: Arc::new(TextDocumentSource),
        fetcher: default_fetcher(),
    }
}

#[cfg(feature = "web-research")]
fn default_fetcher() -> jobflow::DynFetcher {
    Arc::new(jobflow::HttpFetcher::new())
}

#[cfg(not(feature = "web-research"))]
fn default_fetcher() -> jobflow::DynFetcher {
    Arc::new(jobflow::StaticFetcher::new())
}

async fn handle_tailor(
    profile: PathBuf,
    posting: PathBuf,
    out: Option<PathBuf>,
    company_urls: Vec<String>,
    research_budget: u64,
) -> anyhow::Result<()> {
    for url in &company_urls {
        InputValidator::validate_url(url)?;
    }
    InputValidator::validate_research_budget(research_budget)?;

    let deps = build_deps();
    let pipeline = application_pipeline(&deps)?;

    let ctx = SharedContext::new();
    ctx.insert(keys::PROFILE_KEY, json!(profile.display().to_string()));
    ctx.insert(keys::POSTING_PATH, json!(posting.display().to_string()));
    ctx.insert(keys::RESEARCH_QUEUE, json!(company_urls));
    ctx.insert(keys::RESEARCH_BUDGET, json!(research_budget));
    if let Some(out) = &out {
        ctx.insert(keys::OUTPUT_DIR, json!(out.display().to_string()));
    }

    let ctx = pipeline.execute(ctx).await?;

    match ctx.get(keys::OUTPUTS) {
        Some(Value::Object(outputs)) => {
            if let Some(files) = outputs.get("files") {
                println!("Documents written: {files}");
            } else {
                println!("--- CV ---");
                println!("{}", outputs["cv"].as_str().unwrap_or_default());
                println!("--- Cover letter ---");
                println!("{}", outputs["cover_letter"].as_str().unwrap_or_default());
            }
        }
        _ => println!("Pipeline finished without outputs"),
    }

    if let Some(Value::Object(report)) = ctx.get(keys::FIT_REPORT) {
        println!(
            "Fit score: {} - {}",
            report["overall_score"],
            report["recommendation"].as_str().unwrap_or_default()
        );
    }
    Ok(())
}

async fn handle_inspect_profile(path: PathBuf) -> anyhow::Result<()> {
    let store = JsonFileStore::new(".");
    let profile: CareerProfile = store
        .load(&path.display().to_string())
        .await?
        .ok_or_else(|| anyhow::anyhow!("profile `{}` not found", path.display()))?;
    InputValidator::validate_profile(&profile)?;

    println!("{} - {}", profile.name, profile.title);
    if !profile.summary.is_empty() {
        println!("{}", profile.summary);
    }
    println!(
        "{} experience entries, {} skills",
        profile.experiences.len(),
        profile.skills.len()
    );
    for experience in &profile.experiences {
        println!("  {} at {}", experience.role, experience.company);
    }
    Ok(())
}
