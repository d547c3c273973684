use std::sync::Arc;

use serde_json::json;

use jobflow::nodes::keys;
use jobflow::{
    analysis_flow, generation_flow, research_flow, CareerProfile, Experience, Flow,
    LocalEchoClient, MemoryProfileStore, PipelineDeps, SharedContext, StaticFetcher,
    TextDocumentSource,
};

const POSTING: &str = "Senior Rust Engineer\n\
    5+ years Rust required\n\
    Distributed systems experience required\n\
    Kubernetes a plus";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let profile = CareerProfile {
        name: "Ada Example".to_string(),
        title: "Systems Engineer".to_string(),
        summary: "Backend engineer with a reliability bent".to_string(),
        experiences: vec![Experience {
            company: "Acme".to_string(),
            role: "Backend Engineer".to_string(),
            start: "2019".to_string(),
            end: None,
            highlights: vec![
                "Shipped Rust services to production".to_string(),
                "Ran distributed ingest across three regions".to_string(),
            ],
            technologies: vec!["Rust".to_string(), "Kafka".to_string()],
        }],
        education: Vec::new(),
        skills: vec!["Rust".to_string(), "Kubernetes".to_string()],
    };

    let deps = PipelineDeps {
        llm: Arc::new(LocalEchoClient),
        profiles: Arc::new(MemoryProfileStore::with_profile("me", profile.clone())),
        documents: Arc::new(TextDocumentSource),
        fetcher: Arc::new(
            StaticFetcher::new().with_page("https://acme.test/about", "Acme builds payment rails"),
        ),
    };

    // 摄入阶段换成直接种入上下文，其余阶段照常嵌套
    let mut builder = Flow::builder("demo_pipeline");
    builder
        .node("analysis", Arc::new(analysis_flow(&deps)?))
        .node("research", Arc::new(research_flow(&deps)?))
        .node("generation", Arc::new(generation_flow(&deps)?))
        .start("analysis")
        .connect("analysis", "research")
        .connect("research", "generation");
    let pipeline = builder.build()?;

    let ctx = SharedContext::new();
    ctx.insert_as(keys::PROFILE, &profile)?;
    ctx.insert(keys::POSTING, json!(POSTING));
    ctx.insert(keys::RESEARCH_QUEUE, json!(["https://acme.test/about"]));

    let ctx = pipeline.execute(ctx).await?;

    if let Some(report) = ctx.get(keys::FIT_REPORT) {
        println!(
            "fit score: {} - {}",
            report["overall_score"], report["recommendation"]
        );
    }
    if let Some(cv) = ctx.get(keys::CV_DRAFT) {
        println!("\n--- CV draft ---\n{}", cv.as_str().unwrap_or_default());
    }
    if let Some(letter) = ctx.get(keys::COVER_LETTER_DRAFT) {
        println!(
            "\n--- Cover letter draft ---\n{}",
            letter.as_str().unwrap_or_default()
        );
    }
    Ok(())
}
