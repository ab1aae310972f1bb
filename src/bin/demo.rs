//! Manual smoke-test harness (§10): wires the memory queue, filesystem
//! Document Store, and a mock model provider through the `Platform`
//! composition root, submits a sample document, and prints the result once
//! the Worker Pool has processed it. Not a production CLI or HTTP surface.

use std::time::Duration;

use clap::{Parser, Subcommand};
use docbench::config::{Config, ProviderProfile, SelectionStrategy};
use docbench::gateway::ModelProvider;
use docbench::gateway::tools::mock::MockProvider;
use docbench::gateway::{Capability, ProviderMetadata};
use docbench::platform::Platform;
use docbench::submission::Input;

#[derive(Parser, Debug)]
#[command(name = "docbench-demo")]
#[command(about = "Submits a sample document through the full pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a plain-text sample note (default if no subcommand is given)
    Note,
    /// Submit a sample JSON document (completes synchronously, no queue)
    Json,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = Config::default();
    config.gateway.default_provider = Some("demo".to_string());
    config.gateway.selection_strategy = SelectionStrategy::Balanced;
    config.gateway.providers.insert(
        "demo".to_string(),
        ProviderProfile { model_id: "demo-1".to_string(), ..Default::default() },
    );

    let provider: Box<dyn ModelProvider> = Box::new(MockProvider::new(ProviderMetadata {
        id: "demo".to_string(),
        model_id: "demo-1".to_string(),
        enabled: true,
        capabilities: vec![Capability::TextGen],
        cost_tier: 1,
        cost_per_1k_input: 0.0,
        cost_per_1k_output: 0.0,
        avg_latency_ms: 10,
        max_context: 8192,
        quality_score: 0.8,
        preferred_for: vec![],
    }));

    let platform = Platform::build(config, vec![provider]).await?;

    let pool = platform.worker_pool.clone();
    let pool_handle = tokio::spawn(pool.run());

    let outcome = match cli.command.unwrap_or(Commands::Note) {
        Commands::Note => {
            platform
                .submission
                .submit(None, "note.txt", Input::Bytes(b"Hello world.\nSecond line.".to_vec()), "demo-user")
                .await?
        }
        Commands::Json => {
            platform
                .submission
                .submit(None, "sample.json", Input::Bytes(br#"{"a":1,"b":2,"c":3}"#.to_vec()), "demo-user")
                .await?
        }
    };

    println!("submitted document {} (queued={})", outcome.document_id, outcome.queued);

    if outcome.queued {
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Some(doc) = platform.store.load(&outcome.document_id).await? {
                if doc.stage == docbench::document::ProcessingStage::Completed {
                    print_document(&doc);
                    break;
                }
            }
        }
    } else if let Some(doc) = platform.store.load(&outcome.document_id).await? {
        print_document(&doc);
    }

    platform.worker_pool.shutdown();
    pool_handle.await?;
    Ok(())
}

fn print_document(doc: &docbench::document::Document) {
    println!("state: {:?}", doc.stage);
    println!("language: {:?}", doc.language);
    println!("summary: {:?}", doc.summary);
    if let Some(content) = &doc.formatted_content {
        println!("formatted_content:\n{content}");
    }
}
