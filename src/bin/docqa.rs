use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use docqa::telemetry::init_tracing;
use docqa::{AnswerOutcome, PipelineArgs};

#[derive(Parser, Debug)]
#[command(
    name = "docqa",
    about = "Ingest the document corpus and ask questions over it from the terminal"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk, embed, and upsert the corpus into the vector index
    Ingest,
    /// Answer a question from the indexed corpus
    Ask {
        /// Question to answer
        #[arg(long)]
        query: String,

        /// Run an ingestion pass first (needed with the in-memory index)
        #[arg(long, default_value_t = false)]
        ingest_first: bool,
    },
    /// Print the chunks the corpus produces without calling any provider
    Chunks,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Chunks => print_chunks(&cli.pipeline),
        Command::Ingest => {
            let pipelines = cli.pipeline.build_pipelines().await?;
            let report = pipelines.ingestor.ingest().await?;
            println!("{}", report.message());
            for failure in &report.failures {
                println!("  failed {}: {}", failure.chunk_id, failure.error);
            }
            if report.pruned_count > 0 {
                println!("pruned {} stale ids", report.pruned_count);
            }
            Ok(())
        }
        Command::Ask {
            query,
            ingest_first,
        } => {
            if query.trim().is_empty() {
                bail!("--query must not be empty");
            }
            let pipelines = cli.pipeline.build_pipelines().await?;
            if ingest_first {
                let report = pipelines.ingestor.ingest().await?;
                println!("{}\n", report.message());
            }
            let result = pipelines.query.answer_query(&query).await?;
            println!("--- Answer ---\n{}", result.answer);
            if result.outcome == AnswerOutcome::Fallback {
                println!("(answer generation unavailable; showing best passage)");
            }
            if !result.sources.is_empty() {
                println!("\n--- Sources ---");
                for (idx, source) in result.display_sources().iter().enumerate() {
                    println!(
                        "{}. {} [{}] score={:.3}",
                        idx + 1,
                        source.title,
                        source.category,
                        source.score
                    );
                }
            }
            Ok(())
        }
    }
}

fn print_chunks(pipeline: &PipelineArgs) -> Result<()> {
    let store = pipeline.load_store()?;
    let chunks = store.chunks(pipeline.chunk_size.max(1));
    for chunk in &chunks {
        println!(
            "{}\t{}\t{} words",
            chunk.chunk_id,
            chunk.title,
            chunk.words().split_whitespace().count()
        );
    }
    println!("{} chunks from {} documents", chunks.len(), store.len());
    Ok(())
}
