use anyhow::Result;
use clap::Parser;
use retriever::config::{Cli, Config};
use retriever::crawler::Retriever;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive("retriever=info".parse().unwrap())
                .from_env_lossy(),
        )
        .without_time()
        .with_target(false)
        .finish()
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli)?;

    let mut retriever = Retriever::new(config)?;

    let exit_code = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            retriever.run().await?;
            Ok::<_, anyhow::Error>(retriever.exit_code())
        })?;

    let stats = retriever.stats();
    tracing::info!(
        downloads = stats.downloads,
        redirects = stats.redirects,
        not_modified = stats.not_modified,
        errors = stats.errors,
        chunks = stats.chunks,
        total_bytes = stats.total_bytes,
        "retrieval finished"
    );

    std::process::exit(exit_code);
}
