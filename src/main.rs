use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use connpool::config;
use connpool::pool::{Pool, TcpConnector};

#[derive(Parser)]
#[command(name = "connpool")]
#[command(version, about = "Client-side TCP connection pool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (falls back to POOL_* environment variables)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print it
    Check,

    /// Open a pool against the configured targets and exercise it
    Probe {
        /// Acquire/release cycles per worker
        #[arg(long, default_value = "100")]
        rounds: usize,

        /// Number of concurrent workers
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check => {
            config.validate()?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
        Commands::Probe {
            rounds,
            concurrency,
            json,
        } => {
            let pool = Arc::new(
                Pool::new(config, TcpConnector::default())
                    .await
                    .context("Failed to open connection pool")?,
            );

            let start = Instant::now();
            let workers = (0..concurrency.max(1)).map(|worker| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    for _ in 0..rounds {
                        let conn = pool.acquire().await?;
                        pool.release(conn).await?;
                    }
                    info!(worker, rounds, "Worker finished");
                    Ok::<_, connpool::PoolError>(())
                })
            });

            let mut failures = 0usize;
            for result in futures::future::join_all(workers).await {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(error = %e, recoverable = e.is_recoverable(), "Worker failed");
                        failures += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "Worker panicked");
                        failures += 1;
                    }
                }
            }

            let elapsed = start.elapsed();
            let stats = pool.stats();
            pool.close().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("elapsed:   {:.2?}", elapsed);
                println!("idle:      {}/{}", stats.idle, stats.max_idle);
                println!("created:   {}", stats.created);
                println!("reused:    {}", stats.reused);
                println!("expired:   {}", stats.expired);
                println!("discarded: {}", stats.discarded);
            }

            if failures > 0 {
                anyhow::bail!("{} of {} workers failed", failures, concurrency.max(1));
            }
        }
    }

    Ok(())
}
