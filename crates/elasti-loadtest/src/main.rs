//! # Elasti Load Test CLI
//!
//! ```bash
//! # Stock scenario
//! elasti-loadtest run
//!
//! # Custom scenario with JSON logs and a Prometheus endpoint
//! elasti-loadtest --log-format json run --config loadtest.toml --metrics-addr 127.0.0.1:9090
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use elasti_loadtest::logging::{display_headers, init_logging, LogFormat};
use elasti_loadtest::shutdown;
use elasti_loadtest::{LoadTestConfig, LoadTestRunner, PrometheusExporter};
use tracing::info;

#[derive(Parser)]
#[command(name = "elasti-loadtest")]
#[command(version)]
#[command(about = "Ramping HTTP load generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty, env = "ELASTI_LOAD_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test
    Run {
        /// Scenario file; the stock scenario is used when omitted
        #[arg(short, long, env = "ELASTI_LOAD_CONFIG")]
        config: Option<PathBuf>,

        /// Write the run summary as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Serve Prometheus metrics on this address while running
        #[arg(long, env = "ELASTI_LOAD_METRICS_ADDR")]
        metrics_addr: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Run {
            config,
            output,
            metrics_addr,
        } => {
            let config = match &config {
                Some(path) => {
                    info!("Loading scenario from {}", path.display());
                    LoadTestConfig::load(path)?
                }
                None => {
                    info!("No scenario given, using the stock scenario");
                    LoadTestConfig::default()
                }
            };

            for (i, target) in config.targets.iter().enumerate() {
                info!("Target {}: GET {}", i + 1, target.url);
            }
            info!("Headers: {}", display_headers(&config.headers));

            let mut runner = LoadTestRunner::from_config(&config)?;

            let server = match metrics_addr {
                Some(addr) => {
                    let exporter =
                        Arc::new(PrometheusExporter::new(runner.metrics(), runner.pool_stats())?);
                    let listener = tokio::net::TcpListener::bind(addr).await?;
                    Some(tokio::spawn(exporter.serve(listener)))
                }
                None => None,
            };

            let summary = runner.run_until(shutdown::ctrl_c()).await;
            summary.print_report();

            let thresholds = summary.check_thresholds(&config.thresholds);
            thresholds.print_report();

            if let Some(path) = output {
                summary.write_json(&path)?;
            }

            if let Some(server) = server {
                server.abort();
            }

            if !thresholds.passes {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
