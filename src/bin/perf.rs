//! CMQ performance tool
//!
//! Usage:
//!   cmq-perf -u https://cmq-gz.public.tencenttdmq.com -i AKID... -k xxx -c cases.json -s 1
//!   cmq-perf --mock -c cases.json --json

use anyhow::{bail, Context, Result};
use clap::Parser;

use cmq_tdmq::bench::{
    load_cases, BenchmarkReport, CaseRunner, MockCmqServer, MockServerConfig, PerfOptions,
};
use cmq_tdmq::config::{init_logging, ConnectionArgs};
use cmq_tdmq::CmqClient;

#[derive(Parser)]
#[command(name = "cmq-perf", version)]
#[command(about = "Load generator for TDMQ CMQ gateways")]
struct Cli {
    /// URI(s), repeat '-u' to spread load across several gateways
    #[arg(short = 'u', long = "uri", env = "CMQ_URI", value_delimiter = ',')]
    uris: Vec<String>,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Test case file
    #[arg(short = 'c', long = "cases", default_value = "cases.json")]
    cases: String,

    /// Show client debug info
    #[arg(short = 'd', long)]
    debug: bool,

    /// Show error responses
    #[arg(short = 'e', long = "show-errors")]
    show_errors: bool,

    /// Show current TPS every N seconds
    #[arg(short = 's', long = "show-tps", default_value = "0")]
    show_tps: u64,

    /// Only calculate latency of succeeded requests
    #[arg(long = "succ-only")]
    succ_only: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Run against an in-process mock gateway
    #[arg(long)]
    mock: bool,

    /// Mock gateway latency in milliseconds
    #[arg(long, default_value = "0")]
    mock_latency: u64,

    /// Mock gateway error rate (0.0 to 1.0)
    #[arg(long, default_value = "0.0")]
    mock_error_rate: f64,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let mut cli = Cli::parse();
    init_logging(&cli.log_level, cli.debug);

    let cases = load_cases(&cli.cases)?;

    // Keep the mock alive until every case has run
    let mut mock = None;
    if cli.mock {
        let mut server = MockCmqServer::new(MockServerConfig {
            latency_ms: cli.mock_latency,
            error_rate: cli.mock_error_rate,
            secret_key: Some(cli.connection.secret_key.clone()).filter(|k| !k.is_empty()),
            ..Default::default()
        });
        let port = server.start().await?;
        tracing::info!("Mock CMQ server started on port {}", port);
        cli.uris = vec![server.url()];
        if cli.connection.secret_id.is_empty() || cli.connection.secret_key.is_empty() {
            cli.connection.secret_id = "mock-secret-id".to_string();
            cli.connection.secret_key = "mock-secret-key".to_string();
        }
        mock = Some(server);
    }

    if cli.uris.is_empty() {
        bail!("no uri given, use -u <uri> or --mock");
    }

    let mut clients = Vec::with_capacity(cli.uris.len());
    for uri in &cli.uris {
        let config = cli
            .connection
            .client_config(uri)
            .with_context(|| format!("invalid client configuration for {}", uri))?;
        clients.push(CmqClient::new(config).context("new TDMQ-CMQ client")?);
    }
    tracing::info!(
        clients = clients.len(),
        cases = cases.len(),
        "Starting performance run"
    );

    let runner = CaseRunner::new(
        clients,
        PerfOptions {
            show_errors: cli.show_errors,
            show_tps: cli.show_tps,
            succ_only: cli.succ_only,
        },
    )?;
    let report: BenchmarkReport = runner.run_all(&cases).await;

    if let Some(mut server) = mock {
        server.stop();
    }

    if report.is_empty() {
        tracing::warn!("No case produced results");
        return Ok(());
    }
    if cli.json {
        println!("{}", report.to_json());
    } else {
        report.print_table();
    }
    Ok(())
}
