//! # chatgate CLI
//!
//! - `serve`: run the HTTP service in front of the completion API
//! - `ask`: send one question through the governor and print the answer
//!
//! Configuration comes from the environment (and `.env`); flags override it.

mod telemetry;

use anyhow::Context;
use chatgate::config::Config;
use chatgate::server::{self, AppState};
use chatgate::upstream::HttpClient;
use chatgate::ChatGovernor;
use clap::{Args, Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Outbound LLM call governor for a fan chat bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve POST /chat over HTTP
    Serve(ServeArgs),

    /// Answer a single question and exit
    Ask(AskArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind (default: SERVER_HOST or 0.0.0.0)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (default: SERVER_PORT or 3001)
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream model (default: OPENAI_MODEL or gpt-3.5-turbo)
    #[arg(short, long)]
    model: Option<String>,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Question to send
    #[arg(required = true)]
    query: String,

    /// Upstream model (default: OPENAI_MODEL or gpt-3.5-turbo)
    #[arg(short, long)]
    model: Option<String>,

    /// Print the answer as JSON, including the fallback flag
    #[arg(long)]
    json: bool,
}

fn build_governor(config: &Config, model: Option<String>) -> anyhow::Result<ChatGovernor<HttpClient>> {
    let mut governor_config = config.governor.clone();
    if let Some(model) = model {
        governor_config.model = model;
    }
    let client = HttpClient::new(&config.upstream).context("failed to create upstream client")?;
    let governor = ChatGovernor::new(client, governor_config).context("invalid governor configuration")?;
    if governor.state().keys.is_none() {
        info!("No API keys configured; answering with fallbacks only");
    }
    Ok(governor)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing_subscriber();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Serve(args) => {
            if let Some(host) = args.host {
                config.server.host = host;
            }
            if let Some(port) = args.port {
                config.server.port = port;
            }
            let governor = build_governor(&config, args.model)?;
            info!(model = governor.model(), "Starting chat governor");
            let state = AppState::new(governor).with_inbound_limit(config.server.inbound_requests_per_minute);
            server::serve(&config.server, state).await?;
        }
        Commands::Ask(args) => {
            let governor = build_governor(&config, args.model)?;
            let answer = governor.answer(&args.query).await;
            if args.json {
                let body = serde_json::json!({
                    "content": answer.text(),
                    "isFallback": answer.is_fallback(),
                    "reason": answer.fallback_reason().map(|reason| reason.as_str()),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("{}", answer.text());
            }
        }
    }

    Ok(())
}
