use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "faultline-cli")]
#[command(about = "Query a faultline aggregator", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:7070")]
    url: String,

    /// Bearer key for protected endpoints.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Worst state per dependency across all reporting instances
    Status,
    /// List reporting instances
    Instances,
    /// Latest snapshot of the aggregator's own breakers
    Snapshot,
    /// Force a breaker on the aggregator process back to Closed
    Reset {
        /// Dependency name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    let res = match &cli.command {
        Commands::Status => client.get(format!("{}/v1/status", base)),
        Commands::Instances => client.get(format!("{}/v1/instances", base)),
        Commands::Snapshot => client.get(format!("{}/v1/snapshot", base)),
        Commands::Reset { name } => client.post(format!("{}/v1/breakers/{}/reset", base, name)),
    }
    .headers(headers)
    .send()
    .await?;

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: aggregator returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        std::process::exit(1);
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }

    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
