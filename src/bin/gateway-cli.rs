use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the RPC gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List services with their instances and breaker state
    Services {
        /// Show a single service
        name: Option<String>,
    },
    /// Call a method through the gateway
    Call {
        service: String,
        method: String,
        /// JSON request body
        #[arg(default_value = "{}")]
        body: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)).send().await?,
        Commands::Services { name: None } => {
            client.get(format!("{}/admin/services", cli.url)).send().await?
        }
        Commands::Services { name: Some(name) } => {
            client
                .get(format!("{}/admin/services/{}", cli.url, name))
                .send()
                .await?
        }
        Commands::Call {
            service,
            method,
            body,
        } => {
            let body: Value = serde_json::from_str(&body)?;
            client
                .post(format!("{}/call/{}/{}", cli.url, service, method))
                .json(&body)
                .send()
                .await?
        }
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        eprintln!("{}", rendered);
        std::process::exit(1);
    }
    println!("{}", rendered);
    Ok(())
}
