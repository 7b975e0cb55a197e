#![cfg(not(tarpaulin_include))]

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tabsheet::{Document, display_label};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Source {
    Drive,
    Local,
}

impl Source {
    fn endpoint(self) -> &'static str {
        match self {
            Source::Drive => "/api/driveData",
            Source::Local => "/api/saveData",
        }
    }
}

#[derive(Parser)]
#[command(name = "tabsheet-cli", about = "Inspect and transfer documents on a tabsheet server")]
struct Cli {
    /// Base URL of the server
    #[arg(long, env = "SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Which stored document to talk to
    #[arg(long, value_enum, default_value_t = Source::Drive)]
    source: Source,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every tab with its columns, row count and totals
    Show,
    /// Download the document into a file
    Pull { file: PathBuf },
    /// Upload a file as the new document
    Push { file: PathBuf },
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<Document, Box<dyn std::error::Error>> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(format!("{url} returned {status}: {body}").into());
    }
    Ok(response.json().await?)
}

fn show(document: &Document) {
    if document.is_empty() {
        println!("(no tabs)");
        return;
    }
    for name in document.tab_names() {
        let Some(tab) = document.tab(name) else { continue };
        println!("{} [{}] - {} row(s)", display_label(name), name, tab.len());
        println!("  columns: {}", tab.columns().join(", "));
        if let Ok(totals) = document.column_totals(name) {
            for total in totals.iter().filter(|t| t.total != 0.0) {
                println!("  total {}: {}", display_label(&total.column), total.total);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let url = format!("{}{}", cli.server.trim_end_matches('/'), cli.source.endpoint());
    let client = reqwest::Client::new();

    match cli.command {
        Command::Show => show(&fetch(&client, &url).await?),
        Command::Pull { file } => {
            let document = fetch(&client, &url).await?;
            std::fs::write(&file, serde_json::to_string_pretty(&document)?)?;
            println!("Wrote {} tab(s) to {}", document.len(), file.display());
        }
        Command::Push { file } => {
            let content = std::fs::read_to_string(&file)?;
            let document: Document = serde_json::from_str(&content)?;
            let response = client.post(&url).json(&document).send().await?;
            let status = response.status();
            let body: serde_json::Value = response.json().await?;
            if !status.is_success() {
                return Err(format!("{url} returned {status}: {body}").into());
            }
            println!("{}", body["message"].as_str().unwrap_or("Saved"));
        }
    }

    Ok(())
}
