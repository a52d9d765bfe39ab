// Manual test client for the processing endpoint.
//
// Uploads a zip of XML documents, saves the classified archive the server
// answers with, and prints the per-category counts from the response
// headers. Blocking reqwest; no Tokio runtime required.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

#[derive(Parser)]
#[command(name = "monxml-client")]
#[command(about = "Send a zip of NF-e XMLs to the processing endpoint")]
#[command(version)]
struct Cli {
    /// Zip file to upload
    input: PathBuf,

    /// Processing endpoint URL
    #[arg(long, default_value = "http://127.0.0.1:8000/processar-zip")]
    url: String,

    /// Where to save the processed archive
    #[arg(long, default_value = "xmls_processados.zip")]
    output: PathBuf,
}

/// Error type for client operations.
#[derive(Debug)]
enum ClientError {
    /// Local file I/O error
    Io(String),
    /// Network error
    Network(String),
    /// Server answered with a non-success status
    Http(u16, String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Io(msg) => write!(f, "I/O error: {}", msg),
            ClientError::Network(msg) => write!(f, "Network error: {}", msg),
            ClientError::Http(code, msg) => write!(f, "HTTP {}: {}", code, msg),
        }
    }
}

impl std::error::Error for ClientError {}

/// Counts reported by the server in its response headers.
#[derive(Debug, Default, PartialEq, Eq)]
struct Counts {
    approved: u64,
    contingency: u64,
    rejected: u64,
}

fn run(cli: &Cli) -> Result<Counts, ClientError> {
    let payload = fs::read(&cli.input).map_err(|e| {
        ClientError::Io(format!("cannot read {}: {}", cli.input.display(), e))
    })?;

    let client = reqwest::blocking::Client::builder()
        .user_agent(format!("monxml-client/{}", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(300))
        .build()
        .expect("Failed to create HTTP client");

    let response = client
        .post(&cli.url)
        .header("Content-Type", "application/zip")
        .body(payload)
        .send()
        .map_err(|e| ClientError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(ClientError::Http(status.as_u16(), body));
    }

    let counts = Counts {
        approved: count_header(&response, "X-Count-Approved"),
        contingency: count_header(&response, "X-Count-Contingency"),
        rejected: count_header(&response, "X-Count-Rejected"),
    };

    let archive = response
        .bytes()
        .map_err(|e| ClientError::Network(e.to_string()))?;
    fs::write(&cli.output, &archive).map_err(|e| {
        ClientError::Io(format!("cannot write {}: {}", cli.output.display(), e))
    })?;

    Ok(counts)
}

/// A count header; absent or unparseable reads as zero.
fn count_header(response: &reqwest::blocking::Response, name: &str) -> u64 {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(counts) => {
            println!("Processamento concluído. Arquivo salvo em {}", cli.output.display());
            println!(
                "Aprovados: {}  Contingência: {}  Rejeitados: {}",
                counts.approved, counts.contingency, counts.rejected
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
