//! # coexnet - Gene Coexpression Network Search
//!
//! The main binary for coexnet.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  apps/coexnet (THE BINARY)               │
//! │                                                          │
//! │  ┌─────────────┐    ┌──────────────┐    ┌────────────┐  │
//! │  │    CLI      │───▶│ Orchestrator │───▶│  Backend   │  │
//! │  │   (clap)    │    │   (tokio)    │    │ (reqwest)  │  │
//! │  └─────────────┘    └──────┬───────┘    └────────────┘  │
//! │                            ▼                             │
//! │                    ┌───────────────┐                     │
//! │                    │ coexnet-core  │                     │
//! │                    │  (THE LOGIC)  │                     │
//! │                    └───────────────┘                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Coexpression search for three genes over two experiments
//! coexnet search -g 1,2,3 -e 10,11 --mode coex
//!
//! # Differential expression with chosen factors
//! coexnet search -g 1,2 -e 10 --mode diff-ex --factor 10=3
//!
//! # Offline tools
//! coexnet stringency -d 400
//! coexnet link --parse "?g=3,4&s=2&t=9&ees=10,11&q"
//! coexnet filter -i result.json -s 5
//! ```

use clap::Parser;
use coexnet::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // COEXNET_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("COEXNET_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "coexnet=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  coexnet v{}
  Gene coexpression network search
"#,
        env!("CARGO_PKG_VERSION")
    );
}
