use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use multiquery_core_sdk::prelude::*;

/**
 * \brief CLI entry: send one prompt several times and collect every answer.
 */
#[derive(Parser, Debug)]
#[command(name = "multiquery", version, about = "Send one prompt N times and export the answers")]
struct Cli {
    /// Override the API base URL (MULTIQUERY_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Write the file event log under ./logs
    #[arg(long, global = true, default_value_t = false)]
    telemetry: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief Validate an API key without sending any prompt.
     */
    Check {
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: String,
    },

    /**
     * \brief Validate the key, then send the prompt `count` times and export the results.
     */
    Run {
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: String,
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=20))]
        count: u32,
        #[arg(long, default_value = "gpt-3.5-turbo")]
        model: Model,
        #[arg(long, default_value = export::EXPORT_FILE_NAME)]
        out: PathBuf,
        /// Print responses cut to 100 characters
        #[arg(long, default_value_t = false)]
        preview: bool,
    },

    /**
     * \brief Start the local HTTP service.
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5173")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(base) = cli.api_base {
        config = config.with_api_base(base);
    }
    if cli.telemetry {
        config.telemetry_enabled = true;
    }
    telemetry::set_enabled(config.telemetry_enabled);

    match cli.command {
        Commands::Check { api_key } => {
            let api = OpenAiClient::from_config(&config).context("build http client failed")?;
            let mut session = Session::new();
            gate::validate(&api, &mut session, &api_key)
                .await
                .context("API key validation failed")?;
            println!("API key accepted by {}", api.api_base());
        }
        Commands::Run {
            api_key,
            prompt,
            count,
            model,
            out,
            preview,
        } => {
            let request = BatchRequest::new(prompt, model, count)?;
            let api = OpenAiClient::from_config(&config).context("build http client failed")?;
            let mut session = Session::new();
            gate::validate(&api, &mut session, &api_key)
                .await
                .context("API key validation failed")?;

            println!("Sending {} requests to {}...", request.count(), request.model());
            let summary = dispatch::run_batch(&mut session, &api, &request, print_event)
                .await
                .context("batch refused")?;
            println!(
                "{} requests sent, {} failed",
                summary.attempts, summary.failures
            );

            let records = if preview {
                export::preview(session.results().records())
            } else {
                session.results().records().to_vec()
            };
            print_table(&records);

            export::write_csv_file(session.results().records(), &out)
                .with_context(|| format!("write {} failed", out.display()))?;
            println!("Saved {} rows to {}", session.results().len(), out.display());
        }
        Commands::Serve { addr } => {
            server::run(&addr, &config).await?;
        }
    }

    Ok(())
}

fn print_event(event: DispatchEvent) {
    match &event {
        DispatchEvent::Progress {
            completed,
            count,
            notice,
        } => {
            if let Some(notice) = notice {
                eprintln!("Error on request {}: {}", completed, notice);
            }
            println!(
                "[{}/{}] {:.0}%",
                completed,
                count,
                event.fraction().unwrap_or(0.0) * 100.0
            );
        }
        DispatchEvent::Pausing { delay } => {
            println!("Pausing {:.1}s before the next request...", delay.as_secs_f64());
        }
    }
}

fn print_table(records: &[ResultRecord]) {
    println!("{:>3} | {:<14} | response", "#", "model");
    for (i, record) in records.iter().enumerate() {
        println!(
            "{:>3} | {:<14} | {}",
            i + 1,
            record.model.as_str(),
            record.response.replace('\n', " ")
        );
    }
}
