//! Chorus Control - CLI client for chorusd
//!
//! Sends prompts to the daemon and prints the answer, streamed or whole.

mod client;
mod output;

use anyhow::{anyhow, Result};
use chorus_common::{AnswerRequest, Mode, SessionOutcome, StreamFrame, DEFAULT_DAEMON_URL};
use clap::{Parser, Subcommand};
use client::DaemonClient;

#[derive(Parser)]
#[command(name = "chorusctl")]
#[command(about = "Ask several models at once through chorusd", long_about = None)]
#[command(version)]
struct Cli {
    /// Daemon base URL
    #[arg(long, global = true, default_value = DEFAULT_DAEMON_URL)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question
    Ask {
        /// The prompt; multiple words are joined with spaces
        #[arg(required = true)]
        prompt: Vec<String>,

        /// Selection mode
        #[arg(long, default_value = "fast", value_parser = ["fast", "quality"])]
        mode: String,

        /// Wait for the whole answer instead of streaming it
        #[arg(long)]
        no_stream: bool,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show daemon health
    Health,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = DaemonClient::new(&cli.url)?;

    match cli.command {
        Commands::Ask {
            prompt,
            mode,
            no_stream,
            json,
        } => {
            let request = AnswerRequest::new(prompt.join(" "), Mode::from_request(Some(&mode)));
            if no_stream {
                ask_whole(&client, &request, json).await
            } else {
                ask_streaming(&client, &request, json).await
            }
        }
        Commands::Health => {
            let health = client.health().await?;
            output::print_health(&health);
            Ok(())
        }
    }
}

async fn ask_whole(client: &DaemonClient, request: &AnswerRequest, json: bool) -> Result<()> {
    let answer = client.answer(request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        output::print_answer(&answer);
    }
    Ok(())
}

async fn ask_streaming(client: &DaemonClient, request: &AnswerRequest, json: bool) -> Result<()> {
    let mut ends_with_newline = true;

    let outcome = client
        .answer_stream(request, |frame| match frame {
            StreamFrame::Status { text } if !json => output::print_status(text),
            StreamFrame::Delta { text } if !json => {
                output::print_fragment(text);
                ends_with_newline = text.ends_with('\n');
            }
            _ => {}
        })
        .await?;

    match outcome {
        SessionOutcome::Answer(meta) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&meta)?);
            } else {
                if !ends_with_newline {
                    println!();
                }
                output::print_meta(&meta);
            }
            Ok(())
        }
        SessionOutcome::Failed(message) => Err(anyhow!(message)),
    }
}
