//! Findoc CLI - submit documents for analysis and run the pipeline locally

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use findoc_core::domain::DEFAULT_QUERY;
use findoc_core::port::{AnalysisPipeline, AnalysisRequest};
use findoc_infra_system::{
    assess_financial_risk, condense_financial_data, read_financial_document, PipelineSettings,
    SubprocessPipeline,
};
use serde::Deserialize;
use serde_json::json;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

#[derive(Parser)]
#[command(name = "findoc")]
#[command(about = "Financial document analyzer CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Intake server URL
    #[arg(long, env = "FINDOC_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a stored document for analysis
    Submit {
        /// Chat row that receives the status updates
        #[arg(long)]
        chat_id: String,

        /// Document id in the object store
        #[arg(long)]
        file_id: String,

        #[arg(long)]
        user_id: Option<String>,

        /// Analysis question
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Check that the intake server is up
    Health,

    /// Run the analysis pipeline on a local PDF and print the report
    RunLocal {
        /// PDF to analyze
        file: PathBuf,

        #[arg(short, long, default_value = DEFAULT_QUERY)]
        query: String,

        /// Pipeline executable
        #[arg(long, env = "FINDOC__PIPELINE__PROGRAM", default_value = "findoc-crew")]
        program: String,

        /// Extra pipeline argument (repeatable)
        #[arg(long = "arg")]
        args: Vec<String>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Document tools used by the analysis agents
    Tools {
        #[command(subcommand)]
        tool: ToolCommand,
    },
}

#[derive(Subcommand)]
enum ToolCommand {
    /// Extract the text of a PDF
    Read { file: PathBuf },

    /// Normalize and truncate text (file path or `-` for stdin)
    Condense { input: String },

    /// Risk assessment over text (file path or `-` for stdin)
    Risk { input: String },
}

#[derive(Deserialize, Tabled)]
struct SubmitReceipt {
    job_id: String,
    status: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

#[derive(Deserialize)]
struct HealthBody {
    status: String,
    version: String,
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

async fn submit(
    api_url: &str,
    chat_id: String,
    file_id: String,
    user_id: Option<String>,
    query: Option<String>,
) -> Result<SubmitReceipt> {
    let body = json!({
        "chat_id": chat_id,
        "file_id": file_id,
        "user_id": user_id,
        "query": query,
    });

    let response = reqwest::Client::new()
        .post(endpoint(api_url, "analyze"))
        .json(&body)
        .send()
        .await
        .context("Failed to connect to intake server")?;

    let status = response.status();
    if !status.is_success() {
        let error: ErrorBody = response
            .json()
            .await
            .with_context(|| format!("Intake server returned {}", status))?;
        anyhow::bail!("{} ({}): {}", error.error, status.as_u16(), error.message);
    }

    response.json().await.context("Failed to parse response")
}

fn read_text(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))
}

async fn run_local(
    file: &Path,
    query: String,
    program: String,
    args: Vec<String>,
    timeout_secs: Option<u64>,
) -> Result<String> {
    let file = file
        .canonicalize()
        .with_context(|| format!("{} not found", file.display()))?;

    let pipeline = SubprocessPipeline::new(
        PipelineSettings::new(program)
            .with_args(args)
            .with_timeout(timeout_secs.map(Duration::from_secs)),
    );

    let report = pipeline
        .analyze(AnalysisRequest {
            query,
            file_path: file.display().to_string(),
        })
        .await?;
    Ok(report.raw)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            chat_id,
            file_id,
            user_id,
            query,
        } => {
            let receipt = submit(&cli.api_url, chat_id, file_id, user_id, query).await?;

            println!("{}", "✓ Analysis queued".green().bold());
            println!();
            println!("{}", Table::new(vec![receipt]));
        }

        Commands::Health => {
            let result = async {
                reqwest::get(endpoint(&cli.api_url, "health"))
                    .await?
                    .error_for_status()?
                    .json::<HealthBody>()
                    .await
            }
            .await;

            match result {
                Ok(health) => {
                    println!("  {} {}", "URL:".bold(), cli.api_url);
                    println!("  {} {}", "Status:".bold(), health.status.to_uppercase().green());
                    println!("  {} {}", "Version:".bold(), health.version);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "OFFLINE".red());
                    println!("  {} {}", "Error:".bold(), e);
                    std::process::exit(1);
                }
            }
        }

        Commands::RunLocal {
            file,
            query,
            program,
            args,
            timeout_secs,
        } => {
            eprintln!("{}", format!("Analyzing {}...", file.display()).cyan().bold());
            match run_local(&file, query, program, args, timeout_secs).await {
                Ok(report) => println!("{}", report),
                Err(e) => {
                    eprintln!("{} {}", "✗".red(), e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Tools { tool } => match tool {
            ToolCommand::Read { file } => println!("{}", read_financial_document(&file)),
            ToolCommand::Condense { input } => {
                println!("{}", condense_financial_data(&read_text(&input)?))
            }
            ToolCommand::Risk { input } => {
                println!("{}", assess_financial_risk(&read_text(&input)?))
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_endpoint_joins_paths() {
        assert_eq!(endpoint("http://h:8000/", "analyze"), "http://h:8000/analyze");
        assert_eq!(endpoint("http://h:8000", "health"), "http://h:8000/health");
    }

    #[test]
    fn test_parse_submit() {
        let cli = Cli::try_parse_from([
            "findoc", "submit", "--chat-id", "c1", "--file-id", "f1", "-q", "test",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit {
                chat_id,
                file_id,
                user_id,
                query,
            } => {
                assert_eq!(chat_id, "c1");
                assert_eq!(file_id, "f1");
                assert!(user_id.is_none());
                assert_eq!(query.as_deref(), Some("test"));
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn test_parse_tools_condense() {
        let cli = Cli::try_parse_from(["findoc", "tools", "condense", "-"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Tools {
                tool: ToolCommand::Condense { .. }
            }
        ));
    }
}
