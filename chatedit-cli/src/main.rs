//! # chatedit CLI
//!
//! Command-line interface for chatting with a model that edits objects
//! through code.
//!
//! Usage:
//!   chatedit chat [--attach vector.json]
//!   chatedit exec <file.py> [--attach vector.json]
//!   chatedit manifest
//!   chatedit config [--config chatedit.json]
//!
//! Examples:
//!   OPENAI_API_KEY=... chatedit chat
//!   chatedit chat --base-url http://localhost:11434/v1 --model llama3
//!   chatedit exec demos/scale.py --attach demos/vector.json

mod calculator;

use anyhow::Context as _;
use calculator::CalculatorProvider;
use chatedit_agent::{
    ChatCycle, Config, ContextProvider, ModelConfig, OpenAiModel, Orchestrator, OtcStrategy,
};
use chatedit_runtime::{assign_message, execute, Attachment, Message, Value};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatedit")]
#[command(author, version, about = "chatedit - let a model edit your objects through code")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file with cycle limits
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log every statement and model call
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat session
    Chat {
        /// Model name
        #[arg(short, long, default_value = "gpt-4o-mini")]
        model: String,

        /// OpenAI-compatible endpoint
        #[arg(long)]
        base_url: Option<String>,

        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// JSON objects attached to the first message
        #[arg(short, long)]
        attach: Vec<PathBuf>,
    },
    /// Run a code file against the calculator namespace
    Exec {
        #[arg(required = true)]
        file: PathBuf,

        /// JSON objects bound into the namespace before running
        #[arg(short, long)]
        attach: Vec<PathBuf>,
    },
    /// Show the functions available to generated code
    Manifest,
    /// Show the effective configuration
    Config,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None => Ok(Config::default()),
    }
}

fn load_attachments(
    provider: &CalculatorProvider,
    paths: &[PathBuf],
) -> anyhow::Result<Vec<Attachment>> {
    paths
        .iter()
        .map(|path| {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let json: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            let mut attachment = provider.attach(Value::from(json));
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                attachment = attachment.with_filename(name);
            }
            Ok(attachment)
        })
        .collect()
}

fn print_response(response: &Message) {
    println!("{}", response.text);
    for attachment in &response.attachments {
        let label = attachment.filename().unwrap_or("attachment");
        let payload = serde_json::to_string_pretty(&attachment.snapshot().to_json())
            .unwrap_or_default();
        println!("  [{}] {}", label, payload);
    }
}

/// Diagnostics of a chat cycle that ended without a response
fn print_diagnostics(cycle: &ChatCycle) {
    for (i, edit) in cycle.edit_cycles.iter().enumerate() {
        if let Some(error) = &edit.prompting.error {
            eprintln!("  {:2}. model error: {}", i + 1, error.message);
            continue;
        }
        match &edit.execution {
            None => eprintln!(
                "  {:2}. no code after {} attempts",
                i + 1,
                edit.prompting.attempts()
            ),
            Some(execution) => eprintln!(
                "  {:2}. {} statements -> {}",
                i + 1,
                execution.statements.len(),
                execution.outcome.name()
            ),
        }
    }
}

fn help_commands() {
    println!("Commands:");
    println!("  :history   dump the conversation as JSON");
    println!("  :pop       forget the last exchange");
    println!("  :clear     start over");
    println!("  :quit      leave");
}

async fn run_chat(
    config: Config,
    model: String,
    base_url: Option<String>,
    api_key: Option<String>,
    attach: Vec<PathBuf>,
    verbose: bool,
) -> anyhow::Result<()> {
    let provider = CalculatorProvider::new()?;
    let mut pending = load_attachments(&provider, &attach)?;

    let mut model_config = match base_url {
        Some(url) => ModelConfig::local(url, model),
        None => ModelConfig::default().with_model(model),
    };
    if let Some(key) = api_key {
        model_config = model_config.with_api_key(key);
    }
    let model = OpenAiModel::new(model_config)?;

    let mut orchestrator =
        Orchestrator::new(provider, model, OtcStrategy::new()).with_config(config);

    println!("chatedit - type a request, :help for commands\n");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":help" => help_commands(),
            ":history" => println!("{}", serde_json::to_string_pretty(orchestrator.history())?),
            ":pop" => {
                let popped = orchestrator.pop_history();
                if popped.is_some() {
                    println!("forgot last exchange");
                } else {
                    println!("history is empty");
                }
            }
            ":clear" => {
                orchestrator.clear_history();
                println!("history cleared");
            }
            text => {
                let message = Message::new(text).with_attachments(std::mem::take(&mut pending));
                match orchestrator.send(message).await {
                    Ok(Some(response)) => print_response(&response),
                    Ok(None) => {
                        eprintln!("(no response)");
                        if verbose {
                            if let Some(cycle) = orchestrator.history().last() {
                                print_diagnostics(cycle);
                            }
                        }
                    }
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
        }
        println!();
    }
    Ok(())
}

async fn run_exec(file: &Path, attach: &[PathBuf]) -> anyhow::Result<()> {
    let code = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;

    let provider = CalculatorProvider::new()?;
    let mut namespace = provider.get_context().namespace;
    let attachments = load_attachments(&provider, attach)?;
    let bound = assign_message(&Message::new("").with_attachments(attachments), &mut namespace)?;
    for binding in &bound.attachments {
        debug!(path = %binding.path, type_name = %binding.type_name, "bound attachment");
    }

    let result = execute(&code, &mut namespace).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Chat {
            model,
            base_url,
            api_key,
            attach,
        } => run_chat(config, model, base_url, api_key, attach, cli.verbose).await,
        Commands::Exec { file, attach } => run_exec(&file, &attach).await,
        Commands::Manifest => {
            println!("{}", CalculatorProvider::new()?.manifest());
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
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
    fn test_parse_exec() {
        let cli =
            Cli::try_parse_from(["chatedit", "exec", "run.py", "--attach", "v.json", "-v"])
                .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Exec { file, attach } => {
                assert_eq!(file, PathBuf::from("run.py"));
                assert_eq!(attach, vec![PathBuf::from("v.json")]);
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_load_attachments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"__type__": "Vector", "x": 3, "y": 4}}"#).unwrap();

        let provider = CalculatorProvider::new().unwrap();
        let attachments = load_attachments(&provider, &[file.path().to_path_buf()]).unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].type_name(), "Vector");
        assert!(attachments[0].is_original());
        assert!(attachments[0].filename().is_some());
        assert_eq!(attachments[0].attr_paths(), ["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_load_config_defaults() {
        assert_eq!(load_config(None).unwrap(), Config::default());
    }
}
