//! marketflow CLI: run marketing workflows against the built-in agents.
//!
//! Reuses the same core orchestration logic (marketflow-core) that backs the
//! dashboard API.

use clap::{Parser, Subcommand};
use marketflow_cli::commands;
use marketflow_cli::commands::workflow::ApprovalMode;

/// marketflow CLI: Marketing workflow orchestration
#[derive(Parser)]
#[command(name = "marketflow", version, about = "marketflow CLI: Marketing workflow orchestration")]
pub struct Cli {
    /// Path to an orchestrator config file (YAML or JSON)
    #[arg(long, env = "MARKETFLOW_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run or validate workflow definitions
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Inspect registered agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Send inter-agent messages
    Message {
        #[command(subcommand)]
        action: MessageAction,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Run a workflow file and print the final run
    Run {
        /// Path to the workflow definition (.json, .yaml or .yml)
        file: String,
        /// Run input as JSON
        #[arg(long, default_value = "{}")]
        input: String,
        /// Approve approval steps automatically
        #[arg(long)]
        auto_approve: bool,
        /// Answer yes to every approval prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Validate a workflow file without running it
    Validate {
        file: String,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// List registered agents and their tools
    List,
}

#[derive(Subcommand)]
enum MessageAction {
    /// Send a message and report how the dispatcher routed it
    Send {
        /// Sender agent id
        #[arg(long)]
        from: String,
        /// Target category (content, social, email, seo, analytics) or "orchestrator"
        #[arg(long)]
        to: String,
        /// Message type: request, response, event, or error
        #[arg(long = "type", default_value = "request")]
        message_type: String,
        /// Payload as JSON
        #[arg(long, default_value = "{}")]
        payload: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketflow_core=warn,marketflow_cli=info".into()),
        )
        .init();

    let result = if let Some(command) = cli.command {
        match command {
            Commands::Workflow { action } => match action {
                WorkflowAction::Run {
                    file,
                    input,
                    auto_approve,
                    yes,
                } => {
                    let setup = commands::load_config(cli.config.as_deref(), |config| {
                        if auto_approve {
                            config.auto_approve = true;
                        }
                    })
                    .and_then(|config| {
                        let input = commands::parse_value(&input, "input")?;
                        Ok((commands::init_orchestrator(config), input))
                    });
                    match setup {
                        Ok((orchestrator, input)) => {
                            let mode = if yes {
                                ApprovalMode::AssumeYes
                            } else {
                                ApprovalMode::Prompt
                            };
                            commands::workflow::run(&orchestrator, &file, input, mode).await
                        }
                        Err(e) => Err(e),
                    }
                }
                WorkflowAction::Validate { file } => commands::workflow::validate(&file).await,
            },

            Commands::Agent { action } => match commands::load_config(cli.config.as_deref(), |_| {}) {
                Ok(config) => {
                    let orchestrator = commands::init_orchestrator(config);
                    match action {
                        AgentAction::List => commands::agent::list(&orchestrator).await,
                    }
                }
                Err(e) => Err(e),
            },

            Commands::Message { action } => match action {
                MessageAction::Send {
                    from,
                    to,
                    message_type,
                    payload,
                } => {
                    let setup = commands::load_config(cli.config.as_deref(), |_| {}).and_then(|config| {
                        let payload = commands::parse_value(&payload, "payload")?;
                        Ok((commands::init_orchestrator(config), payload))
                    });
                    match setup {
                        Ok((orchestrator, payload)) => {
                            commands::message::run(&orchestrator, &from, &to, &message_type, payload)
                                .await
                        }
                        Err(e) => Err(e),
                    }
                }
            },
        }
    } else {
        // No subcommand: show help
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        println!();
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
