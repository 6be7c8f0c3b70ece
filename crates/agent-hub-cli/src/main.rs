//! Command-line front end for the agent hub: list agents, stream runs and
//! chat with uploaded documents.

use std::path::PathBuf;
use std::sync::Arc;

use agent_hub::prelude::*;
use agent_hub::{OutputKind, init_observability};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "agent-hub", version, about, long_about = None)]
struct Cli {
    /// Backend base URL; overrides AGENT_HUB_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List agents with their tools
    Agents,
    /// Show prompt suggestions matching a query
    Suggest {
        #[arg(long)]
        agent: AgentKind,
        query: String,
    },
    /// Stream one run and print its progress
    Run {
        #[arg(long)]
        agent: AgentKind,
        /// Product image to send with the prompt
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long)]
        prompt: String,
    },
    /// Upload documents to the document agent and ask questions
    Chat {
        #[arg(long = "document")]
        documents: Vec<PathBuf>,
        #[arg(long = "question")]
        questions: Vec<String>,
    },
}

/// Load `.env` from the crate directory, then from the working directory.
fn load_env() {
    let _ = dotenvy::from_path(concat!(env!("CARGO_MANIFEST_DIR"), "/.env"));
    dotenvy::dotenv().ok();
}

fn build_hub(base_url: Option<String>) -> Result<(AgentHub, mpsc::UnboundedReceiver<Notice>)> {
    let mut config = HubConfig::from_env()?;
    if let Some(base_url) = base_url {
        config = config.base_url(base_url);
    }
    let (tx, rx) = mpsc::unbounded_channel();
    let hub = AgentHub::builder()
        .config(config)
        .notifier(Arc::new(tx))
        .build()?;
    Ok((hub, rx))
}

fn spawn_notice_printer(mut notices: mpsc::UnboundedReceiver<Notice>) {
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Success => "ok",
                NoticeLevel::Error => "error",
            };
            eprintln!("[{tag}] {}: {}", notice.title, notice.description);
        }
    });
}

fn badge(status: ToolStatus) -> &'static str {
    match status {
        ToolStatus::Idle => "idle",
        ToolStatus::Running => "running",
        ToolStatus::Completed => "done",
        ToolStatus::Failed => "failed",
    }
}

fn print_agents() {
    for agent in AgentKind::ALL {
        println!("{} ({})", agent.display_name(), agent.id());
        println!("  {}", agent.description());
        println!("  {}: {}", agent.prompt_label(), agent.prompt_placeholder());
        for tool in agent.tools() {
            println!("  - {} [{}]", tool.display_name, tool.name);
        }
    }
}

async fn run_agent(
    hub: &AgentHub,
    agent: AgentKind,
    image: Option<PathBuf>,
    prompt: String,
) -> Result<()> {
    hub.select_agent(Some(agent));
    let mut request = RunRequest::builder().prompt(prompt);
    if let Some(path) = image {
        let bytes = std::fs::read(&path)
            .with_context(|| format!("failed to read image {}", path.display()))?;
        request = request.image(bytes);
    }

    let mut updates = hub.runs().subscribe();
    let ticket = hub.run(request)?;
    let generation = ticket.generation();
    let printer = tokio::spawn(async move {
        let mut printed = 0;
        let mut tools: Vec<ToolState> = Vec::new();
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if state.generation != generation {
                continue;
            }
            for line in state.log.get(printed..).unwrap_or_default() {
                println!("  {line}");
            }
            printed = state.log.len();
            if state.tools != tools {
                let line = state
                    .tools
                    .iter()
                    .map(|t| format!("{}: {}", t.descriptor.display_name, badge(t.status)))
                    .collect::<Vec<_>>()
                    .join(" | ");
                if !line.is_empty() {
                    println!("  [{line}]");
                }
                tools = state.tools;
            }
            if state.status.is_terminal() {
                break;
            }
        }
    });

    let state = ticket.wait().await;
    let _ = printer.await;

    let result = state.result.unwrap_or_default();
    match state.status {
        RunStatus::Completed => {
            match agent.output_kind() {
                OutputKind::ImageUrl => println!("\nImage: {result}"),
                _ => println!("\n{result}"),
            }
            Ok(())
        }
        _ => bail!("run failed: {result}"),
    }
}

async fn chat(hub: &AgentHub, documents: Vec<PathBuf>, questions: Vec<String>) -> Result<()> {
    hub.select_agent(Some(AgentKind::DocumentQa));
    let session = hub.chat();
    for path in documents {
        let bytes = std::fs::read(&path)
            .with_context(|| format!("failed to read document {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        session.upload_document(Document::new(name, bytes)).await?;
    }
    for question in questions {
        println!("> {question}");
        let reply = session.send_message(&question).await?;
        println!("{reply}\n");
    }
    tracing::debug!(messages = session.snapshot().messages.len(), "chat finished");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_observability();
    let cli = Cli::parse();

    match cli.command {
        Commands::Agents => print_agents(),
        Commands::Suggest { agent, query } => {
            for suggestion in agent.suggestions(&query) {
                println!("{suggestion}");
            }
        }
        Commands::Run {
            agent,
            image,
            prompt,
        } => {
            let (hub, notices) = build_hub(cli.base_url)?;
            spawn_notice_printer(notices);
            run_agent(&hub, agent, image, prompt).await?;
        }
        Commands::Chat {
            documents,
            questions,
        } => {
            let (hub, notices) = build_hub(cli.base_url)?;
            spawn_notice_printer(notices);
            chat(&hub, documents, questions).await?;
        }
    }
    Ok(())
}
