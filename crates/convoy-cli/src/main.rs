use anyhow::Result;
use clap::{Parser, Subcommand};
use convoy_core::config::{ConfigLoader, ConvoyConfig, McpCommand};
use convoy_core::team::{StdinInput, TeamEvent};
use convoy_core::tools::{
    McpToolFactory, RMCPClient, ResourceContent, ResourceTransport, ToolRegistry, ToolTransport, DEFAULT_MCP_URL,
};
use convoy_core::{AgentFactory, ConversationSession, Message, Role};
use log::LevelFilter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[clap(name = "convoy", author, version = "0.1.0", about = "Tool-calling conversations and team chat")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(
        long,
        short,
        default_value = "convoy.yaml",
        help = "Configuration file; when it does not exist Azure OpenAI settings are read from the environment"
    )]
    config: String,

    #[clap(long, short, help = "Overrides logging.level from the configuration")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the tools payload sent to the model
    Tools,
    /// Run one conversation against the configured tools
    Chat {
        #[clap(long, short, help = "First user message")]
        message: String,
    },
    /// Run one conversation against the tools of an MCP server
    Mcp {
        #[clap(flatten)]
        target: McpTarget,

        #[clap(long, short, help = "First user message")]
        message: String,
    },
    /// List an MCP server's tools, prompts and resources
    McpInfo {
        #[clap(flatten)]
        target: McpTarget,

        #[clap(long = "read", help = "Resource URI to read and print (repeatable)")]
        read: Vec<String>,

        #[clap(long, help = "Prompt to render and print")]
        prompt: Option<String>,

        #[clap(long = "prompt-arg", help = "Prompt argument as key=value (repeatable)")]
        prompt_args: Vec<String>,
    },
    /// Run the selector team chat, reading the user's turns from stdin
    Team {
        #[clap(long, help = "Task that opens the conversation")]
        task: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct McpTarget {
    #[clap(long, conflicts_with = "url", help = "Command that starts the MCP server over stdio")]
    server: Option<String>,

    #[clap(long = "arg", help = "Argument passed to the server command (repeatable)")]
    args: Vec<String>,

    #[clap(
        long,
        help = "Streamable HTTP endpoint; defaults to $MCP_SERVER_URL, then http://127.0.0.1:8080/mcp"
    )]
    url: Option<String>,

    #[clap(long, default_value_t = 30, help = "Seconds to wait for each MCP request")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).await?;
    init_logging(&config, cli.log_level.as_deref())?;
    log::info!("Configuration loaded from {}", cli.config);

    match cli.command {
        Commands::Tools => {
            let registry = AgentFactory::configure_tools(&config).await?;
            println!("{}", serde_json::to_string_pretty(&registry.to_openai_tools())?);
        }
        Commands::Chat { message } => {
            let mut session = AgentFactory::create_session(&config, message).await?;
            run_session(&mut session).await?;
        }
        Commands::Mcp { target, message } => {
            let client = connect_mcp(&target).await?;
            let transport: Arc<dyn ToolTransport> = Arc::new(client);

            let mut registry = ToolRegistry::new();
            let count = McpToolFactory::new(transport).register_all(&mut registry, &[]).await?;
            if count == 0 {
                anyhow::bail!("MCP server exposes no tools");
            }
            println!("MCP tools: {}", registry.names().join(", "));

            let llm = AgentFactory::configure_llm(&config)?;
            let mut session = ConversationSession::new(llm, Arc::new(registry), config.session.to_session_config(), message)
                .with_termination(config.termination.to_policy());
            run_session(&mut session).await?;
        }
        Commands::McpInfo {
            target,
            read,
            prompt,
            prompt_args,
        } => {
            let client = connect_mcp(&target).await?;
            print_mcp_info(&client, &read, prompt.as_deref(), &prompt_args).await?;
        }
        Commands::Team { task } => {
            let team = AgentFactory::create_team(&config, Arc::new(StdinInput::stdin())).await?;
            cancel_on_ctrl_c(team.cancellation_token());

            let task = task.unwrap_or_else(|| AgentFactory::team_task(&config));
            let (tx, mut rx) = mpsc::channel(64);
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    print_event(&event);
                }
            });

            let result = team.run_stream(task, tx).await;
            printer.await?;
            let result = result?;
            println!("\nStopped: {} ({} messages)", result.stop_reason, result.messages.len());
        }
    }

    Ok(())
}

async fn load_config(path: &str) -> Result<ConvoyConfig> {
    if Path::new(path).exists() {
        Ok(ConfigLoader::from_file(path).await?)
    } else {
        Ok(ConfigLoader::from_env()?)
    }
}

async fn connect_mcp(target: &McpTarget) -> Result<RMCPClient> {
    let timeout = Duration::from_secs(target.timeout);
    let client = match &target.server {
        Some(server) => {
            let command = McpCommand {
                run: server.clone(),
                args: target.args.clone(),
                ..Default::default()
            };
            RMCPClient::connect("cli", &command, timeout).await?
        }
        None => {
            let url = target
                .url
                .clone()
                .or_else(|| std::env::var("MCP_SERVER_URL").ok())
                .unwrap_or_else(|| DEFAULT_MCP_URL.to_string());
            RMCPClient::connect_url("cli", &url, timeout).await?
        }
    };
    if let Some(info) = client.server_info() {
        log::info!("Connected to MCP server: {}", info);
    }
    Ok(client)
}

async fn print_mcp_info(client: &RMCPClient, read: &[String], prompt: Option<&str>, prompt_args: &[String]) -> Result<()> {
    println!("Tools:");
    for tool in client.list_tools().await? {
        println!("  - {}: {}", tool.name, tool.description);
    }

    // Servers without prompt or resource support answer these with an error.
    match client.list_prompts().await {
        Ok(prompts) => {
            println!("Prompts:");
            for p in prompts {
                let args: Vec<&str> = p.arguments.iter().map(|a| a.name.as_str()).collect();
                println!("  - {}({}) {}", p.name, args.join(", "), p.description.unwrap_or_default());
            }
        }
        Err(e) => log::warn!("Listing prompts failed: {}", e),
    }
    match client.list_resources().await {
        Ok(resources) => {
            println!("Resources:");
            for r in resources {
                println!("  - {} ({})", r.uri, r.name);
            }
        }
        Err(e) => log::warn!("Listing resources failed: {}", e),
    }
    match client.list_resource_templates().await {
        Ok(templates) => {
            println!("Resource templates:");
            for t in templates {
                println!("  - {}", t);
            }
        }
        Err(e) => log::warn!("Listing resource templates failed: {}", e),
    }

    for uri in read {
        println!("\nReading {}:", uri);
        for content in client.read_resource(uri).await? {
            match content {
                ResourceContent::Text { text, mime_type, .. } => {
                    println!("  content: {} mime: {}", text, mime_type.unwrap_or_default())
                }
                ResourceContent::Blob { blob, mime_type, .. } => {
                    println!("  {} base64 bytes, mime: {}", blob.len(), mime_type.unwrap_or_default())
                }
            }
        }
    }

    if let Some(name) = prompt {
        let mut arguments = serde_json::Map::new();
        for pair in prompt_args {
            let Some((key, value)) = pair.split_once('=') else {
                anyhow::bail!("Prompt argument '{}' is not key=value", pair);
            };
            arguments.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        }
        let rendered = client.get_prompt(name, arguments).await?;
        println!("\nPrompt {}:", name);
        for message in &rendered.messages {
            print_message(message);
        }
    }
    Ok(())
}

fn init_logging(config: &ConvoyConfig, override_level: Option<&str>) -> Result<()> {
    let level = override_level.unwrap_or(&config.logging.level);
    let filter = level.parse().unwrap_or(LevelFilter::Info);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(filter);
    if let Some(path) = &config.logging.file {
        let log_file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    Ok(())
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

async fn run_session(session: &mut ConversationSession) -> Result<()> {
    cancel_on_ctrl_c(session.cancellation_token());
    let outcome = session.run().await?;

    for message in session.history() {
        print_message(message);
    }
    println!("\nStopped: {} after {} model calls", outcome.stop_reason, outcome.iterations);
    Ok(())
}

fn print_message(message: &Message) {
    let speaker = message.name.as_deref().unwrap_or(message.role.as_str());
    match message.role {
        Role::System => {}
        Role::Tool => println!(
            "[tool result {}] {}",
            message.tool_call_id.as_deref().unwrap_or("?"),
            message.content
        ),
        _ if message.has_tool_calls() => {
            for call in message.tool_calls() {
                println!("[{} calls {}] {}", speaker, call.name, call.raw_arguments);
            }
        }
        _ => println!("---------- {} ----------\n{}", speaker, message.content),
    }
}

fn print_event(event: &TeamEvent) {
    match event {
        TeamEvent::Message(message) => print_message(message),
        TeamEvent::Inner { source, message } => {
            log::debug!("inner message from {}", source);
            print_message(message);
        }
        TeamEvent::Completed(_) => {}
    }
}
