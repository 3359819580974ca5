#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unnecessary_wraps,
    dead_code
)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use turnwise::channels::{self, Channel, TelegramChannel};
use turnwise::components::ComponentRegistry;
use turnwise::sessions::SessionRegistry;
use turnwise::{gateway, shell, ChannelCommands, Config};

/// `turnwise` - sequential conversation programs for console, chat and HTTP.
#[derive(Parser, Debug)]
#[command(name = "turnwise")]
#[command(version)]
#[command(about = "Run turn-based conversation components.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Talk to a component on the console
    #[command(long_about = "\
Talk to a component on the console.

Each line read from stdin is one user utterance; every bot utterance is \
printed as `Bot: <text>`. The session ends when the component finishes \
or stdin closes.

Examples:
  turnwise run                 # the greeter demo
  turnwise run echo
  echo hello | turnwise run oneturn_say")]
    Run {
        /// Component id (see `turnwise components`)
        #[arg(default_value = "greeter")]
        component: String,
    },

    /// Start the HTTP exchange gateway
    #[command(long_about = "\
Start the HTTP exchange gateway.

Serves POST /api/exchange/{component_id}/{session_id}: one utterance in, \
every bot utterance of that turn out.

Examples:
  turnwise serve
  turnwise serve --port 9000 --host 0.0.0.0")]
    Serve {
        /// Port to listen on; defaults to gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Serve a component on a chat channel
    Channel {
        #[command(subcommand)]
        channel_command: ChannelCommands,
    },

    /// List registered components
    Components,

    /// Show configuration summary
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("TURNWISE_CONFIG_DIR", config_dir);
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let mut config = Config::load_or_init().await?;
    let components = Arc::new(ComponentRegistry::from_config(&config));

    match cli.command {
        Commands::Run { component } => {
            let entry = lookup(&components, &component)?;
            match shell::run_console(entry.program.clone(), entry.config.clone()).await? {
                Some(outputs) => {
                    info!(component = %component, success = outputs.success, "conversation finished");
                    if !outputs.outputs.is_empty() {
                        println!("{}", serde_json::to_string_pretty(&outputs.outputs)?);
                    }
                }
                None => info!(component = %component, "input closed"),
            }
            Ok(())
        }

        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(host) = host {
                config.gateway.host = host;
            }
            info!(
                "Starting turnwise gateway on {}:{}",
                config.gateway.host, config.gateway.port
            );
            gateway::run_gateway(&config, components).await
        }

        Commands::Channel { channel_command } => match channel_command {
            ChannelCommands::List => {
                println!("Channels:");
                println!("  console:  always (turnwise run)");
                println!("  gateway:  always (turnwise serve)");
                for (name, desc) in config.channels_config.configured() {
                    println!("  {name}: {desc}");
                }
                Ok(())
            }
            ChannelCommands::Telegram { component } => {
                let telegram = config.channels_config.telegram.as_ref().context(
                    "Telegram is not configured: set [channels_config.telegram] or TELEGRAM_TOKEN",
                )?;
                let entry = lookup(&components, &component)?;
                let channel: Arc<dyn Channel> = Arc::new(TelegramChannel::new(telegram));
                channels::run_channel(
                    channel,
                    entry.program.clone(),
                    entry.config.clone(),
                    SessionRegistry::new(),
                )
                .await
            }
        },

        Commands::Components => {
            println!("Registered components ({} total):\n", components.len());
            for id in components.ids() {
                let marker = if config.remote.components.contains(&id) {
                    " [remote]"
                } else if config.components.contains_key(&id) {
                    " [configured]"
                } else {
                    ""
                };
                println!("  {id}{marker}");
            }
            Ok(())
        }

        Commands::Status => {
            println!("turnwise status");
            println!();
            println!("Version:     {}", env!("CARGO_PKG_VERSION"));
            println!("Config:      {}", config.config_path.display());
            println!();
            println!(
                "Gateway:     {}:{} (max body {} bytes)",
                config.gateway.host, config.gateway.port, config.gateway.max_body_bytes
            );
            println!(
                "Exchange:    turn timeout {}s, escalation timeout {}s",
                config.exchange.turn_timeout_secs, config.exchange.escalation_timeout_secs
            );
            println!(
                "Remote:      {}",
                config.remote_base_url().unwrap_or("(none)")
            );
            if !config.remote.components.is_empty() {
                println!("  Components:  {}", config.remote.components.join(", "));
            }
            println!("Components:  {}", components.len());
            println!();
            println!("Channels:");
            println!("  console:  always");
            for (name, _) in config.channels_config.configured() {
                println!("  {name}:  configured");
            }
            Ok(())
        }
    }
}

fn lookup<'a>(
    components: &'a ComponentRegistry,
    id: &str,
) -> Result<&'a turnwise::components::Component> {
    components.get(id).with_context(|| {
        format!(
            "Unknown component '{id}'. Available: {}",
            components.ids().join(", ")
        )
    })
}
