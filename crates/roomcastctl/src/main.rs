//! roomcastctl: Command-line interface for the Roomcast notification hub.
//!
//! Sends notifications, queues them through the broker path, and follows
//! room streams from the terminal.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use roomcast::client::RoomcastClient;
use roomcast::NotificationPayload;

/// Command-line interface for the Roomcast notification hub.
#[derive(Parser)]
#[command(name = "roomcastctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Roomcast server endpoint (e.g., http://localhost:8080)
    #[arg(short, long, env = "ROOMCAST_ENDPOINT", default_value = "http://localhost:8080")]
    endpoint: String,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

/// Fields of a notification to submit.
#[derive(Args)]
struct NotificationArgs {
    /// Room name
    room: String,
    /// Notification type (info, warning, system)
    #[arg(value_name = "TYPE")]
    kind: String,
    /// Title
    title: String,
    /// Body
    body: String,
}

impl From<NotificationArgs> for NotificationPayload {
    fn from(args: NotificationArgs) -> Self {
        NotificationPayload::new(args.room, args.kind, args.title, args.body)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a notification and broadcast it immediately
    Send(NotificationArgs),
    /// Queue a notification through the broker
    Publish(NotificationArgs),
    /// Follow a room stream and print notifications
    Tail {
        /// Room name
        room: String,
        /// History entries to replay first (server default when omitted)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Maximum number of notifications to print (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        count: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let client = RoomcastClient::new(&cli.endpoint)?;

    match cli.command {
        Commands::Send(args) => commands::send::run(&client, args.into(), cli.output).await?,
        Commands::Publish(args) => {
            commands::publish::run(&client, args.into(), cli.output).await?;
        }
        Commands::Tail { room, limit, count } => {
            commands::tail::run(&client, &room, limit, count, cli.output).await?;
        }
    }

    Ok(())
}
