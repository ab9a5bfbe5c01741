mod commands;
mod util;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use util::Phrasing;

#[derive(Parser)]
#[command(name = "shule", version, about = "Shule assistant CLI: talk to the school console from a terminal")]
struct Cli {
    /// School API base URL
    #[arg(long, env = "SHULE_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Reply phrasing: `fixed` always picks the first variant
    #[arg(long, env = "SHULE_PHRASING", value_enum, default_value_t = Phrasing::Fixed)]
    phrasing: Phrasing,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat session over stdin
    Chat,
    /// Run each argument as one turn and print the transcript as JSON
    Say {
        /// Turns, in order (e.g. "search students Amina" "publish it" "yes")
        #[arg(required = true)]
        turns: Vec<String>,
    },
    /// Print the classified intent for a line of text (no network)
    Classify {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// List destinations, or show how a target resolves
    Routes {
        /// Role to resolve for (admin, teacher, finance, student, parent)
        #[arg(long, default_value = "admin")]
        role: String,
        /// Target phrase (e.g. "fee reminders")
        target: Vec<String>,
    },
    /// Check that the school API is reachable
    Health,
    /// Store an API token for later sessions
    Login {
        /// Bearer token issued by the school console
        #[arg(long, env = "SHULE_API_TOKEN")]
        token: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shule=warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Chat => commands::chat::run(&cli.api_url, cli.phrasing).await,
        Commands::Say { turns } => commands::say::run(&cli.api_url, cli.phrasing, &turns).await,
        Commands::Classify { text } => commands::classify::run(&text.join(" ")),
        Commands::Routes { role, target } => commands::routes::run(&role, &target.join(" ")),
        Commands::Health => commands::health::run(&cli.api_url).await,
        Commands::Login { token } => commands::login::run(&cli.api_url, &token),
    };

    std::process::exit(code);
}
