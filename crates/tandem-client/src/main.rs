use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tandem_auth::{DeviceClass, DeviceFingerprint};
use tandem_client::{
    AgentConfig, FileTokenStore, HttpTransport, SessionAgent, StoredSession, TokenStore,
};

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Log in to a tandem server and keep the session fresh")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server base URL
    #[arg(short, long, global = true, env = "TANDEM_URL")]
    server: Option<String>,

    /// Credential profile name
    #[arg(short, long, global = true, env = "TANDEM_PROFILE", default_value = "default")]
    profile: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login(LoginArgs),
    /// Show the stored session
    Status,
    /// Refresh the short-lived credential now
    Refresh,
    /// Print a short-lived credential, refreshing it if it is about to expire
    Token,
    /// End the session and remove stored credentials
    Logout,
}

#[derive(clap::Args)]
struct LoginArgs {
    #[arg(short, long)]
    username: String,
    #[arg(long, env = "TANDEM_PASSWORD")]
    password: String,
    /// Device class of this client
    #[arg(long, default_value = "desktop")]
    device_class: String,
    /// Stable identifier of this device
    #[arg(long, env = "TANDEM_DEVICE_FINGERPRINT")]
    fingerprint: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("{} {e:#}", "✗".red().bold());
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let tokens = Arc::new(FileTokenStore::for_profile(&cli.profile)?);

    match &cli.command {
        Commands::Login(args) => {
            let server = cli.server.clone().context(
                "No server URL configured. Use --server or set TANDEM_URL",
            )?;
            let transport = HttpTransport::new(&server);
            let session = transport
                .login(
                    &args.username,
                    &args.password,
                    DeviceClass::parse(&args.device_class)?,
                    DeviceFingerprint::parse(args.fingerprint.clone())?,
                )
                .await?;

            let agent = agent(&server, tokens)?;
            agent.install(session.clone())?;
            success(&format!(
                "Logged in to {} as {} ({})",
                server.cyan(),
                session.subject_id.to_string().cyan(),
                session.device_class
            ));
        }
        Commands::Status => match tokens.load()? {
            Some(session) => {
                print_session(&session);
                let (status, _) = HttpTransport::new(&session.server).health().await?;
                println!("{}: {}", "Server health".cyan(), status);
            }
            None => println!("Not logged in (profile: \"{}\")", cli.profile),
        },
        Commands::Refresh => {
            let agent = agent_for_stored(&cli, tokens)?;
            agent.force_refresh().await?;
            success("Session refreshed");
            if let Some(session) = agent.session() {
                print_session(&session);
            }
        }
        Commands::Token => {
            let agent = agent_for_stored(&cli, tokens)?;
            let slc = agent.ensure_fresh().await?;
            println!("{}", slc.as_str());
        }
        Commands::Logout => {
            if tokens.load()?.is_none() {
                println!("No credentials found for profile \"{}\"", cli.profile);
                return Ok(());
            }
            let agent = agent_for_stored(&cli, tokens)?;
            agent.logout().await?;
            success("Logged out (credentials removed)");
        }
    }

    Ok(())
}

fn agent(server: &str, tokens: Arc<FileTokenStore>) -> Result<SessionAgent> {
    Ok(SessionAgent::new(
        AgentConfig::default(),
        Arc::new(HttpTransport::new(server)),
        tokens,
    )?)
}

/// Builds an agent for the server the stored session belongs to.
fn agent_for_stored(cli: &Cli, tokens: Arc<FileTokenStore>) -> Result<SessionAgent> {
    let stored = tokens
        .load()?
        .with_context(|| format!("Not logged in (profile: \"{}\")", cli.profile))?;
    let server = cli.server.clone().unwrap_or(stored.server);
    agent(&server, tokens)
}

fn print_session(session: &StoredSession) {
    let left = session.slc_expires_at - time::OffsetDateTime::now_utc();
    println!("{}: {}", "Server".cyan(), session.server);
    println!("{}: {}", "Subject".cyan(), session.subject_id);
    println!("{}: {}", "Device class".cyan(), session.device_class);
    if left.is_positive() {
        println!(
            "{}: {}m {}s",
            "Expires in".cyan(),
            left.whole_minutes(),
            left.whole_seconds() % 60
        );
    } else {
        println!("{}: {}", "Expires in".cyan(), "expired".red());
    }
}

fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}
