use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use estate_client::{
    ApiClient, ApplicationsApi, AuthApi, FileSessionStorage, PropertiesApi, SessionStore,
};
use estate_core::Config;

#[derive(Parser)]
#[command(name = "estate-cli")]
#[command(about = "Browse real-estate deals and manage investment applications")]
#[command(version)]
struct Cli {
    /// API base URL (overrides config and ESTATE_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session locally
    Login {
        email: String,
        #[arg(long, env = "ESTATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        email: String,
        #[arg(long, env = "ESTATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out on this machine
    Logout,
    /// Sign out on every device
    LogoutAll,
    /// Show the signed-in user
    Whoami,
    /// List open deals
    Deals,
    /// Apply to invest in a deal
    Apply { property_id: i64, amount: u64 },
    /// List your applications
    Applications,
    /// Withdraw an application
    Withdraw { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = Config::new();
    if let Some(api_url) = cli.api_url {
        config.api_base = api_url;
    }
    log::debug!("Using API at {}", config.api_base());

    let session = Arc::new(SessionStore::load(FileSessionStorage::new(config.session_path())));
    let client = ApiClient::new(&config, session)?;

    run(cli.command, client).await
}

async fn run(command: Commands, client: ApiClient) -> anyhow::Result<()> {
    match command {
        Commands::Login { email, password } => {
            let auth = AuthApi::new(client).login(&email, &password).await?;
            println!("{} {}", "Signed in as".green(), auth.user.email.bold());
        }
        Commands::Register { email, password } => {
            let auth = AuthApi::new(client).register(&email, &password).await?;
            println!("{} {}", "Account created for".green(), auth.user.email.bold());
        }
        Commands::Logout => {
            AuthApi::new(client).logout().await;
            println!("{}", "Signed out".green());
        }
        Commands::LogoutAll => {
            AuthApi::new(client).logout_all().await?;
            println!("{}", "Signed out from all devices".green());
        }
        Commands::Whoami => match client.session().user() {
            Some(user) => println!("{} ({}) #{}", user.email.bold(), user.role, user.id),
            None => println!("{}", "Not signed in".yellow()),
        },
        Commands::Deals => {
            let deals = PropertiesApi::new(client).get_all().await?;
            if deals.is_empty() {
                println!("{}", "No open deals".yellow());
            }
            for deal in deals {
                println!(
                    "{} {}\n    price {} Dhs · ticket {} Dhs · yield {}% · {} days left · sold {}%",
                    format!("#{}", deal.id).dimmed(),
                    deal.title.bold(),
                    deal.price,
                    deal.ticket,
                    deal.yield_percent,
                    deal.days_left,
                    deal.sold_percent
                );
            }
        }
        Commands::Apply {
            property_id,
            amount,
        } => {
            let application = ApplicationsApi::new(client).create(property_id, amount).await?;
            println!(
                "{} #{} for {} Dhs",
                "Application submitted".green(),
                application.id,
                application.amount
            );
        }
        Commands::Applications => {
            let applications = ApplicationsApi::new(client).get_mine().await?;
            if applications.is_empty() {
                println!("{}", "No applications yet".yellow());
            }
            for application in applications {
                let when = application
                    .created_at
                    .map(|at| at.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!(
                    "{} deal #{} · {} Dhs {}",
                    format!("#{}", application.id).dimmed(),
                    application.property_id,
                    application.amount,
                    when.dimmed()
                );
            }
        }
        Commands::Withdraw { id } => {
            ApplicationsApi::new(client).remove(id).await?;
            println!("{} #{id}", "Withdrew application".green());
        }
    }
    Ok(())
}
