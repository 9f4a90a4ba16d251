use alumni_server::db::db_connect_and_migrate;
use alumni_server::identity::Identity;
use alumni_server::{server, AppState, Config};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "alumni-server")]
#[command(about = "Alumni directory REST backend", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Create an administrator account, or promote an existing one.
    SeedAdmin {
        #[arg(long, env = "ADMIN_EMAIL")]
        email: String,
        #[arg(long, env = "ADMIN_PASSWORD")]
        password: String,
        #[arg(long, default_value = "Administrateur")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> alumni_server::Result<()> {
    human_panic::setup_panic!();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let db = db_connect_and_migrate(&config.database_url).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let addr = config.bind_addr;
            let state = AppState::new(db, config)?;
            server::serve(state, addr).await
        }
        Command::SeedAdmin {
            email,
            password,
            name,
        } => {
            let admin = Identity::new(&db, &config)
                .seed_admin(&email, &password, &name)
                .await?;
            tracing::info!(user_id = %admin.id, email = %admin.email, "administrator ready");
            Ok(())
        }
    }
}
