use actix_web::{middleware, web, App, HttpServer};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use student_tracker::config::Config;
use student_tracker::database::Database;
use student_tracker::error::AppError;
use student_tracker::logging::init_logging;
use student_tracker::prediction::PredictionService;
use student_tracker::{configure, AppState};

#[derive(Debug, Parser)]
#[command(name = "student_tracker", version, about = "Teacher student tracker with pass/fail prediction")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the tables, load the classifier and serve HTTP
    Serve {
        /// Address to listen on, overrides BIND_ADDR
        #[arg(long)]
        bind: Option<String>,
    },
    /// Create the database tables if they do not exist
    InitDb,
    /// Create the admin account
    CreateAdmin {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;
    init_logging(config.log_format).map_err(|err| anyhow!("failed to initialize logging: {err}"))?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(config, bind).await,
        Command::InitDb => {
            open_database(&config).await?;
            tracing::info!(url = %config.database_url, "database initialized");
            Ok(())
        }
        Command::CreateAdmin { username, password } => {
            create_admin(&config, username, password).await
        }
    }
}

async fn open_database(config: &Config) -> Result<Database> {
    let db = Database::connect(&config.database_url, config.max_connections)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    db.init_schema().await.context("failed to create tables")?;
    Ok(db)
}

async fn serve(config: Config, bind: Option<String>) -> Result<()> {
    let bind_addr = bind.unwrap_or_else(|| config.bind_addr.clone());
    let db = open_database(&config).await?;
    let predictor = PredictionService::from_artifact_path(&config.model_path);
    let state = web::Data::new(AppState::new(db, predictor, &config));

    tracing::info!(
        addr = %bind_addr,
        classifier = state.predictor.classifier_name().unwrap_or("heuristic"),
        "starting server"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {bind_addr}"))?
    .run()
    .await
    .context("server stopped with an error")
}

async fn create_admin(
    config: &Config,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let username = username.unwrap_or_else(|| config.admin_username.clone());
    let password = password.unwrap_or_else(|| config.admin_password.clone());
    if username.trim().is_empty() || password.is_empty() {
        return Err(anyhow!("admin username and password must not be empty"));
    }

    let db = open_database(config).await?;
    let state = AppState::new(db, PredictionService::heuristic_only(), config);
    let hash = state.hasher.hash(&password).await?;

    match state.db.create_admin(username.trim(), &hash).await {
        Ok(admin) => {
            tracing::info!(admin = %admin.username, "admin created");
            Ok(())
        }
        Err(AppError::Conflict(_)) => {
            tracing::info!(admin = %username, "admin already exists, nothing to do");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
