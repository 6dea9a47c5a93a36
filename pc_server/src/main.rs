//! Pi cockpit dashboard server.
//!
//! Without a subcommand (or with `serve`) this runs the HTTP server and its
//! background schedulers. Other subcommands are operator tools.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Error;
use pc_server::{
    api::{self, AppState, sessions::SWEEP_INTERVAL},
    cli::{COMMANDS, Cli, Command},
    config::{ServerConfig, StorageConfig},
    log_capture::LogBuffer,
    logging, metrics,
};
use pi_cockpit::{
    AdminControl, Database, ExitCodeSupervisor, SessionRegistry, TokenService, UserStore,
    led::LedService,
    scores::ScoreBoard,
    settings::{JsonFileConfigStore, SettingsStore},
    shell::{ShellRunner, TokioShellRunner},
    speedtest::SpeedTestService,
    sso::{ClientCredentialsSso, SsoProvider},
    update::{AutoUpdateService, AutoUpdateTask, UpdateChecker},
};
use pico_args::Arguments;
use tracing::{error, info, warn};

const HELP: &str = "\
Run the Pi cockpit dashboard server, or an operator command

USAGE:
  pc_server [OPTIONS] [serve]
  pc_server [OPTIONS] user add <email> <password> [--name NAME]
  pc_server [OPTIONS] user delete <id>
  pc_server [OPTIONS] user passwd <email> <password>
  pc_server [OPTIONS] user list
  pc_server [OPTIONS] requests list|approve <id>|reject <id>
  pc_server [OPTIONS] speedtest config [--enabled true|false] [--interval SECONDS]
  pc_server [OPTIONS] autoupdate on|off|status

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 0.0.0.0:3000]
  --db-url     URL         Database connection string  [default: env DATABASE_URL or sqlite://database.sqlite?mode=rwc]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  JWT_SECRET               JWT signing secret (required, at least 32 characters)
  PASSWORD_PEPPER          Password hashing pepper
  SCHEDULER_CONFIG_PATH    Speedtest scheduler config  [default: config/speedtest.json]
  SCORES_PATH              Scoreboard file  [default: config/scores.json]
  UPDATE_COMMAND           Update procedure  [default: bash start.sh 0]
  METRICS_BIND             Prometheus listener, e.g. 127.0.0.1:9090
  LOG_FORMAT=json          Log JSON lines
  (See .env.example for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let bind: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let database_url: Option<String> = pargs.opt_value_from_str("--db-url")?;
    let subcommand = pargs.subcommand()?;

    let logs = logging::init();

    match subcommand.as_deref() {
        None | Some("serve") => {
            warn_unused(pargs);
            let config = ServerConfig::from_env(bind, database_url)?;
            config.validate()?;
            serve(config, logs).await
        }
        Some(name) if COMMANDS.contains(&name) => {
            let command = Command::parse(name, &mut pargs)?;
            warn_unused(pargs);
            let cli = Cli::open(&StorageConfig::from_env(database_url)).await?;
            println!("{}", cli.run(command).await?);
            Ok(())
        }
        Some(other) => {
            anyhow::bail!("unknown command '{}', see --help", other)
        }
    }
}

fn warn_unused(pargs: Arguments) {
    let remaining = pargs.finish();
    if !remaining.is_empty() {
        warn!("Ignoring unused arguments: {:?}", remaining);
    }
}

async fn serve(config: ServerConfig, logs: LogBuffer) -> Result<(), Error> {
    info!("Starting Pi cockpit server at {}", config.bind);

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr)?;
        info!("Prometheus metrics on http://{}/metrics", addr);
    }

    info!("Opening database: {}", config.storage.database.database_url);
    let database = Database::new(&config.storage.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;
    let pool = database.pool().clone();

    let users = Arc::new(UserStore::new(
        pool.clone(),
        config.storage.password_pepper.clone(),
    ));
    let tokens = Arc::new(TokenService::new(users.clone(), &config.security.jwt_secret));
    let sessions = Arc::new(SessionRegistry::new());

    let shell: Arc<dyn ShellRunner> = Arc::new(TokioShellRunner::new());
    let admin = AdminControl::new(
        Arc::new(ExitCodeSupervisor),
        shell.clone(),
        config.admin.restart_grace(),
        config.admin.update_command.clone(),
    );

    let speedtest = Arc::new(SpeedTestService::new(
        shell.clone(),
        Arc::new(JsonFileConfigStore::new(
            config.storage.scheduler_config_path.clone(),
        )),
    ));

    let settings = SettingsStore::new(pool).await?;
    let auto_update = Arc::new(AutoUpdateService::new(
        AutoUpdateTask::new(
            UpdateChecker::new(shell.clone()),
            settings.clone(),
            admin.clone(),
        ),
        settings.clone(),
        config.admin.auto_update_interval(),
    ));

    let led = Arc::new(LedService::new(shell.clone(), settings.clone()));
    if let Err(e) = led.init().await {
        error!("LED service not initialised: {}", e);
    }

    let scores = Arc::new(ScoreBoard::load(config.storage.scores_path.clone()).await);

    let sso: Option<Arc<dyn SsoProvider>> = match config.sso.clone() {
        Some(sso_config) => {
            let provider = ClientCredentialsSso::connect(sso_config).await?;
            Some(Arc::new(provider) as Arc<dyn SsoProvider>)
        }
        None => {
            info!("SSO not configured");
            None
        }
    };

    // A broken config file leaves the scheduler off rather than the server down.
    if let Err(e) = speedtest.start_from_config().await {
        error!("Speedtest scheduler not started: {}", e);
    }
    auto_update.start_from_settings().await?;
    let sweeper = api::sessions::spawn_session_sweeper(sessions.clone(), SWEEP_INTERVAL);

    let state = AppState {
        tokens,
        sessions,
        users,
        speedtest: speedtest.clone(),
        auto_update: auto_update.clone(),
        settings,
        admin,
        scores,
        led,
        logs,
        sso,
        database: database.clone(),
        cookie_secure: config.security.cookie_secure,
    };

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    sweeper.abort();
    speedtest.stop();
    auto_update.stop();
    database.close().await;

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
