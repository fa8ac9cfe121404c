use std::env;
use std::fmt;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use config::{Config, Environment, File, FileFormat};
use log::{LevelFilter, debug, info, warn};
use serde::{Deserialize, Serialize};

use storefront_auth::auth::AuthConfig;
use storefront_auth::backend::{BackendClient, BackendConfig, CredentialFile, SessionBackend};
use storefront_auth::delivery::DeliveryTable;
use storefront_auth::identity::{IdentityProvider, LocalIdentityProvider};
use storefront_auth::session::{Access, Identity};
use storefront_auth::sync::SessionSync;
use storefront_auth::{AuthReconciler, RouteConfig, RouteGuard, SessionStore};
use storefront_protocol::RegisterRequest;

const APP_NAME: &str = "storefront";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_session(ctx: RuntimeContext, cmd: SessionCommand) -> Result<()> {
    handle_session(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("resolved paths: {}", ctx.paths);

    match cli.command {
        Command::Guard(cmd) => handle_guard(&ctx, cmd),
        Command::Whoami(cmd) => async_session(ctx, SessionCommand::Whoami(cmd)),
        Command::Login(cmd) => async_session(ctx, SessionCommand::Login(cmd)),
        Command::Register(cmd) => async_session(ctx, SessionCommand::Register(cmd)),
        Command::Logout => async_session(ctx, SessionCommand::Logout),
        Command::Delivery { command } => handle_delivery(&ctx, command),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Storefront session tooling: sign in, inspect sessions and route decisions.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true, conflicts_with = "yaml")]
    json: bool,
    /// Output machine readable YAML
    #[arg(long, global = true)]
    yaml: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    /// Do not change anything on disk
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
    /// Backend request timeout in seconds
    #[arg(long = "timeout", value_name = "SECONDS", global = true)]
    timeout: Option<u64>,
    /// Emit additional diagnostics for troubleshooting
    #[arg(long = "diagnostics", global = true)]
    diagnostics: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the route guard decision for a path
    Guard(GuardCommand),
    /// Reconcile the current session and print it
    Whoami(WhoamiCommand),
    /// Sign in with email and password
    Login(LoginCommand),
    /// Create a password account and sign in
    Register(RegisterCommand),
    /// Sign out of the provider and the backend
    Logout,
    /// Look up delivery fees
    Delivery {
        #[command(subcommand)]
        command: DeliveryCommand,
    },
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SessionState {
    NotAuthenticated,
    Pending,
    User,
    Admin,
}

impl From<SessionState> for Access {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::NotAuthenticated => Access::Anonymous,
            SessionState::Pending => Access::Pending,
            SessionState::User => Access::User,
            SessionState::Admin => Access::Admin,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct GuardCommand {
    /// Requested path, e.g. /shop/home
    #[arg(value_name = "PATH")]
    path: String,
    /// Session state to evaluate against
    #[arg(long, value_enum, default_value_t = SessionState::NotAuthenticated)]
    state: SessionState,
}

#[derive(Debug, Clone, Args)]
struct WhoamiCommand {
    /// Provider bearer token; without it only the session cookie is checked
    #[arg(long, requires_all = ["uid", "email"])]
    token: Option<String>,
    /// Provider user id the token belongs to
    #[arg(long)]
    uid: Option<String>,
    /// Email of the provider identity
    #[arg(long)]
    email: Option<String>,
    /// Display name of the provider identity
    #[arg(long)]
    name: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct LoginCommand {
    #[arg(long)]
    email: String,
    #[arg(long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Debug, Clone, Args)]
struct RegisterCommand {
    #[arg(long = "user-name")]
    user_name: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Debug)]
enum SessionCommand {
    Whoami(WhoamiCommand),
    Login(LoginCommand),
    Register(RegisterCommand),
    Logout,
}

#[derive(Debug, Subcommand)]
enum DeliveryCommand {
    /// List counties
    Counties,
    /// List sub-counties of a county
    SubCounties { county: String },
    /// List locations of a sub-county with their fees
    Locations { county: String, sub_county: String },
    /// Delivery fee for a location
    Fee {
        county: String,
        sub_county: String,
        location: String,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Create the default configuration file
    Init {
        /// Recreate configuration even if it already exists
        #[arg(long = "force")]
        force: bool,
    },
    /// Regenerate the default configuration file
    Reset,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.clone())?;
        let mut config = load_config(&paths)?;
        if let Some(timeout) = common.timeout {
            config.backend.timeout_secs = timeout;
        }
        config
            .auth
            .validate()
            .context("validating auth configuration")?;
        let paths = paths.apply_overrides(&config)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "storefront_auth={level},storefrontctl={level},reqwest=warn"
            ))
        });

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stderr),
                )
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color)
                        .with_target(self.common.diagnostics)
                        .with_file(self.common.diagnostics)
                        .with_line_number(self.common.diagnostics),
                )
                .try_init()
                .ok();
        }

        // The HTTP client logs through the log facade.
        let mut builder = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(self.config.logging.level.as_str()),
        );
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Warn),
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn credential_file(&self) -> CredentialFile {
        CredentialFile::in_dir(&self.paths.state_dir)
    }

    /// Serialize `value` as JSON or YAML if requested, else use `plain`.
    fn render<T: Serialize>(&self, value: &T, plain: impl FnOnce() -> String) -> Result<String> {
        if self.common.json {
            serde_json::to_string_pretty(value).context("serializing output to JSON")
        } else if self.common.yaml {
            serde_yaml::to_string(value).context("serializing output to YAML")
        } else {
            Ok(plain())
        }
    }
}

#[derive(Debug, Clone)]
struct AppPaths {
    config_file: PathBuf,
    state_dir: PathBuf,
}

impl AppPaths {
    fn discover(override_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => {
                let expanded = expand_path(path)?;
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => default_config_dir()?.join("config.toml"),
        };

        if config_file.parent().is_none() {
            return Err(anyhow!("invalid config file path: {config_file:?}"));
        }

        Ok(Self {
            config_file,
            state_dir: default_state_dir()?,
        })
    }

    fn apply_overrides(mut self, cfg: &AppConfig) -> Result<Self> {
        if let Some(ref state_override) = cfg.paths.state_dir {
            self.state_dir = expand_str_path(state_override)?;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    profile: String,
    logging: LoggingConfig,
    backend: BackendConfig,
    auth: AuthConfig,
    routes: RouteConfig,
    paths: PathsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: "default".to_string(),
            logging: LoggingConfig::default(),
            backend: BackendConfig::default(),
            auth: AuthConfig::default(),
            routes: RouteConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct LoggingConfig {
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct PathsConfig {
    state_dir: Option<String>,
}

fn handle_guard(ctx: &RuntimeContext, cmd: GuardCommand) -> Result<()> {
    let guard = RouteGuard::new(ctx.config.routes.clone());
    let category = guard.categorize(&cmd.path);
    let decision = guard.decide_for(cmd.state.into(), &cmd.path);

    let output = ctx.render(&decision, || match decision.redirect_to() {
        Some(to) => match decision.return_to() {
            Some(back) => format!("{} ({}): redirect to {} (return to {})", cmd.path, category, to, back),
            None => format!("{} ({}): redirect to {}", cmd.path, category, to),
        },
        None if decision.is_allowed() => format!("{} ({}): allow", cmd.path, category),
        None => format!("{} ({}): loading", cmd.path, category),
    })?;
    println!("{output}");
    Ok(())
}

async fn handle_session(ctx: &RuntimeContext, cmd: SessionCommand) -> Result<()> {
    let client = Arc::new(
        BackendClient::new(&ctx.config.backend, ctx.config.auth.cookie_name.clone())
            .context("creating backend client")?,
    );
    let credentials = ctx.credential_file();
    if let Some(saved) = credentials.load()? {
        if saved.cookie_name == ctx.config.auth.cookie_name {
            client.restore_credential(&saved.value);
        } else {
            debug!("ignoring saved credential for cookie '{}'", saved.cookie_name);
        }
    }

    let provider = match &cmd {
        SessionCommand::Whoami(WhoamiCommand {
            token: Some(token),
            uid: Some(uid),
            email: Some(email),
            name,
        }) => {
            let mut identity = Identity::new(uid.clone(), email.clone());
            if let Some(name) = name {
                identity = identity.with_display_name(name.clone());
            }
            LocalIdentityProvider::signed_in(identity, token.clone())
        }
        _ => LocalIdentityProvider::new(),
    };
    let provider: Arc<dyn IdentityProvider> = Arc::new(provider);
    let backend: Arc<dyn SessionBackend> = client.clone();
    let sync = Arc::new(SessionSync::new(backend, ctx.config.auth.clone()));
    let reconciler = AuthReconciler::start(provider, sync, SessionStore::new());
    let mut notices = reconciler.notices();

    // Let the provider's initial state (and any saved cookie) settle first.
    let session = reconciler.settled().await;
    debug!("initial session: {:?}", session.status());

    let result = match cmd {
        SessionCommand::Whoami(_) => {
            let output = ctx.render(&session, || describe_session(&session))?;
            println!("{output}");
            Ok(())
        }
        SessionCommand::Login(cmd) => reconciler
            .sign_in_with_password(&cmd.email, &cmd.password)
            .await
            .map_err(|err| anyhow!(err.user_message()))
            .and_then(|_| {
                let session = reconciler.snapshot();
                println!("{}", ctx.render(&session, || describe_session(&session))?);
                Ok(())
            }),
        SessionCommand::Register(cmd) => {
            let request = RegisterRequest {
                user_name: cmd.user_name,
                email: cmd.email,
                password: cmd.password,
            };
            reconciler
                .register(&request)
                .await
                .map_err(|err| anyhow!(err.user_message()))
                .and_then(|_| {
                    let session = reconciler.snapshot();
                    println!("{}", ctx.render(&session, || describe_session(&session))?);
                    Ok(())
                })
        }
        SessionCommand::Logout => {
            reconciler.sign_out().await;
            println!("signed out");
            Ok(())
        }
    };

    while let Ok(notice) = notices.try_recv() {
        warn!("{:?}", notice);
    }
    reconciler.shutdown().await;

    persist_credential(ctx, &credentials, client.as_ref())?;
    result
}

fn describe_session(session: &storefront_auth::Session) -> String {
    match (session.account(), session.origin()) {
        (Some(account), Some(origin)) => format!(
            "{} <{}> role={} account={} via {:?}",
            account.user_name, account.email, account.role, account.account_id, origin
        ),
        _ => format!("{:?}", session.status()),
    }
}

fn persist_credential(
    ctx: &RuntimeContext,
    credentials: &CredentialFile,
    client: &BackendClient,
) -> Result<()> {
    if ctx.common.dry_run {
        info!(
            "dry-run: would update session credential at {}",
            credentials.path().display()
        );
        return Ok(());
    }
    match client.session_credential() {
        Some(value) => {
            credentials.save(&ctx.config.auth.cookie_name, &value)?;
            debug!("saved session credential to {}", credentials.path().display());
        }
        None => {
            if credentials.remove()? {
                debug!("removed session credential {}", credentials.path().display());
            }
        }
    }
    Ok(())
}

fn handle_delivery(ctx: &RuntimeContext, command: DeliveryCommand) -> Result<()> {
    let table = DeliveryTable::builtin().context("loading delivery table")?;
    let output = match command {
        DeliveryCommand::Counties => {
            let counties = table.counties();
            ctx.render(&counties, || counties.join("\n"))?
        }
        DeliveryCommand::SubCounties { county } => {
            let subs = table.sub_counties(&county);
            if subs.is_empty() {
                return Err(anyhow!("unknown county '{county}'"));
            }
            ctx.render(&subs, || subs.join("\n"))?
        }
        DeliveryCommand::Locations { county, sub_county } => {
            let locations = table.locations(&county, &sub_county);
            if locations.is_empty() {
                return Err(anyhow!("unknown sub-county '{sub_county}' in '{county}'"));
            }
            ctx.render(&locations, || {
                locations
                    .iter()
                    .map(|l| format!("{}\tKSh {}", l.name, l.fee))
                    .collect::<Vec<_>>()
                    .join("\n")
            })?
        }
        DeliveryCommand::Fee {
            county,
            sub_county,
            location,
        } => {
            let fee = table
                .fee(&county, &sub_county, &location)
                .ok_or_else(|| anyhow!("no delivery to '{location}' ({sub_county}, {county})"))?;
            ctx.render(&fee, || format!("KSh {fee}"))?
        }
    };
    println!("{output}");
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ctx.config)
                        .context("serializing config to JSON")?
                );
            } else if ctx.common.yaml {
                println!(
                    "{}",
                    serde_yaml::to_string(&ctx.config).context("serializing config to YAML")?
                );
            } else {
                println!(
                    "{}",
                    toml::to_string_pretty(&ctx.config).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Init { force } => {
            if ctx.paths.config_file.exists() && !force {
                return Err(anyhow!(
                    "config already exists at {} (use --force to overwrite)",
                    ctx.paths.config_file.display()
                ));
            }
            if ctx.common.dry_run {
                info!(
                    "dry-run: would write default config to {}",
                    ctx.paths.config_file.display()
                );
                return Ok(());
            }
            write_default_config(&ctx.paths.config_file)
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                info!(
                    "dry-run: would reset config at {}",
                    ctx.paths.config_file.display()
                );
                return Ok(());
            }
            write_default_config(&ctx.paths.config_file)
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "storefrontctl", &mut io::stdout());
    Ok(())
}

fn load_config(paths: &AppPaths) -> Result<AppConfig> {
    let built = Config::builder()
        .set_default("profile", "default")?
        .set_default("logging.level", "warn")?
        .add_source(
            File::from(paths.config_file.as_path())
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix(env_prefix().as_str()).separator("__"))
        .build()
        .with_context(|| format!("loading config from {}", paths.config_file.display()))?;

    built
        .try_deserialize()
        .context("parsing configuration")
}

fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = format!("# Configuration for {}\n# File: {}\n\n", APP_NAME, path.display());
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        expand_str_path(text)
    } else {
        Ok(path)
    }
}

fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

fn default_state_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::state_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("state").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine state directory"))
}

fn env_prefix() -> String {
    APP_NAME.to_ascii_uppercase()
}

impl fmt::Display for AppPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "config: {}, state: {}",
            self.config_file.display(),
            self.state_dir.display()
        )
    }
}
