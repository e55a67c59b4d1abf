use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{debug, info, warn, LevelFilter};

use gangplank::agent::PortAgent;
use gangplank::config::{DriverConfig, DEFAULT_HOSTNET_URL};
use gangplank::driver::Driver;
use gangplank::error::{GangplankError, GangplankResult};
use gangplank::exec::PowerShell;
use gangplank::hostnet::api::{HostNetApi, HostNetClient};
use gangplank::orch::auth::AuthConfig;
use gangplank::orch::client::Controller;
use gangplank::orch::store::RestStore;
use gangplank::runtime::DockerRuntime;

#[derive(Parser, Debug)]
#[clap(version = env!("VERGEN_BUILD_SEMVER"))]
struct Opts {
    /// Net adapter for the virtual switch, must be physical.
    #[clap(long = "adapter", default_value = "Ethernet0")]
    adapter: String,

    /// IP address of the orchestrator API.
    #[clap(long = "controllerIP", default_value = "127.0.0.1")]
    controller_ip: String,

    /// Port of the orchestrator API.
    #[clap(long = "controllerPort", default_value_t = 8082)]
    controller_port: u16,

    /// Name of the transparent virtual switch. The wildcard "<adapter>" is
    /// replaced with the value of the adapter flag.
    #[clap(long = "vswitchName", default_value = "Layered <adapter>")]
    vswitch_name: String,

    /// Base URL of the host network control socket.
    #[clap(long = "hostnetUrl", default_value = DEFAULT_HOSTNET_URL)]
    hostnet_url: String,

    /// Log file path. Logs go to stderr when unset.
    #[clap(long = "logPath")]
    log_path: Option<PathBuf>,

    /// Log verbosity (possible values: Debug|Info|Warn|Error|Fatal|Panic).
    #[clap(long = "logLevel", default_value = "Info")]
    log_level: String,

    /// Act as if ran interactively even when the session says otherwise.
    /// Useful under remote shells, which are not interactive.
    #[clap(long = "forceAsInteractive")]
    force_as_interactive: bool,

    /// Auth URL of the token service. Falls back to the environment.
    #[clap(long = "os_auth_url", env = "OS_AUTH_URL", default_value = "")]
    os_auth_url: String,

    /// Orchestrator username. Falls back to the environment.
    #[clap(long = "os_username", env = "OS_USERNAME", default_value = "")]
    os_username: String,

    /// Tenant name. Falls back to the environment.
    #[clap(long = "os_tenant_name", env = "OS_TENANT_NAME", default_value = "")]
    os_tenant_name: String,

    /// Orchestrator password. Falls back to the environment.
    #[clap(long = "os_password", env = "OS_PASSWORD", default_value = "")]
    os_password: String,

    /// Pre-issued token. Falls back to the environment.
    #[clap(long = "os_token", env = "OS_TOKEN", default_value = "")]
    os_token: String,
}

fn parse_log_level(value: &str) -> GangplankResult<LevelFilter> {
    match value.to_ascii_lowercase().as_str() {
        "debug" => Ok(LevelFilter::Debug),
        "info" => Ok(LevelFilter::Info),
        "warn" => Ok(LevelFilter::Warn),
        "error" | "fatal" | "panic" => Ok(LevelFilter::Error),
        other => Err(GangplankError::Config(format!(
            "unknown log level {}",
            other
        ))),
    }
}

fn init_logging(opts: &Opts) -> GangplankResult<()> {
    let level = parse_log_level(&opts.log_level)?;
    let mut builder = env_logger::builder();
    builder.format_timestamp_secs().filter_level(level);

    if let Some(path) = &opts.log_path {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();

    if let Some(path) = &opts.log_path {
        info!("Logging to {}", path.display());
    }
    Ok(())
}

fn main() {
    let opts = Opts::parse();

    if let Err(err) = init_logging(&opts) {
        err.print_json();
        std::process::exit(err.get_exit_code());
    }

    match run(opts) {
        Ok(()) => info!("Service stopped"),
        Err(err) => {
            err.print_json();
            std::process::exit(err.get_exit_code());
        }
    }
}

#[tokio::main]
async fn run(opts: Opts) -> GangplankResult<()> {
    info!(
        "Starting gangplank {} (built {}, {})",
        env!("VERGEN_BUILD_SEMVER"),
        env!("VERGEN_BUILD_TIMESTAMP"),
        env!("VERGEN_RUSTC_HOST_TRIPLE"),
    );
    if opts.force_as_interactive {
        debug!("Treating the session as interactive");
    }

    let vswitch_name = opts.vswitch_name.replace("<adapter>", &opts.adapter);
    info!(
        "Adapter: {}, vswitch: {}, controller: {}:{}",
        opts.adapter, vswitch_name, opts.controller_ip, opts.controller_port
    );

    let auth = AuthConfig {
        auth_url: opts.os_auth_url.clone(),
        username: opts.os_username.clone(),
        tenant_name: opts.os_tenant_name.clone(),
        password: opts.os_password.clone(),
        token: opts.os_token.clone(),
    };
    auth.warn_empty();

    let store = RestStore::connect(&opts.controller_ip, opts.controller_port, auth).await?;
    let controller = Controller::new(Arc::new(store));

    let config = DriverConfig::new(&opts.adapter, &vswitch_name);
    let hostnet: Arc<dyn HostNetApi> = Arc::new(HostNetClient::new(&opts.hostnet_url, &config));
    let runtime = Arc::new(DockerRuntime::connect()?);

    let mut driver = Driver::new(
        config,
        controller,
        hostnet,
        runtime,
        Arc::new(PowerShell),
        PortAgent::new(),
    );

    driver.start_serving().await?;

    wait_for_shutdown_signal().await;

    driver.stop_serving().await?;
    Ok(())
}

/// Block until the service manager asks us to stop.
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!("Could not set up SIGTERM hook: {}", err);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            warn!("Received SIGTERM, cleaning up and exiting");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Received interrupt, cleaning up and exiting");
        }
    }
}
