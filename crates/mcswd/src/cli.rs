//! Command line entry point.
//!
//! # Usage
//!
//! ```bash
//! # Run the sidecar in the foreground
//! mcswd start --address ws://127.0.0.1:8020/mcs
//!
//! # Run it in the background
//! MCS_ADDRESS=ws://127.0.0.1:8020/mcs mcswd start -d
//!
//! # Stop it / check on it
//! mcswd stop
//! mcswd status
//!
//! # One-off remote calls
//! mcswd commands
//! mcswd call getUsers room-1
//! mcswd call join room-1 SFU '{"name":"probe"}'
//!
//! # Enable debug logging
//! RUST_LOG=mcswd=debug mcswd start
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mcsw_protocol::{find_command, COMMANDS};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::link::{spawn_link, WsConnector};
use crate::sidecar;

/// mcsw daemon - media control server sidecar
#[derive(Parser, Debug)]
#[command(name = "mcswd", version, about)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/mcsw/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the sidecar
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Media control server address (overrides config and MCS_ADDRESS)
        #[arg(long)]
        address: Option<String>,
    },
    /// Stop the running sidecar
    Stop,
    /// Show sidecar status
    Status,
    /// List the remote operations known to `call`
    Commands,
    /// Invoke one remote operation and print its result
    Call {
        /// Operation name, e.g. getRooms
        operation: String,

        /// Positional arguments; each is parsed as JSON when possible
        args: Vec<String>,

        /// Media control server address (overrides config and MCS_ADDRESS)
        #[arg(long)]
        address: Option<String>,
    },
}

/// Returns the path to the PID file.
fn pid_file_path() -> PathBuf {
    let state_dir = dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("mcsw");
    state_dir.join("mcswd.pid")
}

/// Returns the path to the log file used when daemonized.
fn log_file_path() -> PathBuf {
    let state_dir = dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("mcsw");
    state_dir.join("mcswd.log")
}

fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Returns the PID of a live sidecar, cleaning up a stale PID file.
fn running_pid() -> Option<u32> {
    let pid = read_pid()?;
    if is_process_running(pid) {
        return Some(pid);
    }
    remove_pid_file();
    None
}

fn send_sigterm(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

/// Loads the config file and applies environment overrides.
fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let mut config = Config::load(path.map(PathBuf::as_path))?;
    config.apply_process_env()?;
    Ok(config)
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("mcswd=info".parse()?)
                .add_directive("mcsw_core=info".parse()?)
                .add_directive("mcsw_protocol=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Parses arguments and runs the selected command.
pub fn run() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        address: None,
    });

    match command {
        Command::Start { daemon, address } => {
            let mut config = match load_config(args.config.as_ref()) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    process::exit(1);
                }
            };
            if address.is_some() {
                config.mcs_address = address;
            }
            if let Err(e) = config.require_address() {
                eprintln!("Error: {e}");
                process::exit(1);
            }

            if let Some(pid) = running_pid() {
                eprintln!("Sidecar is already running (PID {pid})");
                eprintln!("Use 'mcswd stop' to stop it first.");
                process::exit(1);
            }

            if daemon {
                // Fork before the tokio runtime exists
                daemonize()?;
            }

            write_pid()?;
            let status = run_sidecar(&config);
            remove_pid_file();

            match status {
                Ok(code) => process::exit(code),
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    process::exit(1);
                }
            }
        }
        Command::Stop => {
            let Some(pid) = running_pid() else {
                println!("Sidecar is not running.");
                return Ok(());
            };

            // Give the shutdown race its full failover deadline, plus a second.
            let failover = load_config(args.config.as_ref())
                .map(|c| c.shutdown_failover())
                .unwrap_or(crate::supervisor::DEFAULT_SHUTDOWN_FAILOVER);
            let deadline = failover + Duration::from_secs(1);

            println!("Stopping sidecar (PID {pid})...");
            send_sigterm(pid)?;

            let poll = Duration::from_millis(100);
            let mut waited = Duration::ZERO;
            while waited < deadline {
                if !is_process_running(pid) {
                    println!("Sidecar stopped.");
                    return Ok(());
                }
                std::thread::sleep(poll);
                waited += poll;
            }

            eprintln!("Sidecar did not stop within {} ms.", deadline.as_millis());
            process::exit(1);
        }
        Command::Status => {
            if let Some(pid) = running_pid() {
                println!("Sidecar is running (PID {pid})");
                if let Ok(config) = load_config(args.config.as_ref()) {
                    if let Some(address) = config.mcs_address {
                        println!("Server: {address}");
                    }
                }
                Ok(())
            } else {
                println!("Sidecar is not running.");
                process::exit(1);
            }
        }
        Command::Commands => {
            for spec in COMMANDS {
                println!("{:<48} {}", spec.usage(), spec.summary);
            }
            Ok(())
        }
        Command::Call {
            operation,
            args: call_args,
            address,
        } => {
            let mut config = load_config(args.config.as_ref())?;
            if address.is_some() {
                config.mcs_address = address;
            }
            let code = run_call(&config, &operation, &call_args)?;
            process::exit(code);
        }
    }
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")
}

/// Runs the sidecar and returns the process exit code.
fn run_sidecar(config: &Config) -> Result<i32> {
    init_logging()?;
    let runtime = build_runtime()?;

    let status = runtime.block_on(async {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            "mcsw sidecar starting"
        );
        sidecar::run(config).await
    });

    // Sessions that missed the failover deadline are abandoned here.
    runtime.shutdown_timeout(Duration::from_millis(100));
    Ok(status.code())
}

/// Connects, invokes one operation and prints the outcome.
fn run_call(config: &Config, operation: &str, raw_args: &[String]) -> Result<i32> {
    let Some(spec) = find_command(operation) else {
        eprintln!("Unknown operation: {operation}. See 'mcswd commands'.");
        return Ok(2);
    };
    let params = match spec.build_params(raw_args) {
        Ok(params) => params,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("usage: mcswd call {}", spec.usage());
            return Ok(2);
        }
    };
    let address = config.require_address()?.to_string();

    init_logging()?;
    let runtime = build_runtime()?;
    let link_config = config.link_config();

    runtime.block_on(async move {
        let (link, _task) = spawn_link(link_config, Arc::new(WsConnector));
        let connect = link.connect(address.as_str());
        if tokio::time::timeout(link_config.connect_timeout, connect).await.is_err()
            || !link.is_connected()
        {
            bail!("Could not connect to {address}");
        }

        match link.invoke(spec.name, params).await {
            Ok(result) => {
                println!("{}", serde_json::to_string_pretty(&result)?);
                Ok::<i32, anyhow::Error>(0)
            }
            Err(e) => {
                eprintln!("{}", serde_json::to_string_pretty(&e)?);
                Ok(1)
            }
        }
    })
}
