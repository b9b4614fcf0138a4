//! RustFwd - Main entry point
//!
//! Interactive manager for HAProxy TCP forwarding rules

use anyhow::{Context, Result};
use clap::Parser;
use rustfwd::lock::LockError;
use rustfwd::{
    ConfigPublisher, ForwardManager, HaproxyCheck, InstanceLock, Menu, RuleStore, ServiceManager,
};
use std::io;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// RustFwd - manage HAProxy TCP forwarding rules
#[derive(Parser, Debug)]
#[command(name = "rustfwd")]
#[command(author = "RustFwd Contributors")]
#[command(version = "1.0.0")]
#[command(about = "Manage HAProxy TCP forwarding rules with validated, atomic config deployment")]
struct Args {
    /// Rule file path
    #[arg(long, env = "RULES_FILE", default_value = "/etc/rustfwd/rules.list")]
    rules_file: PathBuf,

    /// Live haproxy configuration path
    #[arg(long, env = "HAPROXY_CONFIG", default_value = "/etc/haproxy/haproxy.cfg")]
    config_file: PathBuf,

    /// Directory for timestamped configuration backups
    #[arg(long, env = "BACKUP_DIR", default_value = "/etc/haproxy/backup")]
    backup_dir: PathBuf,

    /// haproxy binary used for syntax checking
    #[arg(long, env = "HAPROXY_BIN", default_value = "haproxy")]
    haproxy_bin: PathBuf,

    /// systemd unit to control
    #[arg(long, env = "HAPROXY_SERVICE", default_value = "haproxy")]
    service: String,

    /// Lock file guarding against concurrent instances
    #[arg(long, env = "LOCK_FILE", default_value = "/run/rustfwd.lock")]
    lock_file: PathBuf,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting RustFwd v1.0.0");

    // One instance at a time; fail fast instead of queueing.
    let _lock = match InstanceLock::acquire(&args.lock_file) {
        Ok(lock) => lock,
        Err(LockError::AlreadyHeld(path)) => {
            eprintln!("another instance is already running (lock: {})", path.display());
            std::process::exit(1);
        }
        Err(err) => {
            return Err(err).with_context(|| {
                format!("cannot acquire instance lock {}", args.lock_file.display())
            })
        }
    };

    if !rustfwd::install::daemon_present(&args.haproxy_bin) {
        warn!(
            binary = %args.haproxy_bin.display(),
            "haproxy binary not found; use the install option before applying rules"
        );
    }

    let store = RuleStore::open(&args.rules_file)
        .with_context(|| format!("cannot open rule store {}", args.rules_file.display()))?;
    info!("Rule store at: {}", args.rules_file.display());

    let publisher = ConfigPublisher::new(
        &args.config_file,
        &args.backup_dir,
        "haproxy",
        HaproxyCheck::new(&args.haproxy_bin),
    );
    info!("Managing configuration at: {}", args.config_file.display());

    let manager = ForwardManager::new(store, publisher);
    let service = ServiceManager::new(&args.service);

    let menu = Menu::new(&manager, &service, args.haproxy_bin.clone());
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();

    menu.run(&mut input, &mut out)
}
