//! CLI tool for managing forwarding rules
//!
//! Usage:
//!   rustfwd-rule add <front-port> <backend-addr> <backend-port> [options]
//!   rustfwd-rule delete (--port <port> | --position <pos>)
//!   rustfwd-rule list [--json]
//!   rustfwd-rule clear --yes
//!   rustfwd-rule regen
//!   rustfwd-rule status

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustfwd::lock::LockError;
use rustfwd::{
    ApplyError, ApplyOutcome, ConfigPublisher, ForwardManager, HaproxyCheck, InstanceLock,
    IpVersion, PublishError, Rule, RuleStatus, RuleStore, ServiceManager, ServiceState,
};
use std::path::PathBuf;

/// CLI tool for managing HAProxy forwarding rules
#[derive(Parser, Debug)]
#[command(name = "rustfwd-rule")]
#[command(author = "RustFwd Contributors")]
#[command(version = "1.0.0")]
#[command(about = "Manage forwarding rules for RustFwd")]
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

    /// Skip the service reload after a successful mutation
    #[arg(long)]
    no_reload: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a forwarding rule
    Add {
        /// Listening port (unique across rules)
        front_port: u16,

        /// Backend address (IPv4 or IPv6 literal)
        backend_addr: String,

        /// Backend port
        backend_port: u16,

        /// IP version of the frontend bind (ipv4 or ipv6)
        #[arg(short = 'v', long, default_value = "ipv4")]
        ip_version: String,

        /// Persist the rule without rendering it into the configuration
        #[arg(long)]
        disable: bool,
    },

    /// Delete a forwarding rule
    Delete {
        /// Front port of the rule to delete
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// 1-based listing position of the rule to delete
        #[arg(long, conflicts_with = "port")]
        position: Option<usize>,
    },

    /// List all rules
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete every rule
    Clear {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },

    /// Re-render and publish the configuration from the current rules
    Regen,

    /// Report daemon service state
    Status,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let store = RuleStore::open(&args.rules_file)
        .with_context(|| format!("cannot open rule store {}", args.rules_file.display()))?;
    let publisher = ConfigPublisher::new(
        &args.config_file,
        &args.backup_dir,
        "haproxy",
        HaproxyCheck::new(&args.haproxy_bin),
    );
    let manager = ForwardManager::new(store, publisher);
    let service = ServiceManager::new(&args.service);

    match args.command {
        Commands::Add {
            front_port,
            backend_addr,
            backend_port,
            ip_version,
            disable,
        } => {
            let _lock = acquire_lock(&args.lock_file)?;

            let ip_version: IpVersion = ip_version
                .parse()
                .map_err(|err| anyhow::anyhow!("{err}"))?;
            let backend_addr = rustfwd::rule::parse_address(&backend_addr, ip_version)
                .map_err(|err| anyhow::anyhow!("{err}"))?;
            let status = if disable { RuleStatus::Disable } else { RuleStatus::Active };

            let rule = Rule::new(front_port, ip_version, backend_addr, backend_port, status)
                .map_err(|err| anyhow::anyhow!("{err}"))?;

            match manager.add_rule(rule.clone()) {
                Ok(outcome) => {
                    println!("Added rule:");
                    print_rule(&rule);
                    report_outcome(&outcome);
                    reload(&service, args.no_reload);
                }
                Err(err) => fail(err),
            }
        }

        Commands::Delete { port, position } => {
            let _lock = acquire_lock(&args.lock_file)?;

            let result = match (port, position) {
                (Some(port), None) => manager.delete_port(port),
                (None, Some(pos)) => manager.delete_at(pos),
                _ => {
                    eprintln!("specify exactly one of --port or --position");
                    std::process::exit(2);
                }
            };

            match result {
                Ok((removed, outcome)) => {
                    println!("Deleted rule for front port {}", removed.front_port);
                    report_outcome(&outcome);
                    reload(&service, args.no_reload);
                }
                Err(err) => fail(err),
            }
        }

        Commands::List { json } => {
            let rules = manager.rules().context("cannot read rule store")?;

            if rules.is_empty() {
                if json {
                    println!("[]");
                } else {
                    println!("No rules found");
                }
                return Ok(());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
            } else {
                println!(
                    "{:<5} {:<12} {:<8} {:<40} {:<8}",
                    "POS", "FRONT_PORT", "VERSION", "BACKEND", "STATUS"
                );
                println!("{}", "-".repeat(75));
                for (idx, rule) in rules.iter().enumerate() {
                    println!(
                        "{:<5} {:<12} {:<8} {:<40} {:<8}",
                        idx + 1,
                        rule.front_port,
                        rule.ip_version,
                        rule.backend_endpoint(),
                        rule.status
                    );
                }
                println!("\nTotal: {} rule(s)", rules.len());
            }
        }

        Commands::Clear { yes } => {
            if !yes {
                eprintln!("refusing to delete all rules without --yes");
                std::process::exit(2);
            }

            let _lock = acquire_lock(&args.lock_file)?;

            match manager.clear() {
                Ok(outcome) => {
                    println!("All rules cleared");
                    report_outcome(&outcome);
                    reload(&service, args.no_reload);
                }
                Err(err) => fail(err),
            }
        }

        Commands::Regen => {
            let _lock = acquire_lock(&args.lock_file)?;

            match manager.regenerate() {
                Ok(outcome) => {
                    println!("Configuration regenerated");
                    report_outcome(&outcome);
                    reload(&service, args.no_reload);
                }
                Err(err) => fail(err),
            }
        }

        Commands::Status => match service.status() {
            Ok(state) => println!("{} is {}", service.unit(), state.as_str()),
            Err(err) => {
                eprintln!("cannot query service: {err}");
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

/// Mutating commands hold the same instance lock as the interactive tool
fn acquire_lock(path: &PathBuf) -> Result<InstanceLock> {
    match InstanceLock::acquire(path) {
        Ok(lock) => Ok(lock),
        Err(LockError::AlreadyHeld(path)) => {
            eprintln!("another instance is already running (lock: {})", path.display());
            std::process::exit(1);
        }
        Err(err) => Err(err).with_context(|| format!("cannot acquire lock {}", path.display())),
    }
}

fn print_rule(rule: &Rule) {
    println!("  Front port:  {}", rule.front_port);
    println!("  IP version:  {}", rule.ip_version);
    println!("  Backend:     {}", rule.backend_endpoint());
    println!("  Status:      {}", rule.status);
}

fn report_outcome(outcome: &ApplyOutcome) {
    if let Some(backup) = &outcome.backup {
        println!("Previous configuration backed up to {}", backup.display());
    }
    println!("{} active rule(s) rendered", outcome.active_rules);
}

fn reload(service: &ServiceManager, skip: bool) {
    if skip {
        return;
    }
    match service.reload() {
        Ok(ServiceState::Active) => println!("{} reloaded", service.unit()),
        Ok(ServiceState::Inactive) => {
            println!("configuration is live, but {} is not running", service.unit())
        }
        Err(err) => eprintln!("configuration is live, but the reload failed: {err}"),
    }
}

fn fail(err: ApplyError) -> ! {
    match &err {
        ApplyError::Publish(PublishError::Rejected { diagnostics }) => {
            eprintln!("syntax check rejected the configuration; nothing was changed");
            if !diagnostics.is_empty() {
                eprintln!("{diagnostics}");
            }
        }
        other => eprintln!("{other}"),
    }
    std::process::exit(1);
}
