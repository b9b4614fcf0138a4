//! Interactive control menu
//! Blocking numbered menu mapping operator choices onto the pipeline

use crate::check::ConfigCheck;
use crate::install;
use crate::manager::{ApplyError, ApplyOutcome, ForwardManager};
use crate::publish::PublishError;
use crate::rule::{parse_address, parse_port, IpVersion, Rule, RuleStatus};
use crate::service::{ServiceManager, ServiceState};
use crate::store::StoreError;
use anyhow::Result;
use std::io::{BufRead, Write};
use std::path::PathBuf;

const MENU: &str = "
rustfwd - haproxy TCP forwarding manager
----------------------------------------
 1) Show forwarding rules
 2) Add forwarding rule
 3) Delete forwarding rule
 4) Clear all rules
 5) Regenerate configuration
 6) Restart haproxy
 7) Reload haproxy
 8) Start haproxy
 9) Stop haproxy
10) Service status
11) Install haproxy
 0) Quit
";

/// Interactive menu over the forwarding pipeline and service control.
///
/// Generic over its input/output streams; the binary wires stdin/stdout,
/// tests drive it with byte buffers.
pub struct Menu<'a, C> {
    manager: &'a ForwardManager<C>,
    service: &'a ServiceManager,
    daemon_binary: PathBuf,
}

impl<'a, C: ConfigCheck> Menu<'a, C> {
    pub fn new(
        manager: &'a ForwardManager<C>,
        service: &'a ServiceManager,
        daemon_binary: PathBuf,
    ) -> Self {
        Self {
            manager,
            service,
            daemon_binary,
        }
    }

    /// Run the menu loop until the operator quits or input reaches EOF
    pub fn run<R: BufRead, W: Write>(&self, input: &mut R, out: &mut W) -> Result<()> {
        loop {
            out.write_all(MENU.as_bytes())?;
            let Some(choice) = prompt(input, out, "Select an option: ")? else {
                break;
            };

            match choice.as_str() {
                "1" => self.show_rules(out)?,
                "2" => self.add_rule(input, out)?,
                "3" => self.delete_rule(input, out)?,
                "4" => self.clear_rules(input, out)?,
                "5" => self.regenerate(out)?,
                "6" => self.service_action(out, "restart")?,
                "7" => self.service_action(out, "reload")?,
                "8" => self.service_action(out, "start")?,
                "9" => self.service_action(out, "stop")?,
                "10" => self.service_status(out)?,
                "11" => self.install_daemon(out)?,
                "0" | "q" => break,
                "" => {}
                other => writeln!(out, "Unknown option '{}'", other)?,
            }
        }

        writeln!(out, "Bye.")?;
        Ok(())
    }

    fn show_rules<W: Write>(&self, out: &mut W) -> Result<()> {
        let rules = match self.manager.rules() {
            Ok(rules) => rules,
            Err(err) => {
                writeln!(out, "Cannot read rule store: {}", err)?;
                return Ok(());
            }
        };

        if rules.is_empty() {
            writeln!(out, "No forwarding rules defined.")?;
            return Ok(());
        }

        writeln!(
            out,
            "{:<5} {:<12} {:<8} {:<40} {:<8}",
            "POS", "FRONT PORT", "VERSION", "BACKEND", "STATUS"
        )?;
        writeln!(out, "{}", "-".repeat(75))?;
        for (idx, rule) in rules.iter().enumerate() {
            writeln!(
                out,
                "{:<5} {:<12} {:<8} {:<40} {:<8}",
                idx + 1,
                rule.front_port,
                rule.ip_version,
                rule.backend_endpoint(),
                rule.status
            )?;
        }
        writeln!(out, "\nTotal: {} rule(s)", rules.len())?;
        Ok(())
    }

    fn add_rule<R: BufRead, W: Write>(&self, input: &mut R, out: &mut W) -> Result<()> {
        let Some(front_port) = ask(input, out, "Front port: ", parse_port)? else {
            return Ok(());
        };

        let Some(ip_version) = ask(input, out, "IP version (ipv4/ipv6) [ipv4]: ", |s| {
            if s.is_empty() {
                Ok(IpVersion::V4)
            } else {
                s.parse()
            }
        })?
        else {
            return Ok(());
        };

        let Some(backend_addr) = ask(input, out, "Backend address: ", |s| {
            parse_address(s, ip_version)
        })?
        else {
            return Ok(());
        };

        let Some(back_port) = ask(input, out, "Backend port: ", parse_port)? else {
            return Ok(());
        };

        let Some(status) = ask(input, out, "Status (active/disable) [active]: ", |s| {
            if s.is_empty() {
                Ok(RuleStatus::Active)
            } else {
                s.parse()
            }
        })?
        else {
            return Ok(());
        };

        let rule = match Rule::new(front_port, ip_version, backend_addr, back_port, status) {
            Ok(rule) => rule,
            Err(err) => {
                writeln!(out, "Invalid rule: {}", err)?;
                return Ok(());
            }
        };

        match self.manager.add_rule(rule) {
            Ok(outcome) => {
                writeln!(out, "Rule added for front port {}.", front_port)?;
                self.report_publish(out, &outcome)?;
                self.reload_after_publish(out)?;
            }
            Err(err) => self.report_apply_error(out, err, "rule was not added")?,
        }
        Ok(())
    }

    fn delete_rule<R: BufRead, W: Write>(&self, input: &mut R, out: &mut W) -> Result<()> {
        self.show_rules(out)?;

        let Some(pos) = ask(input, out, "Delete which position: ", |s| {
            s.parse::<usize>().map_err(|_| format!("invalid position '{}'", s))
        })?
        else {
            return Ok(());
        };

        match self.manager.delete_at(pos) {
            Ok((removed, outcome)) => {
                writeln!(out, "Deleted rule for front port {}.", removed.front_port)?;
                self.report_publish(out, &outcome)?;
                self.reload_after_publish(out)?;
            }
            Err(err) => self.report_apply_error(out, err, "no rule was deleted")?,
        }
        Ok(())
    }

    fn clear_rules<R: BufRead, W: Write>(&self, input: &mut R, out: &mut W) -> Result<()> {
        let Some(answer) = prompt(input, out, "Really delete ALL rules? [y/N]: ")? else {
            return Ok(());
        };
        if !answer.eq_ignore_ascii_case("y") {
            writeln!(out, "Aborted.")?;
            return Ok(());
        }

        match self.manager.clear() {
            Ok(outcome) => {
                writeln!(out, "All rules cleared.")?;
                self.report_publish(out, &outcome)?;
                self.reload_after_publish(out)?;
            }
            Err(err) => self.report_apply_error(out, err, "rules were not cleared")?,
        }
        Ok(())
    }

    fn regenerate<W: Write>(&self, out: &mut W) -> Result<()> {
        match self.manager.regenerate() {
            Ok(outcome) => {
                writeln!(out, "Configuration regenerated.")?;
                self.report_publish(out, &outcome)?;
                self.reload_after_publish(out)?;
            }
            Err(err) => self.report_apply_error(out, err, "configuration unchanged")?,
        }
        Ok(())
    }

    fn service_action<W: Write>(&self, out: &mut W, action: &str) -> Result<()> {
        let result = match action {
            "restart" => self.service.restart(),
            "reload" => self.service.reload(),
            "start" => self.service.start(),
            "stop" => self.service.stop(),
            _ => unreachable!("unknown service action"),
        };

        match result {
            Ok(state) => writeln!(
                out,
                "{} {}: service is now {}",
                self.service.unit(),
                action,
                state.as_str()
            )?,
            Err(err) => writeln!(out, "Service control failed: {}", err)?,
        }
        Ok(())
    }

    fn service_status<W: Write>(&self, out: &mut W) -> Result<()> {
        match self.service.status() {
            Ok(state) => writeln!(out, "{} is {}", self.service.unit(), state.as_str())?,
            Err(err) => writeln!(out, "Cannot query service: {}", err)?,
        }
        Ok(())
    }

    fn install_daemon<W: Write>(&self, out: &mut W) -> Result<()> {
        if install::daemon_present(&self.daemon_binary) {
            writeln!(out, "haproxy is already installed.")?;
            return Ok(());
        }

        match install::install_daemon() {
            Ok(()) => writeln!(out, "haproxy installed.")?,
            Err(err) => writeln!(out, "Installation failed: {}", err)?,
        }
        Ok(())
    }

    fn report_publish<W: Write>(&self, out: &mut W, outcome: &ApplyOutcome) -> Result<()> {
        if let Some(backup) = &outcome.backup {
            writeln!(out, "Previous configuration backed up to {}.", backup.display())?;
        }
        writeln!(out, "{} active rule(s) rendered.", outcome.active_rules)?;
        Ok(())
    }

    /// Reload after a successful publish. A failure here is a distinct
    /// terminal-step problem: the configuration is valid and live, but the
    /// daemon has not picked it up yet.
    fn reload_after_publish<W: Write>(&self, out: &mut W) -> Result<()> {
        match self.service.reload() {
            Ok(ServiceState::Active) => writeln!(out, "haproxy reloaded.")?,
            Ok(ServiceState::Inactive) => writeln!(
                out,
                "Configuration is live, but {} is not running. Start it to apply.",
                self.service.unit()
            )?,
            Err(err) => writeln!(
                out,
                "Configuration is live, but the reload failed: {}. Retry from the service menu.",
                err
            )?,
        }
        Ok(())
    }

    fn report_apply_error<W: Write>(
        &self,
        out: &mut W,
        err: ApplyError,
        consequence: &str,
    ) -> Result<()> {
        match err {
            ApplyError::Store(StoreError::DuplicatePort(port)) => {
                writeln!(out, "A rule for front port {} already exists; {}.", port, consequence)?;
            }
            ApplyError::Publish(PublishError::Rejected { diagnostics }) => {
                writeln!(
                    out,
                    "Syntax check rejected the new configuration; {}. Live configuration is unchanged.",
                    consequence
                )?;
                if !diagnostics.is_empty() {
                    writeln!(out, "--- checker output ---")?;
                    writeln!(out, "{}", diagnostics)?;
                }
            }
            other => writeln!(out, "Operation failed: {}; {}.", other, consequence)?,
        }
        Ok(())
    }
}

/// Print a prompt and read one trimmed line; `None` on EOF
fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, msg: &str) -> Result<Option<String>> {
    out.write_all(msg.as_bytes())?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Prompt until the parser accepts the answer, re-prompting on bad input;
/// `None` on EOF
fn ask<R, W, T, E, F>(input: &mut R, out: &mut W, msg: &str, parse: F) -> Result<Option<T>>
where
    R: BufRead,
    W: Write,
    E: std::fmt::Display,
    F: Fn(&str) -> std::result::Result<T, E>,
{
    loop {
        let Some(answer) = prompt(input, out, msg)? else {
            return Ok(None);
        };
        match parse(&answer) {
            Ok(value) => return Ok(Some(value)),
            Err(err) => writeln!(out, "  {}", err)?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{CheckError, CheckReport};
    use crate::publish::ConfigPublisher;
    use crate::store::RuleStore;
    use std::io::Cursor;
    use std::path::Path;
    use tempfile::tempdir;

    struct StubCheck {
        passed: bool,
    }

    impl ConfigCheck for StubCheck {
        fn check(&self, _candidate: &Path) -> Result<CheckReport, CheckError> {
            Ok(CheckReport {
                passed: self.passed,
                output: if self.passed { String::new() } else { "bad config".into() },
            })
        }
    }

    fn fixture(dir: &Path, passed: bool) -> (ForwardManager<StubCheck>, ServiceManager) {
        let store = RuleStore::open(dir.join("rules.list")).unwrap();
        let publisher = ConfigPublisher::new(
            dir.join("haproxy.cfg"),
            dir.join("backup"),
            "haproxy",
            StubCheck { passed },
        );
        (
            ForwardManager::new(store, publisher),
            // `true` succeeds for every verb so tests never touch systemd.
            ServiceManager::with_command("haproxy", "true"),
        )
    }

    fn run_menu(manager: &ForwardManager<StubCheck>, service: &ServiceManager, script: &str) -> String {
        let menu = Menu::new(manager, service, PathBuf::from("true"));
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut out = Vec::new();
        menu.run(&mut input, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_quit_immediately() {
        let dir = tempdir().unwrap();
        let (manager, service) = fixture(dir.path(), true);

        let out = run_menu(&manager, &service, "0\n");
        assert!(out.contains("Bye."));
    }

    #[test]
    fn test_eof_quits_gracefully() {
        let dir = tempdir().unwrap();
        let (manager, service) = fixture(dir.path(), true);

        let out = run_menu(&manager, &service, "");
        assert!(out.contains("Bye."));
    }

    #[test]
    fn test_add_rule_with_defaults() {
        let dir = tempdir().unwrap();
        let (manager, service) = fixture(dir.path(), true);

        // front port, default version, address, back port, default status.
        let out = run_menu(&manager, &service, "2\n8080\n\n10.0.0.5\n80\n\n0\n");
        assert!(out.contains("Rule added for front port 8080."));

        let rules = manager.rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].ip_version, IpVersion::V4);
        assert_eq!(rules[0].status, RuleStatus::Active);
    }

    #[test]
    fn test_bad_input_reprompts_until_valid() {
        let dir = tempdir().unwrap();
        let (manager, service) = fixture(dir.path(), true);

        // Port 0 and junk are rejected, then a valid port is accepted.
        let out = run_menu(
            &manager,
            &service,
            "2\n0\nxyz\n8080\n\n10.0.0.999\n10.0.0.5\n80\n\n0\n",
        );
        assert!(out.contains("must be 1-65535"));
        assert!(out.contains("invalid backend address"));
        assert_eq!(manager.rules().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_add_reports_and_keeps_store() {
        let dir = tempdir().unwrap();
        let (manager, service) = fixture(dir.path(), true);

        let script = "2\n8080\n\n10.0.0.5\n80\n\n2\n8080\n\n10.0.0.6\n81\n\n0\n";
        let out = run_menu(&manager, &service, script);
        assert!(out.contains("already exists"));
        assert_eq!(manager.rules().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_by_position() {
        let dir = tempdir().unwrap();
        let (manager, service) = fixture(dir.path(), true);

        let script = "2\n8080\n\n10.0.0.5\n80\n\n2\n9090\n\n10.0.0.6\n90\n\n3\n1\n0\n";
        let out = run_menu(&manager, &service, script);
        assert!(out.contains("Deleted rule for front port 8080."));

        let rules = manager.rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].front_port, 9090);
    }

    #[test]
    fn test_clear_requires_confirmation() {
        let dir = tempdir().unwrap();
        let (manager, service) = fixture(dir.path(), true);

        let script = "2\n8080\n\n10.0.0.5\n80\n\n4\nn\n4\ny\n0\n";
        let out = run_menu(&manager, &service, script);
        assert!(out.contains("Aborted."));
        assert!(out.contains("All rules cleared."));
        assert!(manager.rules().unwrap().is_empty());
    }

    #[test]
    fn test_rejected_config_reported_with_diagnostics() {
        let dir = tempdir().unwrap();
        let (manager, service) = fixture(dir.path(), false);

        let out = run_menu(&manager, &service, "2\n8080\n\n10.0.0.5\n80\n\n0\n");
        assert!(out.contains("Syntax check rejected"));
        assert!(out.contains("bad config"));
        assert!(manager.rules().unwrap().is_empty());
    }

    #[test]
    fn test_show_rules_lists_positions() {
        let dir = tempdir().unwrap();
        let (manager, service) = fixture(dir.path(), true);

        let script = "2\n8080\n\n10.0.0.5\n80\n\n1\n0\n";
        let out = run_menu(&manager, &service, script);
        assert!(out.contains("Total: 1 rule(s)"));
        assert!(out.contains("8080"));
        assert!(out.contains("10.0.0.5:80"));
    }

    #[test]
    fn test_unknown_option_reported() {
        let dir = tempdir().unwrap();
        let (manager, service) = fixture(dir.path(), true);

        let out = run_menu(&manager, &service, "42\n0\n");
        assert!(out.contains("Unknown option '42'"));
    }
}
