//! Configuration rendering
//! Pure translation of the rule list into haproxy frontend/backend blocks

use crate::rule::{IpVersion, Rule, RuleStatus};

/// Health check interval applied to every backend server, in milliseconds
pub const CHECK_INTER_MS: u32 = 2000;
/// Consecutive successful checks before a server is considered up
pub const CHECK_RISE: u32 = 2;
/// Consecutive failed checks before a server is considered down
pub const CHECK_FALL: u32 = 3;

/// Marker separating the operator-owned preamble from generated blocks.
/// Everything below this line is rewritten on every regeneration.
pub const MANAGED_MARKER: &str =
    "# --- rustfwd managed forwarding rules: do not edit below this line ---";

/// Global/defaults preamble used when no live configuration exists yet
pub const DEFAULT_PREAMBLE: &str = "\
global
    log /dev/log local0
    maxconn 4096
    daemon

defaults
    log global
    mode tcp
    option tcplog
    option dontlognull
    timeout connect 5000ms
    timeout client 50000ms
    timeout server 50000ms
";

/// Extract the preamble above the managed marker from a live configuration.
/// Returns `None` when the file carries no marker (e.g. a hand-written
/// config from before this tool managed it).
pub fn extract_preamble(live: &str) -> Option<String> {
    let mut preamble = String::new();

    for line in live.lines() {
        if line.trim() == MANAGED_MARKER {
            return Some(preamble);
        }
        preamble.push_str(line);
        preamble.push('\n');
    }

    None
}

/// Render the full configuration document: preamble, marker, then one
/// frontend/backend pair per active rule. Deterministic and side-effect
/// free; disabled rules are retained in the store but not rendered.
pub fn render(preamble: &str, rules: &[Rule]) -> String {
    let mut out = String::with_capacity(preamble.len() + rules.len() * 256);

    out.push_str(preamble.trim_end());
    out.push_str("\n\n");
    out.push_str(MANAGED_MARKER);
    out.push('\n');

    for rule in rules.iter().filter(|r| r.status == RuleStatus::Active) {
        out.push('\n');
        render_pair(&mut out, rule);
    }

    out
}

fn render_pair(out: &mut String, rule: &Rule) {
    let port = rule.front_port;

    // An ipv6 rule must not bind only the ipv4 wildcard; v4v6 gives the
    // dual-stack listener.
    let bind = match rule.ip_version {
        IpVersion::V4 => format!("0.0.0.0:{}", port),
        IpVersion::V6 => format!("[::]:{} v4v6", port),
    };

    out.push_str(&format!("frontend front_{}\n", port));
    out.push_str(&format!("    bind {}\n", bind));
    out.push_str("    mode tcp\n");
    out.push_str(&format!("    default_backend back_{}\n", port));
    out.push('\n');
    out.push_str(&format!("backend back_{}\n", port));
    out.push_str("    mode tcp\n");
    out.push_str("    balance roundrobin\n");
    out.push_str("    option tcp-check\n");
    out.push_str(&format!(
        "    server srv_{} {} check inter {} rise {} fall {}\n",
        port,
        rule.backend_endpoint(),
        CHECK_INTER_MS,
        CHECK_RISE,
        CHECK_FALL
    ));
}
