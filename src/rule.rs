//! Forwarding rule records
//! Parses and formats the colon-delimited records of the rule file

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while validating rule fields or parsing a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleParseError {
    #[error("expected 3 to 5 colon-delimited fields, found {0}")]
    FieldCount(usize),

    #[error("invalid port '{0}': must be 1-65535")]
    BadPort(String),

    #[error("invalid ip version '{0}': expected 'ipv4' or 'ipv6'")]
    BadIpVersion(String),

    #[error("invalid backend address '{0}'")]
    BadAddress(String),

    #[error("backend address '{addr}' is not an {version} address")]
    AddressFamily { addr: String, version: IpVersion },

    #[error("invalid status '{0}': expected 'active' or 'disable'")]
    BadStatus(String),
}

/// Address family the frontend binds on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IpVersion {
    #[serde(rename = "ipv4")]
    V4,
    #[serde(rename = "ipv6")]
    V6,
}

impl IpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersion::V4 => "ipv4",
            IpVersion::V6 => "ipv6",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for IpVersion {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipv4" => Ok(IpVersion::V4),
            "ipv6" => Ok(IpVersion::V6),
            other => Err(RuleParseError::BadIpVersion(other.to_string())),
        }
    }
}

/// Whether a rule is rendered into the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuleStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "disable")]
    Disable,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Active => "active",
            RuleStatus::Disable => "disable",
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RuleStatus {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RuleStatus::Active),
            "disable" => Ok(RuleStatus::Disable),
            other => Err(RuleParseError::BadStatus(other.to_string())),
        }
    }
}

/// One forwarding mapping from a listening port to a backend endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub front_port: u16,
    pub ip_version: IpVersion,
    pub backend_addr: IpAddr,
    pub back_port: u16,
    pub status: RuleStatus,
}

impl Rule {
    /// Build a rule, checking that the backend address matches the ip version
    pub fn new(
        front_port: u16,
        ip_version: IpVersion,
        backend_addr: IpAddr,
        back_port: u16,
        status: RuleStatus,
    ) -> Result<Self, RuleParseError> {
        let family_ok = match ip_version {
            IpVersion::V4 => backend_addr.is_ipv4(),
            IpVersion::V6 => backend_addr.is_ipv6(),
        };
        if !family_ok {
            return Err(RuleParseError::AddressFamily {
                addr: backend_addr.to_string(),
                version: ip_version,
            });
        }
        Ok(Self {
            front_port,
            ip_version,
            backend_addr,
            back_port,
            status,
        })
    }

    /// Parse one rule-file record.
    ///
    /// Accepted forms:
    /// - `front:version:addr:back:status` (canonical, always written)
    /// - `front:version:addr:back` (status defaults to `active`)
    /// - `front:addr:back` (legacy, defaults to `ipv4` + `active`)
    ///
    /// IPv6 backend addresses contain colons, so the canonical form is
    /// split positionally from both ends: the first two and last two
    /// fields delimit the address in the middle.
    pub fn parse_record(line: &str) -> Result<Self, RuleParseError> {
        let parts: Vec<&str> = line.trim().split(':').collect();

        let (front, version, addr, back, status) = match parts.len() {
            n if n < 3 => return Err(RuleParseError::FieldCount(n)),
            3 => (parts[0], "ipv4", parts[1], parts[2], "active"),
            4 => (parts[0], parts[1], parts[2], parts[3], "active"),
            n => {
                let addr = parts[2..n - 2].join(":");
                return Self::assemble(parts[0], parts[1], &addr, parts[n - 2], parts[n - 1]);
            }
        };

        Self::assemble(front, version, addr, back, status)
    }

    fn assemble(
        front: &str,
        version: &str,
        addr: &str,
        back: &str,
        status: &str,
    ) -> Result<Self, RuleParseError> {
        let front_port = parse_port(front)?;
        let ip_version: IpVersion = version.parse()?;
        let backend_addr = parse_address(addr, ip_version)?;
        let back_port = parse_port(back)?;
        let status: RuleStatus = status.parse()?;
        Rule::new(front_port, ip_version, backend_addr, back_port, status)
    }

    /// Canonical five-field record written to the rule file
    pub fn to_record(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.front_port, self.ip_version, self.backend_addr, self.back_port, self.status
        )
    }

    /// Backend endpoint as `addr:port`, bracketing IPv6 literals
    pub fn backend_endpoint(&self) -> String {
        match self.backend_addr {
            IpAddr::V4(addr) => format!("{}:{}", addr, self.back_port),
            IpAddr::V6(addr) => format!("[{}]:{}", addr, self.back_port),
        }
    }
}

/// Parse a port field, rejecting 0 and out-of-range values
pub fn parse_port(s: &str) -> Result<u16, RuleParseError> {
    match s.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(RuleParseError::BadPort(s.trim().to_string())),
        Ok(port) => Ok(port),
    }
}

/// Parse a backend address literal of the given family
pub fn parse_address(s: &str, version: IpVersion) -> Result<IpAddr, RuleParseError> {
    let addr: IpAddr = s
        .trim()
        .parse()
        .map_err(|_| RuleParseError::BadAddress(s.trim().to_string()))?;

    let family_ok = match version {
        IpVersion::V4 => addr.is_ipv4(),
        IpVersion::V6 => addr.is_ipv6(),
    };
    if !family_ok {
        return Err(RuleParseError::AddressFamily {
            addr: addr.to_string(),
            version,
        });
    }

    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_record() {
        let rule = Rule::parse_record("8080:ipv4:10.0.0.5:80:active").unwrap();
        assert_eq!(rule.front_port, 8080);
        assert_eq!(rule.ip_version, IpVersion::V4);
        assert_eq!(rule.backend_addr, "10.0.0.5".parse::<IpAddr>().unwrap());
        assert_eq!(rule.back_port, 80);
        assert_eq!(rule.status, RuleStatus::Active);
    }

    #[test]
    fn test_parse_ipv6_record() {
        let rule = Rule::parse_record("443:ipv6:2001:db8::1:8443:disable").unwrap();
        assert_eq!(rule.front_port, 443);
        assert_eq!(rule.ip_version, IpVersion::V6);
        assert_eq!(rule.backend_addr, "2001:db8::1".parse::<IpAddr>().unwrap());
        assert_eq!(rule.back_port, 8443);
        assert_eq!(rule.status, RuleStatus::Disable);
    }

    #[test]
    fn test_parse_legacy_three_field_record() {
        let rule = Rule::parse_record("9000:192.168.1.10:9001").unwrap();
        assert_eq!(rule.ip_version, IpVersion::V4);
        assert_eq!(rule.status, RuleStatus::Active);
        assert_eq!(rule.back_port, 9001);
    }

    #[test]
    fn test_parse_four_field_record_defaults_status() {
        let rule = Rule::parse_record("9000:ipv4:192.168.1.10:9001").unwrap();
        assert_eq!(rule.status, RuleStatus::Active);
    }

    #[test]
    fn test_record_round_trip() {
        for record in ["8080:ipv4:10.0.0.5:80:active", "443:ipv6:fd00::1:443:disable"] {
            let rule = Rule::parse_record(record).unwrap();
            assert_eq!(rule.to_record(), record);
        }
    }

    #[test]
    fn test_missing_back_port_is_an_error() {
        let err = Rule::parse_record("8080:ipv4").unwrap_err();
        assert_eq!(err, RuleParseError::FieldCount(2));
    }

    #[test]
    fn test_bad_port_values() {
        assert!(matches!(
            Rule::parse_record("0:ipv4:10.0.0.5:80:active"),
            Err(RuleParseError::BadPort(_))
        ));
        assert!(matches!(
            Rule::parse_record("70000:ipv4:10.0.0.5:80:active"),
            Err(RuleParseError::BadPort(_))
        ));
        assert!(matches!(parse_port("abc"), Err(RuleParseError::BadPort(_))));
    }

    #[test]
    fn test_bad_version_token() {
        assert!(matches!(
            Rule::parse_record("8080:ip4:10.0.0.5:80:active"),
            Err(RuleParseError::BadIpVersion(_))
        ));
    }

    #[test]
    fn test_address_family_mismatch() {
        assert!(matches!(
            Rule::parse_record("8080:ipv6:10.0.0.5:80:active"),
            Err(RuleParseError::AddressFamily { .. })
        ));
        assert!(matches!(
            parse_address("fd00::1", IpVersion::V4),
            Err(RuleParseError::AddressFamily { .. })
        ));
    }

    #[test]
    fn test_malformed_address_octets() {
        assert!(matches!(
            Rule::parse_record("8080:ipv4:10.0.0.300:80:active"),
            Err(RuleParseError::BadAddress(_))
        ));
    }

    #[test]
    fn test_backend_endpoint_brackets_ipv6() {
        let v4 = Rule::parse_record("8080:ipv4:10.0.0.5:80:active").unwrap();
        assert_eq!(v4.backend_endpoint(), "10.0.0.5:80");

        let v6 = Rule::parse_record("443:ipv6:fd00::1:8443:active").unwrap();
        assert_eq!(v6.backend_endpoint(), "[fd00::1]:8443");
    }
}
