//! Name verification against the server salt, plus the account checks
//! that run during login.

use std::net::IpAddr;

use md5::{Digest, Md5};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How strictly names must match their verification token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyNames {
    /// Every connection must present a valid token.
    Always,
    /// Returning IPs and loopback connections are trusted.
    #[default]
    Balanced,
    /// Unverified players are admitted with a warning.
    Never,
}

/// Result of applying the verification policy to one login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    AcceptedLoopback,
    AcceptedLan,
    AcceptedReturningIp,
    AdmittedUnverified,
    Rejected,
}

impl VerificationOutcome {
    pub fn is_admitted(self) -> bool {
        self != Self::Rejected
    }

    /// How a player got in without a valid token, for the suspicious log.
    /// `None` when the token checked out or the login was refused.
    pub fn unverified_admission(self) -> Option<&'static str> {
        match self {
            Self::AcceptedLoopback => Some("connecting from loopback"),
            Self::AcceptedLan => Some("connecting from the LAN"),
            Self::AcceptedReturningIp => Some("returning from a known IP"),
            Self::AdmittedUnverified => Some("verification is not enforced"),
            Self::Verified | Self::Rejected => None,
        }
    }
}

/// Apply `policy` to a login attempt.
pub fn resolve(
    policy: VerifyNames,
    token_valid: bool,
    ip: IpAddr,
    allow_unverified_lan: bool,
    returning_ip: bool,
) -> VerificationOutcome {
    if token_valid {
        return VerificationOutcome::Verified;
    }
    if ip.is_loopback() && policy != VerifyNames::Always {
        return VerificationOutcome::AcceptedLoopback;
    }
    if allow_unverified_lan && is_lan(ip) {
        return VerificationOutcome::AcceptedLan;
    }
    if returning_ip && policy != VerifyNames::Always {
        return VerificationOutcome::AcceptedReturningIp;
    }
    match policy {
        VerifyNames::Never => VerificationOutcome::AdmittedUnverified,
        VerifyNames::Always | VerifyNames::Balanced => VerificationOutcome::Rejected,
    }
}

/// Private, link-local or unique-local address.
pub fn is_lan(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Checks tokens of the form `md5(salt ++ name)`.
#[derive(Debug, Clone)]
pub struct NameVerifier {
    salt: String,
}

impl NameVerifier {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Fresh 16-character alphanumeric salt.
    pub fn random() -> Self {
        let salt: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        Self::new(salt)
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn token_for(&self, name: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(name.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Some clients drop leading zeros from the hex digest.
    pub fn verify(&self, name: &str, token: &str) -> bool {
        let expected = self.token_for(name);
        let token = token.trim().to_ascii_lowercase();
        !token.is_empty() && expected.trim_start_matches('0') == token.trim_start_matches('0')
    }
}

/// 2 to 16 characters of letters, digits, `_` and `.`; or an account email.
pub fn is_valid_name(name: &str) -> bool {
    if name.contains('@') {
        return is_valid_email(name);
    }
    (2..=16).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn is_valid_email(name: &str) -> bool {
    let Some((local, domain)) = name.split_once('@') else {
        return false;
    };
    let allowed = |c: char| c.is_ascii_alphanumeric() || "._-+".contains(c);
    name.len() <= 64
        && !local.is_empty()
        && local.chars().all(allowed)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Paid-account check used when the server only admits paid players.
pub trait AccountStatus: Send + Sync {
    fn is_paid(&self, name: &str) -> Result<bool, String>;
}

/// Treats every account as paid.
pub struct AssumePaid;

impl AccountStatus for AssumePaid {
    fn is_paid(&self, _name: &str) -> Result<bool, String> {
        Ok(true)
    }
}
