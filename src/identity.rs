//! Canonical forms for externally supplied identifiers.
//!
//! Every value that can become a store key or part of a signed claim passes
//! through here before any transaction opens. All functions are pure.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a machine fingerprint (hex-encoded SHA-256).
pub const MACHINE_ID_LEN: usize = 64;
/// Upper bound on a license code accepted from a client.
pub const LICENSE_CODE_MAX_LEN: usize = 64;
/// Machine info is advisory only and silently truncated to this many chars.
pub const MACHINE_INFO_MAX_CHARS: usize = 256;
const EMAIL_MAX_LEN: usize = 254;

/// A field failed validation. The field name is for logs only.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid {field}")]
pub struct InvalidFormat {
    pub field: &'static str,
}

impl InvalidFormat {
    const fn new(field: &'static str) -> Self {
        Self { field }
    }
}

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype!(
    /// Lower-cased, syntactically valid email address.
    Email
);
string_newtype!(
    /// 64 lower-case hex chars.
    MachineId
);
string_newtype!(
    /// Lower-case alphanumeric license code.
    LicenseCode
);
string_newtype!(
    /// Document key for a user's licenses, derived from product id and email.
    UserId
);

impl LicenseCode {
    /// Wraps a code produced by the server's own generator.
    pub(crate) fn from_generated(code: String) -> Self {
        debug_assert!(code.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
        Self(code)
    }
}

/// Parse a single address and lower-case it.
///
/// Accepts a bare `local@domain` or a display-name form `Name <local@domain>`.
/// Address lists, comments, quoted local parts and IP-literal domains are
/// rejected.
pub fn canonicalize_email(raw: &str) -> Result<Email, InvalidFormat> {
    const ERR: InvalidFormat = InvalidFormat::new("email");

    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains(',') {
        return Err(ERR);
    }

    let addr = match (trimmed.rfind('<'), trimmed.strip_suffix('>')) {
        (Some(open), Some(inner)) => {
            let name = trimmed[..open].trim();
            if name.contains(['<', '>', '@']) {
                return Err(ERR);
            }
            &inner[open + 1..]
        }
        (None, None) => trimmed,
        _ => return Err(ERR),
    };

    if addr.len() > EMAIL_MAX_LEN {
        return Err(ERR);
    }

    let (local, domain) = addr.split_once('@').ok_or(ERR)?;
    if domain.contains('@') || !is_valid_local_part(local) || !is_valid_domain(domain) {
        return Err(ERR);
    }

    Ok(Email(addr.to_ascii_lowercase()))
}

fn is_valid_local_part(local: &str) -> bool {
    // RFC 5322 dot-atom
    const SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";
    !local.is_empty()
        && local.len() <= 64
        && local
            .split('.')
            .all(|atom| {
                !atom.is_empty()
                    && atom
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || SPECIALS.contains(c))
            })
}

fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Require exactly 64 hex chars; fold to lower case.
pub fn canonicalize_machine_id(raw: &str) -> Result<MachineId, InvalidFormat> {
    if raw.len() != MACHINE_ID_LEN || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(InvalidFormat::new("machine_id"));
    }
    Ok(MachineId(raw.to_ascii_lowercase()))
}

pub fn canonicalize_license_code(raw: &str) -> Result<LicenseCode, InvalidFormat> {
    let code = raw.trim();
    if code.is_empty()
        || code.len() > LICENSE_CODE_MAX_LEN
        || !code.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return Err(InvalidFormat::new("license_code"));
    }
    Ok(LicenseCode(code.to_ascii_lowercase()))
}

/// Truncate free-text machine info on a char boundary. Never fails.
pub fn clamp_machine_info(raw: &str) -> String {
    match raw.char_indices().nth(MACHINE_INFO_MAX_CHARS) {
        Some((idx, _)) => raw[..idx].to_string(),
        None => raw.to_string(),
    }
}

/// Derive the per-user document key.
///
/// The separator keeps `("ab", "c@d.e")` and `("a", "bc@d.e")` apart.
pub fn user_id(product_id: &str, email: &Email) -> UserId {
    let mut hasher = Sha256::new();
    hasher.update(product_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(email.as_str().as_bytes());
    UserId(hex::encode(hasher.finalize()))
}
