//! Admin password hashing.
//!
//! Passwords are stored as self-describing scrypt records:
//!
//! ```text
//! scrypt$<N>$<r>$<p>$<salt base64>$<key base64>
//! ```
//!
//! Anything without the `scrypt$` prefix is a legacy plaintext password from
//! before hashing was introduced. Those still verify by plain comparison so old
//! accounts can log in, and the login path re-hashes them on success.
//!
//! Verification reads the cost parameters from the record itself, so raising
//! the default cost does not invalidate existing hashes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::PasswordError;

/// Algorithm tag leading every hashed record
pub const HASH_PREFIX: &str = "scrypt";

/// Field separator inside a hashed record
pub const DELIMITER: char = '$';

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// Derived key length in bytes
pub const KEY_LEN: usize = 64;

/// Upper bound on scrypt working memory while verifying a stored record.
/// A corrupted or hostile record must not be able to allocate gigabytes.
const MAX_MEMORY_BYTES: u64 = 32 * 1024 * 1024;

/// scrypt cost parameters. N is stored as `log_n` since it must be a power of two.
/// Fields missing from a config section take the default cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScryptCost {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl ScryptCost {
    /// N=16384, r=8, p=1
    pub const DEFAULT: Self = Self {
        log_n: 14,
        r: 8,
        p: 1,
    };

    /// The CPU/memory cost N
    pub fn n(&self) -> u64 {
        1u64 << self.log_n
    }

    /// Working memory scrypt needs for these parameters, in bytes.
    /// Saturates instead of overflowing for absurd inputs.
    pub fn memory_bytes(&self) -> u64 {
        let blocks = self.n().saturating_add(self.p as u64).saturating_add(2);
        128u64.saturating_mul(self.r as u64).saturating_mul(blocks)
    }

    /// The `len` inside `Params` only matters for PHC output. The derived key
    /// length comes from the output buffer, so any non-empty length works.
    fn params(&self) -> Result<scrypt::Params, PasswordError> {
        if self.log_n >= 64 {
            return Err(PasswordError::InvalidCost {
                name: "N",
                value: format!("2^{}", self.log_n),
            });
        }
        if self.memory_bytes() > MAX_MEMORY_BYTES {
            return Err(PasswordError::CostTooHigh);
        }
        scrypt::Params::new(self.log_n, self.r, self.p, scrypt::Params::RECOMMENDED_LEN)
            .map_err(|e| PasswordError::Derivation(e.to_string()))
    }
}

impl Default for ScryptCost {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A parsed `scrypt$...` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedPassword {
    pub cost: ScryptCost,
    pub salt: Vec<u8>,
    pub key: Vec<u8>,
}

impl HashedPassword {
    /// Derive a fresh record for `plain` with the given salt and cost
    pub fn derive(plain: &str, salt: &[u8], cost: ScryptCost) -> Result<Self, PasswordError> {
        let key = derive_key(plain, salt, cost, KEY_LEN)?;
        Ok(Self {
            cost,
            salt: salt.to_vec(),
            key,
        })
    }

    /// Parse a record that already carries the `scrypt$` prefix
    pub fn parse(stored: &str) -> Result<Self, PasswordError> {
        let fields: Vec<&str> = stored.split(DELIMITER).collect();
        if fields.len() != 6 {
            return Err(PasswordError::FieldCount(fields.len()));
        }

        let [tag, n_raw, r_raw, p_raw, salt_b64, key_b64] = [
            fields[0], fields[1], fields[2], fields[3], fields[4], fields[5],
        ];

        if tag != HASH_PREFIX {
            return Err(PasswordError::UnknownAlgorithm(tag.to_string()));
        }

        let n: u64 = parse_cost("N", n_raw)?;
        if n < 2 || !n.is_power_of_two() {
            return Err(PasswordError::InvalidCost {
                name: "N",
                value: n_raw.to_string(),
            });
        }
        let cost = ScryptCost {
            log_n: n.trailing_zeros() as u8,
            r: parse_cost("r", r_raw)?,
            p: parse_cost("p", p_raw)?,
        };

        if salt_b64.is_empty() {
            return Err(PasswordError::Empty("salt"));
        }
        if key_b64.is_empty() {
            return Err(PasswordError::Empty("key"));
        }
        let salt = BASE64
            .decode(salt_b64)
            .map_err(|_| PasswordError::Encoding("salt"))?;
        let key = BASE64
            .decode(key_b64)
            .map_err(|_| PasswordError::Encoding("key"))?;

        Ok(Self { cost, salt, key })
    }

    /// Render as `scrypt$N$r$p$salt$key`
    pub fn encode(&self) -> String {
        [
            HASH_PREFIX.to_string(),
            self.cost.n().to_string(),
            self.cost.r.to_string(),
            self.cost.p.to_string(),
            BASE64.encode(&self.salt),
            BASE64.encode(&self.key),
        ]
        .join(&DELIMITER.to_string())
    }

    /// Recompute the key from `plain` and compare in constant time.
    /// Derivation failures count as a mismatch.
    pub fn matches(&self, plain: &str) -> bool {
        match derive_key(plain, &self.salt, self.cost, self.key.len()) {
            Ok(actual) => actual.ct_eq(&self.key).into(),
            Err(e) => {
                debug!("Password derivation failed during verify: {}", e);
                false
            }
        }
    }
}

/// A stored password value, classified by prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredPassword<'a> {
    Hashed(HashedPassword),
    /// Pre-hashing record compared verbatim
    Legacy(&'a str),
}

impl<'a> StoredPassword<'a> {
    /// Classify `stored`. A prefixed but malformed record is an error, never legacy.
    pub fn parse(stored: &'a str) -> Result<Self, PasswordError> {
        if is_password_hashed(stored) {
            HashedPassword::parse(stored).map(StoredPassword::Hashed)
        } else {
            Ok(StoredPassword::Legacy(stored))
        }
    }

    pub fn matches(&self, plain: &str) -> bool {
        match self {
            StoredPassword::Hashed(record) => record.matches(plain),
            // Not constant-time. Legacy rows are migrated on their next login.
            StoredPassword::Legacy(raw) => plain == *raw,
        }
    }
}

/// True when `value` is a hashed record rather than legacy plaintext
pub fn is_password_hashed(value: &str) -> bool {
    value
        .strip_prefix(HASH_PREFIX)
        .is_some_and(|rest| rest.starts_with(DELIMITER))
}

/// Hash with a random salt and the default cost
pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    hash_password_with_cost(plain, ScryptCost::DEFAULT)
}

/// Hash with a random salt and an explicit cost
pub fn hash_password_with_cost(plain: &str, cost: ScryptCost) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    hash_password_with_salt(plain, &salt, cost)
}

/// Deterministic hashing for a caller-supplied salt
pub fn hash_password_with_salt(
    plain: &str,
    salt: &[u8],
    cost: ScryptCost,
) -> Result<String, PasswordError> {
    HashedPassword::derive(plain, salt, cost).map(|record| record.encode())
}

/// Check `plain` against a stored value. Never fails: malformed records verify as `false`.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    match StoredPassword::parse(stored) {
        Ok(record) => record.matches(plain),
        Err(e) => {
            debug!("Rejecting malformed password record: {}", e);
            false
        }
    }
}

fn parse_cost<T: std::str::FromStr + PartialEq + Default>(
    name: &'static str,
    raw: &str,
) -> Result<T, PasswordError> {
    match raw.parse::<T>() {
        Ok(value) if value != T::default() => Ok(value),
        _ => Err(PasswordError::InvalidCost {
            name,
            value: raw.to_string(),
        }),
    }
}

fn derive_key(
    plain: &str,
    salt: &[u8],
    cost: ScryptCost,
    key_len: usize,
) -> Result<Vec<u8>, PasswordError> {
    if key_len == 0 {
        return Err(PasswordError::Empty("key"));
    }
    let params = cost.params()?;
    let mut key = vec![0u8; key_len];
    scrypt::scrypt(plain.as_bytes(), salt, &params, &mut key)
        .map_err(|e| PasswordError::Derivation(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: ScryptCost = ScryptCost {
        log_n: 4,
        r: 8,
        p: 1,
    };

    #[test]
    fn test_default_hash_roundtrip() {
        let stored = hash_password("correct horse").unwrap();

        assert!(stored.starts_with("scrypt$16384$8$1$"));
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("correct horsf", &stored));
    }

    #[test]
    fn test_encoded_field_lengths() {
        let stored = hash_password_with_cost("pw", FAST).unwrap();
        let record = HashedPassword::parse(&stored).unwrap();

        assert_eq!(record.salt.len(), SALT_LEN);
        assert_eq!(record.key.len(), KEY_LEN);
        assert_eq!(record.cost, FAST);
        assert_eq!(record.encode(), stored);
    }

    #[test]
    fn test_random_salt_per_hash() {
        let a = hash_password_with_cost("same", FAST).unwrap();
        let b = hash_password_with_cost("same", FAST).unwrap();

        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
    }

    #[test]
    fn test_fixed_salt_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let a = hash_password_with_salt("pw", &salt, FAST).unwrap();
        let b = hash_password_with_salt("pw", &salt, FAST).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_legacy_plaintext_equality() {
        assert!(verify_password("admin123", "admin123"));
        assert!(!verify_password("admin123", "admin1234"));
        assert!(!verify_password("", "x"));
        assert!(verify_password("", ""));
        // Different tag, so it is plaintext, not a malformed hash
        assert!(verify_password("bcrypt$x", "bcrypt$x"));
    }

    #[test]
    fn test_is_password_hashed() {
        assert!(is_password_hashed("scrypt$"));
        assert!(is_password_hashed("scrypt$16384$8$1$a$b"));
        assert!(!is_password_hashed("scrypt"));
        assert!(!is_password_hashed("scryptx$1"));
        assert!(!is_password_hashed("hunter2"));
        assert!(!is_password_hashed(""));
    }

    #[test]
    fn test_malformed_records_fail_closed() {
        let valid = hash_password_with_cost("pw", FAST).unwrap();
        let fields: Vec<&str> = valid.split('$').collect();
        let salt = fields[4];
        let key = fields[5];

        let cases = vec![
            "scrypt$".to_string(),
            "scrypt$$$$$".to_string(),
            "scrypt$16$8$1".to_string(),
            format!("scrypt$16$8$1${salt}${key}$extra"),
            format!("scrypt$abc$8$1${salt}${key}"),
            format!("scrypt$16.0$8$1${salt}${key}"),
            format!("scrypt$16$eight$1${salt}${key}"),
            format!("scrypt$16$8$-1${salt}${key}"),
            format!("scrypt$16$0$1${salt}${key}"),
            format!("scrypt$15$8$1${salt}${key}"),
            format!("scrypt$1$8$1${salt}${key}"),
            format!("scrypt$16$8$1$!!!${key}"),
            format!("scrypt$16$8$1${salt}$not*base64"),
            format!("scrypt$16$8$1$${key}"),
            format!("scrypt$16$8$1${salt}$"),
        ];

        for stored in cases {
            assert!(!verify_password("pw", &stored), "accepted {stored}");
        }
    }

    #[test]
    fn test_memory_ceiling_rejects_huge_cost() {
        let salt = BASE64.encode([1u8; SALT_LEN]);
        let key = BASE64.encode([2u8; KEY_LEN]);
        let stored = format!("scrypt$1073741824$8$1${salt}${key}");

        assert_eq!(
            HashedPassword::parse(&stored).map(|r| r.matches("pw")),
            Ok(false)
        );
        assert!(!verify_password("pw", &stored));
        assert_eq!(
            hash_password_with_cost(
                "pw",
                ScryptCost {
                    log_n: 20,
                    r: 8,
                    p: 1
                }
            ),
            Err(PasswordError::CostTooHigh)
        );
    }

    #[test]
    fn test_flipped_key_byte_rejected() {
        let stored = hash_password_with_cost("pw", FAST).unwrap();
        let mut record = HashedPassword::parse(&stored).unwrap();
        record.key[10] ^= 0x01;

        assert!(!verify_password("pw", &record.encode()));
    }

    #[test]
    fn test_truncated_key_rejected() {
        let stored = hash_password_with_cost("pw", FAST).unwrap();
        let mut record = HashedPassword::parse(&stored).unwrap();
        record.key.truncate(32);

        // Derived at the stored length, so only the prefix matches
        assert!(verify_password("pw", &record.encode()));
        record.key[0] ^= 0xff;
        assert!(!verify_password("pw", &record.encode()));
    }

    #[test]
    fn test_any_stored_key_length_verifies() {
        let salt = [9u8; SALT_LEN];
        let params = scrypt::Params::new(FAST.log_n, FAST.r, FAST.p, 32).unwrap();

        for len in [1usize, 8, 32, 80, 128] {
            let mut key = vec![0u8; len];
            scrypt::scrypt(b"pw", &salt, &params, &mut key).unwrap();
            let stored = HashedPassword {
                cost: FAST,
                salt: salt.to_vec(),
                key,
            }
            .encode();

            assert!(verify_password("pw", &stored), "key length {len}");
            assert!(!verify_password("pW", &stored), "key length {len}");
        }
    }

    #[test]
    fn test_partial_cost_uses_defaults() {
        let cost: ScryptCost = toml::from_str("log_n = 15").unwrap();
        assert_eq!(
            cost,
            ScryptCost {
                log_n: 15,
                r: 8,
                p: 1
            }
        );
    }

    #[test]
    fn test_record_cost_used_for_verify() {
        let older = ScryptCost {
            log_n: 5,
            r: 4,
            p: 2,
        };
        let stored = hash_password_with_cost("rotate me", older).unwrap();

        assert!(stored.starts_with("scrypt$32$4$2$"));
        assert!(verify_password("rotate me", &stored));
    }

    #[test]
    fn test_stored_password_variants() {
        assert_eq!(
            StoredPassword::parse("plain").unwrap(),
            StoredPassword::Legacy("plain")
        );
        assert!(matches!(
            StoredPassword::parse("scrypt$1$2"),
            Err(PasswordError::FieldCount(3))
        ));

        let stored = hash_password_with_cost("pw", FAST).unwrap();
        match StoredPassword::parse(&stored).unwrap() {
            StoredPassword::Hashed(record) => assert_eq!(record.cost.n(), 16),
            other => panic!("expected hashed record, got {other:?}"),
        }
    }
}
