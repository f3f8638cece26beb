//! Credential hashing, session tokens and signed login callbacks
//!
//! # Pure Functions
//!
//! This module contains ONLY pure functions. No HTTP framework dependencies;
//! the server wraps these in its login handlers and middleware.
//!
//! # Members Only callback signature
//!
//! When Members Only redirects a user back to Calchart it appends the user's
//! identity to the query string together with a `hash`:
//!
//! 1. Replace `hash` with a dummy hash (64 zeros)
//! 2. Convert the fields to canonical JSON (sorted keys, no whitespace)
//! 3. Append the shared secret
//! 4. SHA-256 of the concatenated string, as 64 hex characters

use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};

const DUMMY_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Hash does not match calculated value
    InvalidHash { provided: String, calculated: String },

    /// A signed field is missing from the callback
    MissingField(&'static str),

    /// Username or password did not match
    InvalidCredentials,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidHash { .. } => write!(f, "Invalid hash"),
            AuthError::MissingField(field) => write!(f, "Missing {} field", field),
            AuthError::InvalidCredentials => write!(f, "Invalid username or password"),
        }
    }
}

impl std::error::Error for AuthError {}

// ========================================
// Passwords and tokens
// ========================================

/// Generate a random salt (32 hex characters)
pub fn generate_salt() -> String {
    random_hex(16)
}

/// Generate a session token (64 hex characters)
pub fn generate_token() -> String {
    random_hex(32)
}

fn random_hex(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..bytes)
        .map(|_| format!("{:02x}", rng.gen::<u8>()))
        .collect()
}

/// Hash a password with its salt
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Check a password against a stored hash
///
/// Accounts without a stored hash (Members Only users) never match.
pub fn verify_password(password: &str, salt: &str, stored_hash: &str) -> Result<(), AuthError> {
    if stored_hash.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }
    if constant_time_eq(hash_password(password, salt).as_bytes(), stored_hash.as_bytes()) {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentials)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ========================================
// Hash Calculation and Validation
// ========================================

/// Calculate the callback hash over a JSON object
///
/// # Examples
///
/// ```
/// use calchart_common::auth::calculate_hash;
/// use serde_json::json;
///
/// let fields = json!({
///     "username": "alice",
///     "api_token": "abc",
///     "hash": "dummy"
/// });
///
/// let hash = calculate_hash(&fields, "s3cret");
/// assert_eq!(hash.len(), 64);
/// ```
pub fn calculate_hash(json_value: &Value, shared_secret: &str) -> String {
    let mut value = json_value.clone();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(DUMMY_HASH.to_string()));
    }

    let canonical = to_canonical_json(&value);
    let to_hash = format!("{}{}", canonical, shared_secret);

    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
///
/// ```
/// use calchart_common::auth::to_canonical_json;
/// use serde_json::json;
///
/// let canonical = to_canonical_json(&json!({"z": 3, "a": 1}));
/// assert_eq!(canonical, "{\"a\":1,\"z\":3}");
/// ```
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        // serde_json's own string serializer handles escaping
        other => other.to_string(),
    }
}

/// Validate a provided hash against the calculated value
pub fn validate_hash(
    provided_hash: &str,
    json_value: &Value,
    shared_secret: &str,
) -> Result<(), AuthError> {
    let calculated = calculate_hash(json_value, shared_secret);

    if !constant_time_eq(provided_hash.as_bytes(), calculated.as_bytes()) {
        return Err(AuthError::InvalidHash {
            provided: provided_hash.to_string(),
            calculated,
        });
    }

    Ok(())
}

// ========================================
// Tests
// ========================================
