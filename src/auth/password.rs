/// Password hashing and verification with bcrypt.
///
/// The cost factor is read from configuration once at construction.
/// `needs_upgrade` flags hashes created with a lower cost so callers can
/// re-hash on the next successful login.

use crate::configuration::HashSettings;
use crate::error::AppError;

// bcrypt accepts costs in this range.
const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(config: &HashSettings) -> Self {
        Self {
            cost: config.cost.clamp(MIN_COST, MAX_COST),
        }
    }

    /// Hash a password. A fresh salt is drawn every call, so hashing the
    /// same input twice yields different strings.
    ///
    /// # Errors
    /// Returns an error only if bcrypt itself fails.
    pub fn hash(&self, plaintext: &str) -> Result<String, AppError> {
        bcrypt::hash(plaintext, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against its hash.
    ///
    /// Never errors: a malformed hash string is treated as a failed match.
    pub fn verify(&self, plaintext: &str, hashed: &str) -> bool {
        match bcrypt::verify(plaintext, hashed) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "Password verification against malformed hash");
                false
            }
        }
    }

    /// True when the hash was created with a lower cost than currently
    /// configured. Unparsable hashes also report true so they get replaced.
    pub fn needs_upgrade(&self, hashed: &str) -> bool {
        match hash_cost(hashed) {
            Some(cost) => cost < self.cost,
            None => true,
        }
    }
}

/// Extract the cost factor from a bcrypt hash string (`$2b$12$...`).
fn hash_cost(hashed: &str) -> Option<u32> {
    let mut parts = hashed.split('$');
    // Leading empty segment, then version, then cost.
    parts.next()?;
    let version = parts.next()?;
    if !version.starts_with('2') {
        return None;
    }
    parts.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher(cost: u32) -> PasswordHasher {
        PasswordHasher::new(&HashSettings { cost })
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = hasher(4);
        let hash = hasher.hash("Secret123").unwrap();

        assert!(hash.starts_with("$2"));
        assert!(hasher.verify("Secret123", &hash));
    }

    #[test]
    fn test_wrong_password_rejected() {
        let hasher = hasher(4);
        let hash = hasher.hash("Secret123").unwrap();

        assert!(!hasher.verify("WrongPassword1", &hash));
    }

    #[test]
    fn test_same_input_different_hashes() {
        let hasher = hasher(4);
        let first = hasher.hash("Secret123").unwrap();
        let second = hasher.hash("Secret123").unwrap();

        // Fresh salt per call.
        assert_ne!(first, second);
    }

    #[test]
    fn test_malformed_hash_verifies_false() {
        let hasher = hasher(4);

        assert!(!hasher.verify("Secret123", "not-a-bcrypt-hash"));
        assert!(!hasher.verify("Secret123", ""));
    }

    #[test]
    fn test_needs_upgrade_on_lower_cost() {
        let low = hasher(4);
        let hash = low.hash("Secret123").unwrap();

        assert!(!low.needs_upgrade(&hash));
        assert!(hasher(10).needs_upgrade(&hash));
    }

    #[test]
    fn test_needs_upgrade_on_malformed_hash() {
        assert!(hasher(10).needs_upgrade("garbage"));
    }

    #[test]
    fn test_cost_parsing() {
        assert_eq!(
            hash_cost("$2b$12$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW"),
            Some(12)
        );
        assert_eq!(hash_cost("plain"), None);
        assert_eq!(hash_cost("$1$08$xyz"), None);
    }
}
