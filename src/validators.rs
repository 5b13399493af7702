/// Input validators for registration and login payloads.
/// Field checks return the cleaned value or the first violated constraint;
/// password strength returns the full list of violated rules so the caller
/// can report all of them at once.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 50;
const MAX_NAME_LENGTH: usize = 50;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9._-]+$").unwrap();
}

/// Validates and normalizes an email address.
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }
    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }
    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }
    if !EMAIL_REGEX.is_match(trimmed) || trimmed.matches('@').count() != 1 {
        return Err(ValidationError::InvalidFormat(
            "email has invalid format".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

/// Validates and normalizes a username (3-50 chars, alphanumeric plus ._-).
pub fn is_valid_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("username".to_string()));
    }
    if trimmed.len() < MIN_USERNAME_LENGTH {
        return Err(ValidationError::TooShort(
            "username".to_string(),
            MIN_USERNAME_LENGTH,
        ));
    }
    if trimmed.len() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong(
            "username".to_string(),
            MAX_USERNAME_LENGTH,
        ));
    }
    if !USERNAME_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat(
            "username may only contain letters, digits, '.', '_' and '-'".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

/// Validates a first or last name.
pub fn is_valid_name(field: &'static str, name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }
    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong(field.to_string(), MAX_NAME_LENGTH));
    }
    if trimmed.contains('\0') || trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent(field.to_string()));
    }

    Ok(trimmed.to_string())
}

/// A password strength rule that was not met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRule {
    TooShort,
    TooLong,
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
}

impl std::fmt::Display for PasswordRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordRule::TooShort => {
                write!(f, "must be at least {} characters", MIN_PASSWORD_LENGTH)
            }
            PasswordRule::TooLong => {
                write!(f, "must be at most {} characters", MAX_PASSWORD_LENGTH)
            }
            PasswordRule::MissingUppercase => write!(f, "must contain an uppercase letter"),
            PasswordRule::MissingLowercase => write!(f, "must contain a lowercase letter"),
            PasswordRule::MissingDigit => write!(f, "must contain a digit"),
        }
    }
}

/// Returns every strength rule the password violates; empty means acceptable.
pub fn password_violations(password: &str) -> Vec<PasswordRule> {
    let mut violations = Vec::new();

    if password.len() < MIN_PASSWORD_LENGTH {
        violations.push(PasswordRule::TooShort);
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        violations.push(PasswordRule::TooLong);
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        violations.push(PasswordRule::MissingUppercase);
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        violations.push(PasswordRule::MissingLowercase);
    }
    if !password.chars().any(|c| c.is_numeric()) {
        violations.push(PasswordRule::MissingDigit);
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com").is_ok());
        assert!(is_valid_email("test.email@domain.co.uk").is_ok());
        assert!(is_valid_email("user+tag@example.com").is_ok());
    }

    #[test]
    fn test_invalid_email_format() {
        assert!(is_valid_email("invalid").is_err());
        assert!(is_valid_email("user@").is_err());
        assert!(is_valid_email("@example.com").is_err());
        assert!(is_valid_email("user@@example.com").is_err());
    }

    #[test]
    fn test_email_length_limits() {
        let too_long = format!("{}@example.com", "a".repeat(250));
        assert!(is_valid_email(&too_long).is_err());
        assert!(is_valid_email("").is_err());
    }

    #[test]
    fn test_valid_username() {
        assert!(is_valid_username("johndoe").is_ok());
        assert!(is_valid_username("john.doe_99").is_ok());
        assert_eq!(is_valid_username("  alice  ").unwrap(), "alice");
    }

    #[test]
    fn test_invalid_username() {
        assert!(is_valid_username("ab").is_err());
        assert!(is_valid_username(&"a".repeat(51)).is_err());
        assert!(is_valid_username("john doe").is_err());
        assert!(is_valid_username("john;--").is_err());
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("first_name", "John").is_ok());
        assert!(is_valid_name("last_name", "O'Brien").is_ok());
    }

    #[test]
    fn test_invalid_name() {
        assert!(is_valid_name("first_name", "").is_err());
        assert!(is_valid_name("first_name", &"a".repeat(51)).is_err());
        assert!(is_valid_name("first_name", "Name\0null").is_err());
    }

    #[test]
    fn test_acceptable_password_has_no_violations() {
        assert!(password_violations("Secret123").is_empty());
    }

    #[test]
    fn test_password_violations_are_all_reported() {
        let violations = password_violations("short");
        assert!(violations.contains(&PasswordRule::TooShort));
        assert!(violations.contains(&PasswordRule::MissingUppercase));
        assert!(violations.contains(&PasswordRule::MissingDigit));
    }

    #[test]
    fn test_password_rule_boundaries() {
        assert!(password_violations("NoDigitsHere").contains(&PasswordRule::MissingDigit));
        assert!(password_violations("nouppercase1").contains(&PasswordRule::MissingUppercase));
        assert!(password_violations("NOLOWERCASE1").contains(&PasswordRule::MissingLowercase));
        let long = format!("Aa1{}", "x".repeat(MAX_PASSWORD_LENGTH));
        assert!(password_violations(&long).contains(&PasswordRule::TooLong));
    }
}
