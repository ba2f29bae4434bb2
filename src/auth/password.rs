use crate::error::{AppError, FieldErrors};

pub const MIN_LENGTH: usize = 8;

const COMMON_PASSWORDS: &[&str] = &[
    "00000000", "11111111", "12341234", "12345678", "123456789", "1234567890", "1q2w3e4r",
    "87654321", "abc12345", "admin123", "asdfghjk", "baseball", "dragon12", "football",
    "iloveyou", "letmein1", "passw0rd", "password", "password1", "password123", "princess",
    "qwerty12", "qwerty123", "qwertyuiop", "starwars", "sunshine", "superman", "trustno1",
    "welcome1", "zaq12wsx",
];

/// Strength rules for a new password. Every failing rule is reported.
pub fn validate(password: &str, email: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_LENGTH {
        problems.push(format!(
            "This password is too short. It must contain at least {MIN_LENGTH} characters."
        ));
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        problems.push("This password is too common.".to_string());
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }
    if is_similar_to_email(password, email) {
        problems.push("The password is too similar to the email.".to_string());
    }

    problems
}

fn is_similar_to_email(password: &str, email: &str) -> bool {
    let password = password.to_lowercase();
    let local = email
        .split('@')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    local.len() >= 3 && password.contains(&local)
}

/// Records strength problems under `field`.
pub fn check_into(errors: &mut FieldErrors, field: &str, password: &str, email: &str) {
    for problem in validate(password, email) {
        errors.add(field, problem);
    }
}

pub fn hash(password: &str) -> Result<String, AppError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// Constant-time via bcrypt; malformed hashes never verify.
pub fn verify(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}
