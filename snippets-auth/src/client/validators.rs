use crate::common::{ChangePasswordData, GoogleRegisterData, RegisterData};
use crate::error::AuthError;

const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_REPEATED_RUN: usize = 3;
const SEQUENCE_WINDOW: usize = 4;
const SEQUENTIAL_PATTERNS: [&str; 5] = [
    "0123456789",
    "abcdefghijklmnopqrstuvwxyz",
    "qwertyuiop",
    "asdfghjkl",
    "zxcvbnm",
];

/// Strength problems with a password, empty when it is acceptable
pub fn validate_password_strength(password: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one digit".to_string());
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        errors.push(format!(
            "Password must contain at least one special character ({})",
            SPECIAL_CHARACTERS
        ));
    }
    if has_repeated_run(password) {
        errors.push("Password contains too many repeating characters".to_string());
    }
    if has_sequential_run(password) {
        errors.push("Password contains sequential characters".to_string());
    }

    errors
}

fn has_repeated_run(password: &str) -> bool {
    let mut previous = None;
    let mut run = 0;
    for c in password.chars() {
        if Some(c) == previous {
            run += 1;
            if run > MAX_REPEATED_RUN {
                return true;
            }
        } else {
            previous = Some(c);
            run = 1;
        }
    }
    false
}

fn has_sequential_run(password: &str) -> bool {
    let lowered = password.to_lowercase();
    SEQUENTIAL_PATTERNS.iter().any(|pattern| {
        pattern.as_bytes().windows(SEQUENCE_WINDOW).any(|window| {
            let forward: String = window.iter().map(|&b| b as char).collect();
            let reversed: String = forward.chars().rev().collect();
            lowered.contains(&forward) || lowered.contains(&reversed)
        })
    })
}

fn into_result(errors: Vec<String>) -> Result<(), AuthError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::ValidationFailed(errors))
    }
}

fn new_password_errors(password: &str, confirmation: &str) -> Vec<String> {
    let mut errors = validate_password_strength(password);
    if password != confirmation {
        errors.push("Passwords do not match".to_string());
    }
    errors
}

pub fn validate_registration(data: &RegisterData) -> Result<(), AuthError> {
    let mut errors = Vec::new();
    if data.email.trim().is_empty() {
        errors.push("Email is required".to_string());
    }
    if data.username.trim().is_empty() {
        errors.push("Username is required".to_string());
    }
    errors.extend(new_password_errors(&data.password, &data.confirm_password));
    into_result(errors)
}

pub fn validate_google_registration(data: &GoogleRegisterData) -> Result<(), AuthError> {
    let mut errors = new_password_errors(&data.password, &data.confirm_password);
    if data.registration_token.is_empty() {
        errors.push("Registration token is missing".to_string());
    }
    into_result(errors)
}

pub fn validate_password_change(data: &ChangePasswordData) -> Result<(), AuthError> {
    let mut errors = new_password_errors(&data.new_password, &data.confirm_new_password);
    if data.old_password == data.new_password {
        errors.push("New password must be different from old password".to_string());
    }
    into_result(errors)
}
