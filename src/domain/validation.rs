//! Client-side field checks applied before a request leaves the process.

use chrono::{DateTime, Utc};

const TITLE_MIN_CHARS: usize = 2;
const TITLE_MAX_CHARS: usize = 100;
const DESCRIPTION_MAX_CHARS: usize = 500;
const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 50;
const PASSWORD_MIN_CHARS: usize = 8;

pub fn validate_email(email: &str) -> Result<(), String> {
    const MESSAGE: &str = "Please enter a valid email address";
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return Err(MESSAGE.to_string());
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(MESSAGE.to_string());
    };
    if local.is_empty() || domain.contains('@') {
        return Err(MESSAGE.to_string());
    }
    // Needs at least one character on both sides of some dot in the domain.
    let has_dotted_domain = domain
        .char_indices()
        .filter(|(_, ch)| *ch == '.')
        .any(|(index, _)| index > 0 && index + 1 < domain.len());
    if !has_dotted_domain {
        return Err(MESSAGE.to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    let valid = password.chars().count() >= PASSWORD_MIN_CHARS
        && password.chars().all(|ch| ch.is_ascii_alphanumeric())
        && password.chars().any(|ch| ch.is_ascii_lowercase())
        && password.chars().any(|ch| ch.is_ascii_uppercase())
        && password.chars().any(|ch| ch.is_ascii_digit());
    if !valid {
        return Err(
            "Password must be at least 8 characters with 1 uppercase, 1 lowercase and 1 number"
                .to_string(),
        );
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), String> {
    let length = name.chars().count();
    let valid = (NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&length)
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphabetic() || ch.is_whitespace());
    if !valid {
        return Err("Name must be 2-50 characters long and contain only letters".to_string());
    }
    Ok(())
}

pub fn validate_task_title(title: &str) -> Result<(), String> {
    let length = title.chars().count();
    if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&length) {
        return Err("Task title must be between 2 and 100 characters".to_string());
    }
    Ok(())
}

pub fn validate_task_description(description: &str) -> Result<(), String> {
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err("Description must not exceed 500 characters".to_string());
    }
    Ok(())
}

pub fn validate_date_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), String> {
    if end < start {
        return Err("End date must be after start date".to_string());
    }
    Ok(())
}
