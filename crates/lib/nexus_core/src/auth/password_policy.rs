//! Password complexity rules.
//!
//! Every rule is checked independently so a caller sees all violations at
//! once. The same policy applies to user creation, admin resets and
//! self-service password changes.

use std::collections::HashSet;

/// Minimum password length, in characters.
pub const MIN_LENGTH: usize = 12;

/// Characters that satisfy the symbol rule.
pub const SYMBOLS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

/// Case-insensitive substrings that disqualify a password.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "12345678", "qwerty", "abc123", "monkey", "letmein", "trustno1", "dragon",
    "baseball", "iloveyou", "master", "sunshine", "ashley", "bailey", "passw0rd", "shadow",
    "superman", "qazwsx", "123456789", "password1", "password123", "admin", "welcome", "login",
    "admin123", "root", "toor", "pass", "test", "guest", "oracle", "123456", "654321", "pass123",
];

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordCheck {
    pub valid: bool,
    pub errors: Vec<String>,
    /// [`strength`] of the candidate, for feedback alongside the errors.
    pub strength: u8,
}

/// Check `password` against every complexity rule.
pub fn validate_password(password: &str) -> PasswordCheck {
    let mut errors = Vec::new();

    if password.chars().count() < MIN_LENGTH {
        errors.push(format!(
            "Password must be at least {MIN_LENGTH} characters long"
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }
    if !has_symbol(password) {
        errors.push(format!(
            "Password must contain at least one special character ({SYMBOLS})"
        ));
    }
    if contains_common_password(password) {
        errors.push("Password contains commonly used words or patterns".to_string());
    }
    if has_repeated_run(password) {
        errors.push(
            "Password should not contain repeated characters (e.g., \"aaa\" or \"111\")"
                .to_string(),
        );
    }
    if has_sequential_run(password) {
        errors.push(
            "Password should not contain sequential characters (e.g., \"abc\" or \"123\")"
                .to_string(),
        );
    }

    PasswordCheck {
        valid: errors.is_empty(),
        errors,
        strength: strength(password),
    }
}

fn has_symbol(password: &str) -> bool {
    password.chars().any(|c| SYMBOLS.contains(c))
}

fn contains_common_password(password: &str) -> bool {
    let lower = password.to_lowercase();
    COMMON_PASSWORDS.iter().any(|common| lower.contains(common))
}

/// Three or more identical consecutive characters.
fn has_repeated_run(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

/// An ascending three-character run within `a..=z` or `0..=9`, ignoring case.
fn has_sequential_run(password: &str) -> bool {
    let chars: Vec<char> = password.chars().map(|c| c.to_ascii_lowercase()).collect();
    chars.windows(3).any(|w| {
        let same_class = w.iter().all(|c| c.is_ascii_lowercase())
            || w.iter().all(|c| c.is_ascii_digit());
        same_class && w[1] as u32 == w[0] as u32 + 1 && w[2] as u32 == w[1] as u32 + 1
    })
}

/// Heuristic strength score in `0..=100`, used for UI feedback only.
pub fn strength(password: &str) -> u8 {
    let mut score: i32 = 0;

    score += (password.chars().count() as i32 * 2).min(30);
    if password.chars().any(|c| c.is_ascii_lowercase()) {
        score += 10;
    }
    if password.chars().any(|c| c.is_ascii_uppercase()) {
        score += 10;
    }
    if password.chars().any(|c| c.is_ascii_digit()) {
        score += 10;
    }
    if has_symbol(password) {
        score += 15;
    }

    let unique = password.chars().collect::<HashSet<_>>().len() as i32;
    score += (unique * 2).min(20);

    if contains_common_password(password) {
        score -= 20;
    }

    score.clamp(0, 100) as u8
}

/// Human label for a [`strength`] score.
pub fn strength_label(score: u8) -> &'static str {
    match score {
        0..=39 => "Weak",
        40..=59 => "Fair",
        60..=79 => "Good",
        _ => "Strong",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(check: &PasswordCheck, fragment: &str) -> bool {
        check.errors.iter().any(|e| e.contains(fragment))
    }

    #[test]
    fn common_word_fails_every_relevant_rule() {
        let check = validate_password("password");
        assert!(!check.valid);
        assert!(has_error(&check, "at least 12 characters"));
        assert!(has_error(&check, "uppercase"));
        assert!(has_error(&check, "number"));
        assert!(has_error(&check, "special character"));
        assert!(has_error(&check, "commonly used"));
        assert!(!has_error(&check, "lowercase"));
        assert_eq!(check.errors.len(), 5);
        assert_eq!(strength_label(check.strength), "Weak");
    }

    #[test]
    fn strong_password_passes() {
        let check = validate_password("Tr0ub4dor&3xyq");
        assert!(check.valid, "unexpected errors: {:?}", check.errors);
        assert!(check.errors.is_empty());
    }

    #[test]
    fn trailing_alphabet_run_is_sequential() {
        // "xyz" is an ascending run even though every other rule holds.
        let check = validate_password("Tr0ub4dor&3xyz");
        assert_eq!(check.errors.len(), 1);
        assert!(has_error(&check, "sequential"));
    }

    #[test]
    fn repeated_characters_are_rejected() {
        let check = validate_password("Kq7!mmmZp2#w");
        assert!(has_error(&check, "repeated"));
        assert!(!has_repeated_run("aab"));
    }

    #[test]
    fn sequences_ignore_case_and_only_ascend() {
        assert!(has_sequential_run("xxAbC"));
        assert!(has_sequential_run("a789"));
        assert!(!has_sequential_run("cba"));
        assert!(!has_sequential_run("321"));
        assert!(!has_sequential_run("9:;"));
    }

    #[test]
    fn common_substring_is_case_insensitive() {
        assert!(contains_common_password("MyQWERTYpad"));
        assert!(!contains_common_password("Gz8!vRq#mW4u"));
    }

    #[test]
    fn strength_ranks_complex_above_simple() {
        let weak = strength("password");
        let strong = strength("Gz8!vRq#mW4u-Lp");
        assert!(weak < strong);
        assert_eq!(strength_label(weak), "Weak");
        assert_eq!(strength_label(strong), "Strong");
    }
}
