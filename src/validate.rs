//! Input validity checks for account names and email addresses.

/// Maximum account name length.
const MAX_NAME_LEN: usize = 32;

/// Validate an account name. Names must be 1-32 chars, alphanumeric plus
/// hyphens, underscores, and dots.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Validate an email address. This is a plausibility check, not RFC 5322:
/// exactly one `@`, a non-empty local part, and a domain containing a dot.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.splitn(2, '@');
    let (Some(local), Some(domain)) = (parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
