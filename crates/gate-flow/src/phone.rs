//! Phone number input handling.

/// Normalize a phone number as typed into E.164-ish form.
///
/// Spaces and dashes are dropped. Numbers already starting with `+` are kept
/// as they are; otherwise a leading trunk `0` is dropped and the country
/// calling code is prefixed. Returns `None` when nothing is left.
pub fn normalize_phone(input: &str, country_code: &str) -> Option<String> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();

    if cleaned.is_empty() || cleaned == "+" {
        return None;
    }
    if cleaned.starts_with('+') {
        return Some(cleaned);
    }

    let local = cleaned.strip_prefix('0').unwrap_or(&cleaned);
    Some(format!("+{}{}", country_code, local))
}

/// Digits of a one-time code, if it is exactly six of them.
pub fn normalize_code(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    (digits.len() == 6).then_some(digits)
}
