//! Centralized validation and helper functions.

/// Longest journal name accepted from a producer or query
pub const MAX_NAME_LENGTH: usize = 1024;

/// Maximum number of explicit aliases accepted on one candidate
pub const MAX_ALIASES: usize = 256;

/// Validate an ISSN (`NNNN-NNNC`, check character `0-9` or `X`).
///
/// # Examples
///
/// ```
/// use journal_abbrev::utils::validation::is_valid_issn;
///
/// assert!(is_valid_issn("0028-0836"));
/// assert!(is_valid_issn("1050-124X"));
/// assert!(!is_valid_issn("0028-0837")); // bad check digit
/// ```
#[must_use]
pub fn is_valid_issn(s: &str) -> bool {
    normalize_issn(s).is_some_and(|n| n == s)
}

/// Normalize an ISSN to `NNNN-NNNC` with an upper-case check character.
/// Accepts the hyphen-less form. Returns None when the checksum does not hold.
#[must_use]
pub fn normalize_issn(s: &str) -> Option<String> {
    let compact: Vec<char> = s
        .trim()
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if compact.len() != 8 {
        return None;
    }

    let mut sum = 0u32;
    for (i, c) in compact[..7].iter().enumerate() {
        let digit = c.to_digit(10)?;
        #[allow(clippy::cast_possible_truncation)] // i < 7
        let weight = 8 - i as u32;
        sum += digit * weight;
    }

    let check = (11 - sum % 11) % 11;
    let expected = if check == 10 {
        'X'
    } else {
        char::from_digit(check, 10)?
    };
    if compact[7] != expected {
        return None;
    }

    let digits: String = compact.iter().collect();
    Some(format!("{}-{}", &digits[..4], &digits[4..]))
}

/// Normalize a CODEN to upper case.
/// Accepts the 5-character form and the 6-character form with check character.
#[must_use]
pub fn normalize_coden(s: &str) -> Option<String> {
    let s = s.trim();
    let valid = matches!(s.len(), 5 | 6)
        && s.chars().all(|c| c.is_ascii_alphanumeric())
        && s.chars().take(4).all(|c| c.is_ascii_alphabetic());
    valid.then(|| s.to_ascii_uppercase())
}

/// Check a raw name against the length limit.
///
/// Returns an error message if the name is too long, None if acceptable.
#[must_use]
pub fn check_name_length(name: &str) -> Option<String> {
    if name.len() > MAX_NAME_LENGTH {
        Some(format!(
            "Name too long: {} bytes exceeds maximum of {MAX_NAME_LENGTH}",
            name.len()
        ))
    } else {
        None
    }
}
