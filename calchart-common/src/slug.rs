//! Slug derivation for show names
//!
//! A slug is the URL-safe identifier of a show. It is derived once, when the
//! show is first saved, and never recomputed afterwards.

/// Convert a show name into a slug
///
/// Rules:
/// - Accented Latin letters fold to their base letter, other non-ASCII is dropped
/// - Anything other than letters, digits, underscore, hyphen or whitespace is removed
/// - The result is lowercased
/// - Runs of hyphens and whitespace collapse to a single hyphen
/// - Leading and trailing hyphens are removed
///
/// # Examples
///
/// ```
/// use calchart_common::slugify;
///
/// assert_eq!(slugify("Homecoming 2017!"), "homecoming-2017");
/// assert_eq!(slugify("  Big -- Ten  "), "big-ten");
/// ```
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;

    for c in name.chars().filter_map(fold_to_ascii) {
        if c == '-' || c.is_ascii_whitespace() {
            pending_separator = true;
            continue;
        }
        if !(c.is_ascii_alphanumeric() || c == '_') {
            continue;
        }
        if pending_separator && !slug.is_empty() {
            slug.push('-');
        }
        pending_separator = false;
        slug.push(c.to_ascii_lowercase());
    }

    slug
}

/// Whether a path segment could be a slug produced by [`slugify`]
pub fn is_valid_slug(candidate: &str) -> bool {
    !candidate.is_empty()
        && !candidate.starts_with('-')
        && !candidate.ends_with('-')
        && candidate
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn fold_to_ascii(c: char) -> Option<char> {
    if c.is_ascii() {
        return Some(c);
    }
    let folded = match c {
        'À'..='Å' | 'à'..='å' => 'a',
        'Ç' | 'ç' => 'c',
        'È'..='Ë' | 'è'..='ë' => 'e',
        'Ì'..='Ï' | 'ì'..='ï' => 'i',
        'Ñ' | 'ñ' => 'n',
        'Ò'..='Ö' | 'Ø' | 'ò'..='ö' | 'ø' => 'o',
        'Ù'..='Ü' | 'ù'..='ü' => 'u',
        'Ý' | 'ý' | 'ÿ' => 'y',
        _ if c.is_whitespace() => ' ',
        _ => return None,
    };
    Some(folded)
}
