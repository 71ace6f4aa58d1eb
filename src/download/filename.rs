//! Safe local filenames for downloaded artifacts
//!
//! Names come from `Content-Disposition` when the server sends one. Every
//! character outside `[A-Za-z0-9._-]` is replaced, and long names are cut
//! with a short content-hash suffix so distinct long names stay distinct.

use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hex characters of the name hash kept when truncating
const HASH_SUFFIX_LEN: usize = 7;

/// Longest extension preserved through truncation, dot included
const MAX_EXTENSION_LEN: usize = 16;

/// Extracts the filename from a `Content-Disposition` header value
///
/// `filename*` (RFC 5987, percent-encoded) is preferred over `filename`.
///
/// # Examples
///
/// ```
/// use veil_fetch::download::filename_from_content_disposition;
///
/// let name = filename_from_content_disposition(r#"attachment; filename="report 2024.pdf""#);
/// assert_eq!(name, Some("report 2024.pdf".to_string()));
/// ```
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in value.split(';') {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();

        if key == "filename*" {
            // charset'language'percent-encoded
            let encoded = raw.splitn(3, '\'').nth(2).unwrap_or(raw);
            let decoded = percent_decode_str(encoded).decode_utf8_lossy().into_owned();
            extended = Some(decoded);
        } else if key == "filename" {
            plain = Some(raw.trim_matches('"').to_string());
        }
    }

    extended.or(plain).filter(|name| !name.trim().is_empty())
}

/// Sanitizes a server-provided name into a safe, bounded local filename
///
/// Path components are stripped, disallowed characters become `_`, and
/// leading dots are removed so the result can never be `.`/`..` or hidden.
/// Returns a fallback name when nothing usable remains.
pub fn sanitize_filename(raw: &str, max_len: usize) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    let replaced: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = replaced.trim_start_matches('.');

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        return fallback_filename();
    }

    if cleaned.len() <= max_len {
        return cleaned.to_string();
    }

    truncate_with_hash(cleaned, raw, max_len)
}

/// Cuts a sanitized (ASCII) name to `max_len`, keeping its extension
fn truncate_with_hash(cleaned: &str, original: &str, max_len: usize) -> String {
    let digest = hex::encode(Sha256::digest(original.as_bytes()));
    let suffix = format!("-{}", &digest[..HASH_SUFFIX_LEN]);

    let (stem, extension) = match cleaned.rfind('.') {
        Some(idx) if idx > 0 && cleaned.len() - idx <= MAX_EXTENSION_LEN => {
            (&cleaned[..idx], &cleaned[idx..])
        }
        _ => (cleaned, ""),
    };

    let stem_budget = max_len.saturating_sub(suffix.len() + extension.len()).max(1);
    let stem = &stem[..stem_budget.min(stem.len())];
    format!("{}{}{}", stem, suffix, extension)
}

/// Timestamp plus random identifier, used when the server names nothing
pub fn fallback_filename() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "download_{}_{}",
        chrono::Utc::now().timestamp(),
        &id[..12]
    )
}
