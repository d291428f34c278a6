//! Filesystem-safe directory names for repositories and branches.
//!
//! A name is a readable slug of the input followed by a short digest of the
//! original input, so `a/b` and `a.b` share a slug but never a directory.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Number of digest bytes kept (8 hex chars).
const DIGEST_BYTES: usize = 4;

static HOSTILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[/.:@]").expect("valid hostile-char regex"));
static DASH_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-{2,}").expect("valid dash-run regex"));

/// Map an arbitrary string to a single path segment: `<slug>-<8 hex digest>`.
///
/// When nothing readable survives slugging, the digest alone is returned.
pub fn slug_hash(input: &str) -> String {
    let slug = slugify(input);
    let digest = short_digest(input);
    if slug.is_empty() {
        digest
    } else {
        format!("{slug}-{digest}")
    }
}

fn slugify(input: &str) -> String {
    let replaced = HOSTILE_RE.replace_all(input, "-");
    let sanitized = sanitize_segment(&replaced);
    DASH_RUN_RE
        .replace_all(&sanitized, "-")
        .trim_matches('-')
        .to_string()
}

/// Drop characters that are illegal in a Windows or POSIX file name.
///
/// Whitespace becomes `-` so words stay separated.
fn sanitize_segment(input: &str) -> String {
    input
        .chars()
        .filter_map(|ch| match ch {
            '<' | '>' | '"' | '\\' | '|' | '?' | '*' | '/' | ':' => None,
            c if c.is_whitespace() => Some('-'),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// First bytes of the SHA-256 of `input`, hex encoded.
fn short_digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..DIGEST_BYTES])
}
