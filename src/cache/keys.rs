//! Cache key template rendering
//!
//! Key templates follow the hosted-CI convention: literal text plus
//! `{{ hashFiles('Cargo.lock', ...) }}` segments that digest lock-file
//! contents, so the key changes exactly when the inputs change.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

fn hash_files_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*hashFiles\(([^)]*)\)\s*\}\}").expect("hashFiles pattern is valid")
    })
}

/// Render a key template against a base directory.
///
/// Each `hashFiles(...)` segment is replaced with the first 16 hex chars
/// of a SHA-256 over the named files' contents, read relative to `base`.
/// Unreadable files contribute nothing to the digest (a fresh lock file
/// simply yields a different key).
pub fn render_key(template: &str, base: &Path) -> String {
    hash_files_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            hash_files(&caps[1], base)
        })
        .into_owned()
}

fn hash_files(args: &str, base: &Path) -> String {
    let mut hasher = Sha256::new();

    for raw in args.split(',') {
        let name = raw.trim().trim_matches(|c| c == '\'' || c == '"');
        if name.is_empty() {
            continue;
        }
        match std::fs::read(base.join(name)) {
            Ok(contents) => {
                hasher.update(name.as_bytes());
                hasher.update(&contents);
            }
            Err(_) => {
                warn!(file = name, "hashFiles input missing, skipping");
            }
        }
    }

    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}
