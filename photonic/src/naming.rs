//! Filesystem-safe archive names.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Fallback used when nothing printable survives sanitizing.
pub const FALLBACK_NAME: &str = "patient";

fn disallowed_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9 _-]+").expect("valid regex"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Turn a patient name into a file base name.
///
/// Keeps ASCII letters, digits, spaces, `_` and `-`; trims; joins words with
/// `_`. Returns [`FALLBACK_NAME`] if the result is empty.
///
/// ```
/// use photonic::naming::sanitize_filename;
///
/// assert_eq!(sanitize_filename("DOE^JANE  (MRI)"), "DOEJANE_MRI");
/// assert_eq!(sanitize_filename("***"), "patient");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let kept = disallowed_chars().replace_all(name, "");
    let joined = whitespace_runs().replace_all(kept.trim(), "_");
    if joined.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        joined.into_owned()
    }
}

/// Sanitize every name and make the results unique within the batch.
///
/// Repeats get `_2`, `_3`, ... in input order so that two studies of the same
/// patient never write to the same archive file.
pub fn unique_base_names<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut used = HashSet::new();
    let mut result = Vec::new();

    for name in names {
        let base = sanitize_filename(name);
        let mut candidate = base.clone();
        let mut suffix = 2;
        while used.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        used.insert(candidate.clone());
        result.push(candidate);
    }

    result
}
