use std::sync::LazyLock;

use regex::Regex;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

/// Lowercase, dash-separated form of a business name, used for synthesized
/// hostnames and repository names.
pub fn slugify(name: &str) -> String {
    let lower = name.to_lowercase();
    NON_ALNUM
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}
