//! Environment merging

use std::collections::{HashMap, HashSet};

/// Separator of `PATH`-like lists on this platform
#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const PATH_LIST_SEPARATOR: char = ':';

/// Merge `overlay` on top of `base`.
///
/// Overlay values replace base values, except for `PATH`: its overlay
/// entries are prepended to the base entries. Empty segments and duplicates
/// are dropped.
pub fn merge_env(
    overlay: &HashMap<String, String>,
    base: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut out = base.clone();
    for (key, value) in overlay {
        if key == "PATH" {
            if let Some(existing) = out.get(key).filter(|v| !v.is_empty()) {
                let joined = join_paths(value, existing);
                out.insert(key.clone(), joined);
                continue;
            }
        }
        out.insert(key.clone(), value.clone());
    }
    out
}

fn join_paths(high: &str, low: &str) -> String {
    let mut seen = HashSet::new();
    let sep = PATH_LIST_SEPARATOR.to_string();
    high.split(PATH_LIST_SEPARATOR)
        .chain(low.split(PATH_LIST_SEPARATOR))
        .filter(|p| !p.is_empty() && seen.insert(*p))
        .collect::<Vec<_>>()
        .join(&sep)
}

/// Parse `KEY=VALUE` lines such as the entries of `std::env::vars`
pub fn env_from_pairs<I, S>(pairs: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    pairs
        .into_iter()
        .filter_map(|pair| {
            let (k, v) = pair.as_ref().split_once('=')?;
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}

/// `KEY=VALUE` lines sorted by key
pub fn env_to_pairs(env: &HashMap<String, String>) -> Vec<String> {
    let mut pairs: Vec<String> = env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    pairs.sort();
    pairs
}
