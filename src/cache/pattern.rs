use crate::core::{MetaError, Result};
use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const GLOB_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(size) => size,
    None => NonZeroUsize::MIN,
};

lazy_static::lazy_static! {
    static ref GLOB_LRU_CACHE: Mutex<LruCache<String, Arc<Regex>>> =
        Mutex::new(LruCache::new(GLOB_CACHE_SIZE));
}

/// Convert a key glob (`*`, `?`, `\` escapes) into an anchored regex
#[inline]
fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Fast path for globs without wildcards or with a single trailing `*`
#[inline]
fn fast_path_glob(key: &str, pattern: &str) -> Option<bool> {
    if !pattern.contains(['*', '?', '\\']) {
        return Some(key == pattern);
    }

    if let Some(prefix) = pattern.strip_suffix('*') {
        if !prefix.contains(['*', '?', '\\']) {
            return Some(key.starts_with(prefix));
        }
    }

    None
}

fn get_or_compile(pattern: &str) -> Result<Arc<Regex>> {
    {
        let mut cache = GLOB_LRU_CACHE.lock()?;
        if let Some(regex) = cache.get(pattern) {
            return Ok(Arc::clone(regex));
        }
    }

    let compiled = Arc::new(Regex::new(&glob_to_regex(pattern)).map_err(MetaError::from)?);

    {
        let mut cache = GLOB_LRU_CACHE.lock()?;
        cache.put(pattern.to_string(), Arc::clone(&compiled));
    }

    Ok(compiled)
}

/// Escape glob metacharacters so `text` only matches itself
pub fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Match a cache key against a glob pattern
#[inline]
pub fn glob_match(key: &str, pattern: &str) -> Result<bool> {
    if let Some(result) = fast_path_glob(key, pattern) {
        return Ok(result);
    }

    let regex = get_or_compile(pattern)?;
    Ok(regex.is_match(key))
}
