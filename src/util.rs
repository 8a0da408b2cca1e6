use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub(crate) fn retriable_status(code: u16) -> bool {
    matches!(code, 500 | 502 | 503 | 504 | 429 | 408)
}

pub(crate) fn backoff(current: Duration, max: Duration) -> Duration {
    let next = Duration::from_secs_f64((current.as_secs_f64() * 1.5).max(1.0));
    if next > max { max } else { next }
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Turns a remote file name into a relative path that cannot escape the
/// destination directory. Returns `None` for absolute names, `..` segments
/// and empty names.
pub(crate) fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Truncates a remote body for inclusion in an error message.
pub(crate) fn snippet(text: &str) -> String {
    const LIMIT: usize = 512;
    let text = text.trim();
    if text.len() <= LIMIT {
        return text.to_string();
    }
    let mut end = LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let max = Duration::from_secs(10);
        assert_eq!(backoff(Duration::from_secs(2), max), Duration::from_secs(3));
        assert_eq!(backoff(Duration::from_secs(8), max), max);
        assert_eq!(backoff(Duration::ZERO, max), Duration::from_secs(1));
    }

    #[test]
    fn urljoin_handles_slashes() {
        assert_eq!(urljoin("https://h/api/", "task"), "https://h/api/task");
        assert_eq!(urljoin("https://h/api", "/task"), "https://h/api/task");
        assert_eq!(urljoin("https://h/api", "https://x/y"), "https://x/y");
    }

    #[test]
    fn safe_relative_path_rejects_escapes() {
        assert_eq!(
            safe_relative_path("sub/a.tif"),
            Some(PathBuf::from("sub").join("a.tif"))
        );
        assert_eq!(safe_relative_path("./a.tif"), Some(PathBuf::from("a.tif")));
        assert!(safe_relative_path("../a.tif").is_none());
        assert!(safe_relative_path("/etc/passwd").is_none());
        assert!(safe_relative_path("").is_none());
    }

    #[test]
    fn snippet_truncates_long_bodies() {
        let long = "x".repeat(600);
        let s = snippet(&long);
        assert!(s.ends_with("..."));
        assert_eq!(s.len(), 515);
        assert_eq!(snippet("  short "), "short");
    }
}
