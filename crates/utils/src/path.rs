use camino::{Utf8Path, Utf8PathBuf};

/// Join an absolute in-config path onto a target root. `path` must be
/// absolute; the result is `root` + `path` with the leading slash of
/// `path` dropped so it cannot escape the root.
pub fn join_under_root(root: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    debug_assert!(path.is_absolute());
    let rel = path.as_str().trim_start_matches('/');
    root.join(rel)
}

/// Join a filesystem-relative path onto an absolute mountpoint, collapsing
/// duplicate slashes. Mirrors lexical `path.Join` semantics for the two
/// segments: the result is always absolute and never ends in a slash
/// (except for "/" itself).
pub fn join_absolute(mountpoint: &str, path: &str) -> String {
    let mut out = String::from("/");
    for seg in mountpoint.split('/').chain(path.split('/')) {
        if seg.is_empty() || seg == "." {
            continue;
        }
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(seg);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_under_root() {
        assert_eq!(
            join_under_root("/sysroot".into(), "/etc/hostname".into()),
            Utf8PathBuf::from("/sysroot/etc/hostname")
        );
        assert_eq!(
            join_under_root("/".into(), "/etc".into()),
            Utf8PathBuf::from("/etc")
        );
    }

    #[test]
    fn test_join_absolute() {
        assert_eq!(join_absolute("/mnt/data", "/x"), "/mnt/data/x");
        assert_eq!(join_absolute("/mnt/data/", "x"), "/mnt/data/x");
        assert_eq!(join_absolute("/", "/a/b"), "/a/b");
        assert_eq!(join_absolute("", "a"), "/a");
        assert_eq!(join_absolute("/", ""), "/");
    }
}
