//! Lexical path handling for client supplied names.
//!
//! Client names are always interpreted as rooted at the tree they address, so
//! `..` can never climb above the root: `../../etc/passwd` cleans to
//! `etc/passwd`. Nothing here touches the filesystem.
use std::path::{
    Path,
    PathBuf,
};

use percent_encoding::{
    percent_decode_str,
    utf8_percent_encode,
    AsciiSet,
    CONTROLS,
};

/// Directory holding version control metadata. No client name may address it.
pub const METADATA_DIR: &str = ".git";

// Characters escaped when a relative name is turned back into a URL path.
const URL_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Lexically normalize `name` as a path relative to a tree root.
///
/// Empty, `.` and `..` segments are dropped, `..` removes the preceding
/// segment, and a leading separator is discarded. Returns `None` when nothing
/// remains.
pub fn clean(name: &str) -> Option<String> {
    let mut segments: Vec<&str> = vec!();
    for segment in name.split(|c| c == '/' || c == '\\') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            v => {
                segments.push(v);
            },
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

/// Whether a cleaned relative name lies inside the metadata directory.
pub fn is_metadata(relative: &str) -> bool {
    relative.split('/').any(|s| s.eq_ignore_ascii_case(METADATA_DIR))
}

/// Final segment of a client supplied filename, with any directory part removed.
pub fn base_name(name: &str) -> Option<String> {
    clean(name).and_then(|v| {
        v.rsplit('/').next().map(|s| s.to_string())
    })
}

/// Join a cleaned relative name onto `root`.
pub fn resolve(root: &Path, relative: &str) -> PathBuf {
    let mut p = root.to_path_buf();
    for segment in relative.split('/') {
        p.push(segment);
    }
    p
}

/// Percent-decode a raw URL path. Returns `None` if the result is not UTF-8.
pub fn decode(raw: &str) -> Option<String> {
    percent_decode_str(raw).decode_utf8().ok().map(|v| v.into_owned())
}

/// URL path for a relative name, as served from the public root.
pub fn public_url(relative: &str) -> String {
    format!("/{}", utf8_percent_encode(relative, URL_PATH))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{
        clean,
        base_name,
        decode,
        is_metadata,
        public_url,
        resolve,
    };

    #[test]
    fn test_clean() {
        assert_eq!(clean("a/b.txt").unwrap(), "a/b.txt");
        assert_eq!(clean("/a/./b/../c.html").unwrap(), "a/c.html");
        assert_eq!(clean("//index.html").unwrap(), "index.html");
        assert!(clean("").is_none());
        assert!(clean("/").is_none());
        assert!(clean("a/..").is_none());
    }

    #[test]
    fn test_clean_traversal() {
        assert_eq!(clean("../../etc/passwd").unwrap(), "etc/passwd");
        assert_eq!(clean("a/../../../b").unwrap(), "b");
        assert_eq!(clean("..\\..\\boot.ini").unwrap(), "boot.ini");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("C:/photos/cat.png").unwrap(), "cat.png");
        assert_eq!(base_name("../img/dog.jpg").unwrap(), "dog.jpg");
        assert_eq!(base_name("plain.txt").unwrap(), "plain.txt");
        assert!(base_name("../").is_none());
    }

    #[test]
    fn test_is_metadata() {
        assert!(is_metadata(".git"));
        assert!(is_metadata(".git/HEAD"));
        assert!(is_metadata("sub/.GIT/config"));
        assert!(!is_metadata("docs/.gitignore"));
        assert!(!is_metadata("a.git/x"));
        assert!(is_metadata(&clean("x/../.git/HEAD").unwrap()));
    }

    #[test]
    fn test_resolve_stays_inside() {
        let root = Path::new("/www");
        let rel = clean("../../etc/passwd").unwrap();
        let p = resolve(root, &rel);
        assert_eq!(p, Path::new("/www/etc/passwd"));
        assert!(p.starts_with(root));
    }

    #[test]
    fn test_decode_and_encode() {
        assert_eq!(decode("a%20b/c%C3%A9.html").unwrap(), "a b/c\u{e9}.html");
        assert!(decode("%FF").is_none());
        assert_eq!(public_url("my page.html"), "/my%20page.html");
        assert_eq!(public_url("caf\u{e9}.png"), "/caf%C3%A9.png");
    }
}
