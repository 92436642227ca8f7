use thiserror::Error;

/// Name used when nothing usable survives sanitization
pub const FALLBACK_FILENAME: &str = "unnamed";

/// Longest file name most filesystems accept, in bytes
const MAX_FILENAME_BYTES: usize = 255;

/// Device names Windows refuses to open as regular files
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Problems with the shape of an upload request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no file part")]
    NoFilePart,

    #[error("empty filename")]
    EmptyFilename,
}

impl ValidationError {
    /// Message shown to the uploader
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoFilePart => "No file part.",
            Self::EmptyFilename => "No selected file.",
        }
    }
}

/// Turns an untrusted client filename into a single path component that is
/// safe to join onto the staging root.
///
/// Never fails: a name with nothing usable left becomes [`FALLBACK_FILENAME`].
pub fn sanitize_filename(filename: &str) -> String {
    // Keep only the last component, whichever separator the client used
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    if name.len() != filename.len() {
        tracing::warn!("Path components stripped from uploaded filename: {:?}", filename);
    }

    let replaced: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';' => '_',
            _ => c,
        })
        .collect();

    // No hidden files, no option-looking names, nothing Windows would silently trim
    let trimmed = replaced
        .trim_start_matches(|c: char| c == '.' || c == '-' || c == '~' || c.is_whitespace())
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    let mut sanitized = truncate_at_char_boundary(trimmed, MAX_FILENAME_BYTES).to_string();

    let stem = sanitized.split('.').next().unwrap_or_default();
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
    {
        sanitized.insert(0, '_');
        sanitized = truncate_at_char_boundary(&sanitized, MAX_FILENAME_BYTES).to_string();
    }

    if sanitized.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }

    sanitized
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Component, Path};

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("my file.doc"), "my file.doc");
        assert_eq!(sanitize_filename("test<script>.pdf"), "test_script_.pdf");
        assert_eq!(sanitize_filename("测试.txt"), "测试.txt");
        assert_eq!(sanitize_filename("evil.exe"), "evil.exe");
    }

    #[test]
    fn test_path_traversal_is_stripped() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\windows\\system32"), "system32");
        assert_eq!(sanitize_filename("a/b\\c"), "c");
        assert_eq!(sanitize_filename("/abs/path/file.txt"), "file.txt");
    }

    #[test]
    fn test_degenerate_names_fall_back() {
        assert_eq!(sanitize_filename(""), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename(".."), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("../"), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("..."), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("\u{0}\u{7}\n"), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("   "), FALLBACK_FILENAME);
    }

    #[test]
    fn test_hidden_and_special_prefixes_removed() {
        assert_eq!(sanitize_filename(".htaccess"), "htaccess");
        assert_eq!(sanitize_filename("--rf"), "rf");
        assert_eq!(sanitize_filename("name.txt. . "), "name.txt");
        assert_eq!(sanitize_filename("bad\u{0}name.txt"), "badname.txt");
    }

    #[test]
    fn test_reserved_device_names() {
        assert_eq!(sanitize_filename("CON"), "_CON");
        assert_eq!(sanitize_filename("nul.txt"), "_nul.txt");
        assert_eq!(sanitize_filename("console.txt"), "console.txt");
    }

    #[test]
    fn test_long_names_are_truncated_on_char_boundary() {
        let long = "é".repeat(300);
        let sanitized = sanitize_filename(&long);
        assert!(sanitized.len() <= MAX_FILENAME_BYTES);
        assert!(sanitized.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_result_is_always_a_single_normal_component() {
        let root = Path::new("uploads");
        let inputs = [
            "../../etc/passwd",
            "a/b\\c",
            "",
            "..",
            ".",
            "/",
            "\\\\server\\share\\x",
            "C:\\Windows\\win.ini",
            "....//....//x",
            "foo/..",
            "\u{202e}exe.txt",
            "..\u{0}/x",
        ];
        for input in inputs {
            let name = sanitize_filename(input);
            assert!(!name.is_empty(), "empty result for {:?}", input);
            let joined = root.join(&name);
            let components: Vec<_> = Path::new(&name).components().collect();
            assert_eq!(components.len(), 1, "{:?} -> {:?}", input, name);
            assert!(matches!(components[0], Component::Normal(_)));
            assert_eq!(joined.parent(), Some(root), "{:?} escaped root", input);
        }
    }

    #[test]
    fn test_validation_messages() {
        assert_eq!(ValidationError::NoFilePart.user_message(), "No file part.");
        assert_eq!(ValidationError::EmptyFilename.to_string(), "empty filename");
    }
}
