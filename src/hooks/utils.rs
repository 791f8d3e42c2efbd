use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use chrono::{Local, NaiveDate, Utc};
use regex::Regex;

/// Compile a built-in pattern once. Built-in patterns are covered by tests,
/// so a failure here is a programming error.
pub fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("built-in pattern must compile"))
}

/// UTC timestamp in the `2025-01-01T12:00:00Z` form used by every log.
pub fn utc_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Split a shell command line into segments on `&&`, `||`, `;`, `|` and
/// newlines, ignoring separators inside quotes.
pub fn split_segments(command: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                } else if c == '\\' && q == '"' {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '\\' => {
                    current.push(c);
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                ';' | '\n' => push_segment(&mut segments, &mut current),
                '&' if chars.peek() == Some(&'&') => {
                    chars.next();
                    push_segment(&mut segments, &mut current);
                }
                '|' => {
                    if chars.peek() == Some(&'|') {
                        chars.next();
                    }
                    push_segment(&mut segments, &mut current);
                }
                _ => current.push(c),
            },
        }
    }
    push_segment(&mut segments, &mut current);
    segments
}

fn push_segment(segments: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
    current.clear();
}

/// Split one command segment into words, honoring single quotes, double
/// quotes and backslash escapes.
pub fn shell_words(segment: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = segment.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            Some(_) => match c {
                '"' => quote = None,
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                _ => current.push(c),
            },
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Strip leading `VAR=value` assignments and `sudo`/`env` wrappers so the
/// first word is the program actually run.
pub fn program_words(segment: &str) -> Vec<String> {
    let words = shell_words(segment);
    let start = words
        .iter()
        .position(|w| !(w.contains('=') && !w.starts_with('-')) && w != "sudo" && w != "env")
        .unwrap_or(words.len());
    words[start..].to_vec()
}

/// Resolve `path` against `base` and collapse `.`/`..` without touching
/// the filesystem.
pub fn normalize_path(base: &Path, path: &str) -> PathBuf {
    let joined = if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// File name of a path-like string, without touching the filesystem.
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// The portion of `path` after its last `<dir>/` component, e.g.
/// `relative_to_dir("/a/memory/projects/x.md", "memory")` is `projects/x.md`.
pub fn relative_to_dir<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    let needle = format!("{}/", dir);
    if let Some(rest) = path.strip_prefix(&needle) {
        return Some(rest);
    }
    let needle = format!("/{}/", dir);
    path.rfind(&needle).map(|idx| &path[idx + needle.len()..])
}

/// Read a transcript named by a hook payload. Missing, empty or unreadable
/// paths all yield `None`.
pub fn read_transcript(path: Option<&str>) -> Option<String> {
    let path = path?;
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::debug!(path, error = %e, "transcript unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_segments_on_operators() {
        assert_eq!(
            split_segments("git add . && git commit -m 'a; b' | cat ; echo done || true"),
            vec!["git add .", "git commit -m 'a; b'", "cat", "echo done", "true"]
        );
        assert!(split_segments("   ").is_empty());
    }

    #[test]
    fn split_segments_keeps_double_quoted_separators() {
        assert_eq!(
            split_segments(r#"echo "x && y" && ls"#),
            vec![r#"echo "x && y""#, "ls"]
        );
    }

    #[test]
    fn shell_words_handles_quotes() {
        assert_eq!(
            shell_words(r#"git commit -m "feat: add \"x\"" --amend"#),
            vec!["git", "commit", "-m", r#"feat: add "x""#, "--amend"]
        );
        assert_eq!(shell_words("echo 'a b'  c"), vec!["echo", "a b", "c"]);
        assert_eq!(shell_words(r#"echo """#), vec!["echo", ""]);
    }

    #[test]
    fn program_words_strips_wrappers() {
        assert_eq!(
            program_words("FOO=1 sudo pip install x"),
            vec!["pip", "install", "x"]
        );
        assert_eq!(program_words("npm install --save=true"), vec!["npm", "install", "--save=true"]);
    }

    #[test]
    fn normalize_path_collapses_dots() {
        assert_eq!(
            normalize_path(Path::new("/proj"), "src/../../etc/passwd"),
            PathBuf::from("/etc/passwd")
        );
        assert_eq!(
            normalize_path(Path::new("/proj"), "./src/main.rs"),
            PathBuf::from("/proj/src/main.rs")
        );
        assert_eq!(normalize_path(Path::new("/proj"), "/tmp/x"), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn relative_to_dir_finds_last_component() {
        assert_eq!(
            relative_to_dir("/a/forge-plugin/memory/projects/x.md", "memory"),
            Some("projects/x.md")
        );
        assert_eq!(relative_to_dir("memory/index.md", "memory"), Some("index.md"));
        assert_eq!(relative_to_dir("/a/memorybank/x.md", "memory"), None);
    }

    #[test]
    fn file_name_of_path() {
        assert_eq!(file_name("/a/b/c.md"), "c.md");
        assert_eq!(file_name("c.md"), "c.md");
    }

    #[test]
    fn read_transcript_tolerates_missing() {
        assert_eq!(read_transcript(None), None);
        assert_eq!(read_transcript(Some("/nonexistent/transcript.txt")), None);
    }
}
