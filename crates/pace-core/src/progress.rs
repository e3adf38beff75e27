use crate::error::Result;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

static SESSION_RE: OnceLock<Regex> = OnceLock::new();

fn session_header() -> &'static Regex {
    SESSION_RE.get_or_init(|| Regex::new(r"^###\s+Session\s+(\d+)\s*[-:]\s*(\S+)").unwrap())
}

/// One `### Session N - <FeatureId>` section of the progress log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub number: u32,
    pub feature_id: String,
    /// Text between this header and the next, without the header line.
    pub body: String,
}

/// Read-only view over `progress.txt`. The agent writes the file; this side
/// only mines it for prompt context and status output.
#[derive(Debug, Clone, Default)]
pub struct ProgressLog {
    content: String,
}

impl ProgressLog {
    pub fn parse(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// A missing file is an empty log.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn load_from_root(root: &Path) -> Result<Self> {
        Self::load(&crate::paths::progress_path(root))
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Sessions in file order. Text before the first header is dropped, and
    /// lines that look like a header but don't parse are treated as body.
    pub fn sessions(&self) -> Vec<SessionEntry> {
        let mut sessions = Vec::new();
        let mut current: Option<(u32, String, Vec<&str>)> = None;

        for line in self.content.lines() {
            if let Some(caps) = session_header().captures(line) {
                if let Ok(number) = caps[1].parse::<u32>() {
                    if let Some((n, id, body)) = current.take() {
                        sessions.push(finish(n, id, &body));
                    }
                    current = Some((number, caps[2].to_string(), Vec::new()));
                    continue;
                }
            }
            if let Some((_, _, body)) = current.as_mut() {
                body.push(line);
            }
        }
        if let Some((n, id, body)) = current {
            sessions.push(finish(n, id, &body));
        }
        sessions
    }

    pub fn last_session(&self) -> Option<SessionEntry> {
        self.sessions().pop()
    }

    /// Up to `max_lines` non-blank lines from the start of the last session,
    /// header included. Falls back to the tail of the file when no session
    /// header is present.
    pub fn recent_excerpt(&self, max_lines: usize) -> Vec<String> {
        if let Some(last) = self.last_session() {
            let header = format!("Session {} - {}", last.number, last.feature_id);
            return std::iter::once(header)
                .chain(
                    last.body
                        .lines()
                        .filter(|l| !l.trim().is_empty())
                        .map(|l| l.trim_end().to_string()),
                )
                .take(max_lines)
                .collect();
        }
        let lines: Vec<&str> = self
            .content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].iter().map(|l| l.trim_end().to_string()).collect()
    }

    pub fn next_session_number(&self) -> u32 {
        self.sessions()
            .iter()
            .map(|s| s.number)
            .max()
            .map_or(1, |n| n + 1)
    }

    /// Sessions that mention `feature_id` in their header.
    pub fn sessions_for(&self, feature_id: &str) -> Vec<SessionEntry> {
        self.sessions()
            .into_iter()
            .filter(|s| s.feature_id == feature_id)
            .collect()
    }
}

fn finish(number: u32, feature_id: String, body: &[&str]) -> SessionEntry {
    SessionEntry {
        number,
        feature_id,
        body: body.join("\n").trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LOG: &str = "\
# Progress

Project notes before any session.

### Session 1 - F001
Implemented login form.

- added tests

### Session 2 - F003
Started search.
### Session x - broken
still part of session 2
";

    #[test]
    fn splits_sessions_on_headers() {
        let log = ProgressLog::parse(LOG);
        let sessions = log.sessions();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].number, 1);
        assert_eq!(sessions[0].feature_id, "F001");
        assert_eq!(sessions[0].body, "Implemented login form.\n\n- added tests");
        assert_eq!(sessions[1].feature_id, "F003");
        assert!(sessions[1].body.contains("still part of session 2"));
    }

    #[test]
    fn last_session_and_next_number() {
        let log = ProgressLog::parse(LOG);
        assert_eq!(log.last_session().unwrap().number, 2);
        assert_eq!(log.next_session_number(), 3);
        assert_eq!(ProgressLog::default().next_session_number(), 1);
    }

    #[test]
    fn excerpt_starts_at_last_session() {
        let log = ProgressLog::parse(LOG);
        let excerpt = log.recent_excerpt(2);
        assert_eq!(excerpt, vec!["Session 2 - F003", "Started search."]);
    }

    #[test]
    fn excerpt_without_headers_uses_tail() {
        let log = ProgressLog::parse("a\n\nb\nc\n");
        assert_eq!(log.recent_excerpt(2), vec!["b", "c"]);
    }

    #[test]
    fn sessions_for_filters_by_feature() {
        let log = ProgressLog::parse(LOG);
        assert_eq!(log.sessions_for("F001").len(), 1);
        assert!(log.sessions_for("F999").is_empty());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = ProgressLog::load_from_root(dir.path()).unwrap();
        assert!(log.is_empty());
        assert!(log.sessions().is_empty());
    }

    #[test]
    fn loads_from_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(crate::paths::progress_path(dir.path()), LOG).unwrap();
        let log = ProgressLog::load_from_root(dir.path()).unwrap();
        assert_eq!(log.sessions().len(), 2);
    }
}
