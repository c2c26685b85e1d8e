//! The [`File`] entry type and its opaque mtime token.

use std::time::SystemTime;

/// Opaque disk-timestamp token used only for equality comparison by the
/// Change Detector's spurious-event short-circuit. `0` is the sentinel used
/// for committed-namespace entries, which have no backing mtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Mtime(pub u128);

impl Mtime {
    pub const ZERO: Mtime = Mtime(0);

    pub fn from_system_time(t: SystemTime) -> Self {
        let nanos = t
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Mtime(nanos)
    }
}

/// A single open file held by the [`super::Registry`].
#[derive(Debug, Clone)]
pub struct File {
    pub content: String,
    pub ref_count: u32,
    pub mtime: Mtime,
}

impl File {
    pub fn new(content: String, mtime: Mtime) -> Self {
        File {
            content,
            ref_count: 1,
            mtime,
        }
    }
}

/// A registry key: either a working-tree path or a committed (`@`-prefixed)
/// path. The two namespaces never collide even for the same underlying file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Name {
    Working(String),
    Committed(String),
}

impl Name {
    /// Parse a client-supplied path, stripping the leading `@` sigil into
    /// the committed-namespace variant.
    pub fn parse(client_path: &str) -> Self {
        match client_path.strip_prefix('@') {
            Some(rest) => Name::Committed(rest.to_string()),
            None => Name::Working(client_path.to_string()),
        }
    }

    /// The repository-relative path with any namespace sigil stripped,
    /// suitable for [`crate::path::validate`] and git blob lookups.
    pub fn relative_path(&self) -> &str {
        match self {
            Name::Working(p) | Name::Committed(p) => p,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Name::Committed(_))
    }

    /// The canonical wire-form string, e.g. `@notes/a.md` or `notes/a.md`.
    pub fn wire(&self) -> String {
        match self {
            Name::Working(p) => p.clone(),
            Name::Committed(p) => format!("@{p}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_working_name() {
        assert_eq!(Name::parse("a.md"), Name::Working("a.md".to_string()));
    }

    #[test]
    fn parses_committed_name() {
        assert_eq!(Name::parse("@a.md"), Name::Committed("a.md".to_string()));
    }

    #[test]
    fn round_trips_wire_form() {
        assert_eq!(Name::parse("@a.md").wire(), "@a.md");
        assert_eq!(Name::parse("a.md").wire(), "a.md");
    }
}
