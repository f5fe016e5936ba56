//! Text rendering for human-friendly diagnostics.
//!
//! Everything here works on plain strings so that the container crate can
//! feed it type names, scope labels and edge kinds without this crate
//! knowing about keys or scopes.

use std::fmt::Write as _;

/// Renders a resolution path on one line.
///
/// ```
/// use tanzim_support::rendering::render_path;
///
/// let path = ["UserService", "UserRepo", "Database"];
/// assert_eq!(render_path(&path), "UserService -> UserRepo -> Database");
/// ```
pub fn render_path(path: &[impl AsRef<str>]) -> String {
    let mut out = String::new();
    for (i, step) in path.iter().enumerate() {
        if i > 0 {
            out.push_str(" -> ");
        }
        out.push_str(step.as_ref());
    }
    out
}

/// One hop of a dependency path rendered by [`render_cycle`].
#[derive(Debug, Clone)]
pub struct PathEntry {
    /// Type name shown for this hop.
    pub type_name: String,
    /// Scope label, e.g. `"App"` or `"Request"`.
    pub scope: String,
    /// Whether the edge leaving this hop accepts a deferred reference.
    pub deferred: bool,
}

/// Renders a cycle vertically, one hop per line, with scope labels and
/// the kind of edge between hops.
///
/// ```text
/// [App    ] Mailer
///           | eager
/// [Request] Session
///           : deferred
/// [App    ] Mailer
/// ```
pub fn render_cycle(entries: &[PathEntry]) -> String {
    let width = entries.iter().map(|e| e.scope.len()).max().unwrap_or(0);
    let mut out = String::new();

    for (i, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "[{:<width$}] {}", entry.scope, entry.type_name);
        if i + 1 < entries.len() {
            let (bar, label) = if entry.deferred { (':', "deferred") } else { ('|', "eager") };
            let _ = writeln!(out, "{}{bar} {label}", " ".repeat(width + 3));
        }
    }

    out
}

/// Renders a numbered list, one item per line, indented by two spaces.
pub fn render_numbered(items: &[impl AsRef<str>]) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        let mut lines = item.as_ref().lines();
        if let Some(first) = lines.next() {
            let _ = writeln!(out, "  {}. {first}", i + 1);
        }
        for rest in lines {
            let _ = writeln!(out, "     {rest}");
        }
    }
    out
}

/// Drops module paths from a fully qualified type name, keeping generic
/// structure intact.
///
/// ```
/// use tanzim_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("app::db::Pool"), "Pool");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn app::mail::Mailer>"),
///     "Arc<dyn Mailer>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut out = String::with_capacity(full_name.len());
    let mut segment = String::new();
    let mut chars = full_name.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                out.push_str(&segment);
                out.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    out.push_str(&segment);
    out
}

/// Returns up to `limit` names from `available` that look like `requested`,
/// closest first.
///
/// Names are compared by their shortened, lowercased form. Substring
/// matches rank first, then names within a small edit distance.
pub fn suggest_similar(requested: &str, available: &[&str], limit: usize) -> Vec<String> {
    let wanted = shorten_type_name(requested).to_lowercase();
    if wanted.is_empty() {
        return Vec::new();
    }
    let budget = (wanted.chars().count() / 3).max(1);

    let mut scored: Vec<(usize, &str)> = available
        .iter()
        .filter_map(|&name| {
            let candidate = shorten_type_name(name).to_lowercase();
            if candidate == wanted {
                return None;
            }
            if candidate.contains(&wanted) || wanted.contains(&candidate) {
                return Some((0, name));
            }
            let distance = edit_distance(&wanted, &candidate);
            (distance <= budget).then_some((distance, name))
        })
        .collect();

    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored.into_iter().take(limit).map(|(_, name)| name.to_string()).collect()
}

/// Levenshtein distance over chars, single-row.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(ca != *cb);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }

    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_rendering() {
        assert_eq!(render_path(&["A", "B", "A"]), "A -> B -> A");
        assert_eq!(render_path(&["A"]), "A");
        assert_eq!(render_path(&[] as &[&str]), "");
    }

    #[test]
    fn cycle_rendering_marks_edges() {
        let entries = vec![
            PathEntry { type_name: "Mailer".into(), scope: "App".into(), deferred: false },
            PathEntry { type_name: "Session".into(), scope: "Request".into(), deferred: true },
            PathEntry { type_name: "Mailer".into(), scope: "App".into(), deferred: false },
        ];

        let rendered = render_cycle(&entries);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "[App    ] Mailer");
        assert!(lines[1].ends_with("| eager"));
        assert_eq!(lines[2], "[Request] Session");
        assert!(lines[3].ends_with(": deferred"));
    }

    #[test]
    fn numbered_list_indents_continuation_lines() {
        let rendered = render_numbered(&["first", "second\n  detail"]);
        assert_eq!(rendered, "  1. first\n  2. second\n       detail\n");
    }

    #[test]
    fn shorten_paths_and_generics() {
        assert_eq!(shorten_type_name("String"), "String");
        assert_eq!(shorten_type_name("my_app::services::UserService"), "UserService");
        assert_eq!(
            shorten_type_name("std::collections::HashMap<alloc::string::String, u32>"),
            "HashMap<String, u32>"
        );
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }

    #[test]
    fn suggests_typos_first() {
        let available = [
            "app::UserService",
            "app::UserRepository",
            "app::Database",
        ];

        let suggestions = suggest_similar("app::UserServise", &available, 3);
        assert_eq!(suggestions.first().map(String::as_str), Some("app::UserService"));
    }

    #[test]
    fn no_suggestion_for_unrelated_names() {
        let suggestions = suggest_similar("XyzAbcDef", &["app::Database"], 3);
        assert!(suggestions.is_empty());
    }
}
