//! `{{field}}` placeholder substitution for connection strings.

use crate::snapshot::Snapshot;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Substitute every `{{name}}` in `template` with the value of `name` from
/// `snapshot`.
///
/// Placeholders whose name is absent from the snapshot are copied through
/// verbatim. Inserted values are not scanned again.
///
/// ```
/// use vault_sql::{Snapshot, template};
///
/// let snapshot: Snapshot = [("username", "user"), ("password", "pass")].into_iter().collect();
/// assert_eq!(
///     template::resolve("{{username}}:{{password}}@tcp(127.0.0.1:3306)/database", &snapshot),
///     "user:pass@tcp(127.0.0.1:3306)/database",
/// );
/// ```
#[must_use]
pub fn resolve(template: &str, snapshot: &Snapshot) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some((before, name, after)) = next_placeholder(rest) {
        out.push_str(before);
        match snapshot.get(name) {
            Some(value) => out.push_str(value),
            None => {
                out.push_str(OPEN);
                out.push_str(name);
                out.push_str(CLOSE);
            }
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Placeholder names in order of appearance, duplicates included.
#[must_use]
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some((_, name, after)) = next_placeholder(rest) {
        names.push(name);
        rest = after;
    }
    names
}

/// Placeholder names that `snapshot` cannot fill.
#[must_use]
pub fn unresolved<'a>(template: &'a str, snapshot: &Snapshot) -> Vec<&'a str> {
    placeholders(template)
        .into_iter()
        .filter(|name| !snapshot.contains(name))
        .collect()
}

/// Split off the text before the next placeholder, its name, and the
/// remainder. The `{{` closest to the closing `}}` wins when opening braces
/// repeat.
fn next_placeholder(input: &str) -> Option<(&str, &str, &str)> {
    let first = input.find(OPEN)?;
    let name_from = first + OPEN.len();
    let end = name_from + input[name_from..].find(CLOSE)?;
    let start = first + input[first..end].rfind(OPEN)?;
    let name = &input[start + OPEN.len()..end];
    Some((&input[..start], name, &input[end + CLOSE.len()..]))
}
