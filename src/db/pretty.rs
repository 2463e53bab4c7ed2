//! Human-readable rendering of parameterized queries for log lines.
//!
//! Bound arguments are interpolated into the query template and the result is
//! folded onto a single line. The output is meant for people reading logs and
//! is never sent to a database.

use crate::db::macros::DatabaseType;
use crate::db::query::QueryParam;
use std::fmt;

/// Placeholder convention of a query template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Placeholder {
    /// Numbered placeholders: `$1`, `$2`, ...
    #[default]
    Dollar,
    /// Positional placeholders: `?`, matched left to right
    Question,
}

impl Placeholder {
    /// Placeholder style the given backend expects.
    pub fn for_database(db_type: DatabaseType) -> Self {
        match db_type {
            DatabaseType::PostgreSQL | DatabaseType::SQLite => Self::Dollar,
            DatabaseType::MySQL => Self::Question,
        }
    }
}

/// Render `query` with `args` substituted for their placeholders.
///
/// Tabs are dropped, newlines become spaces and the result is trimmed.
/// Placeholders without a matching argument are left as they are.
pub fn pretty(query: &str, placeholder: Placeholder, args: &[QueryParam]) -> String {
    let rendered: Vec<String> = args.iter().map(render).collect();
    let substituted = match placeholder {
        Placeholder::Dollar => substitute_numbered(query, &rendered),
        Placeholder::Question => substitute_positional(query, &rendered),
    };

    let mut line = String::with_capacity(substituted.len());
    for c in substituted.chars() {
        match c {
            '\t' => {}
            '\n' => line.push(' '),
            c => line.push(c),
        }
    }
    line.trim().to_string()
}

/// Lazily formatted query, for use as a tracing field so the work is only
/// done when the event is actually recorded.
pub struct PrettyQuery<'a> {
    query: &'a str,
    placeholder: Placeholder,
    args: &'a [QueryParam],
}

impl<'a> PrettyQuery<'a> {
    pub fn new(query: &'a str, placeholder: Placeholder, args: &'a [QueryParam]) -> Self {
        Self {
            query,
            placeholder,
            args,
        }
    }
}

impl fmt::Display for PrettyQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&pretty(self.query, self.placeholder, self.args))
    }
}

fn render(param: &QueryParam) -> String {
    match param {
        QueryParam::String(s) => format!("{:?}", s),
        QueryParam::Bytes(b) => format!("{:?}", String::from_utf8_lossy(b)),
        QueryParam::Null => "NULL".to_string(),
        QueryParam::Bool(v) => v.to_string(),
        QueryParam::Int(v) => v.to_string(),
        QueryParam::Float(v) => v.to_string(),
        QueryParam::Json(v) => v.to_string(),
    }
}

// `$` followed by the longest run of digits is one token, so `$1` never
// matches the head of `$12`.
fn substitute_numbered(query: &str, rendered: &[String]) -> String {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut end = start + 1;
        while let Some(&(i, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            end = i + 1;
            chars.next();
        }

        let bound = query[start + 1..end]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| rendered.get(idx));

        match bound {
            Some(value) => out.push_str(value),
            None => out.push_str(&query[start..end]),
        }
    }
    out
}

fn substitute_positional(query: &str, rendered: &[String]) -> String {
    let mut out = String::with_capacity(query.len());
    let mut next = rendered.iter();
    for c in query.chars() {
        if c == '?' {
            if let Some(value) = next.next() {
                out.push_str(value);
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn test_dollar_example() {
        let out = pretty(
            "SELECT * FROM users WHERE id = $1 AND name = $2",
            Placeholder::Dollar,
            &params![42, "Alice"],
        );
        assert_eq!(out, r#"SELECT * FROM users WHERE id = 42 AND name = "Alice""#);
    }

    #[test]
    fn test_whitespace_folding_without_args() {
        assert_eq!(
            pretty("SELECT 1\n\tFROM dual", Placeholder::Dollar, &[]),
            "SELECT 1 FROM dual"
        );
    }

    #[test]
    fn test_multiline_template() {
        let query = "\n\t\tSELECT id, name\n\t\tFROM users\n\t\tWHERE id = $1\n\t";
        assert_eq!(
            pretty(query, Placeholder::Dollar, &params![7]),
            "SELECT id, name FROM users WHERE id = 7"
        );
    }

    #[test]
    fn test_every_occurrence_replaced() {
        let out = pretty(
            "SELECT $1, $1 WHERE a = $2 OR b = $1",
            Placeholder::Dollar,
            &params!["x", 3],
        );
        assert_eq!(out, r#"SELECT "x", "x" WHERE a = 3 OR b = "x""#);
    }

    #[test]
    fn test_two_digit_placeholders() {
        let args: Vec<QueryParam> = (1..=10).map(QueryParam::from).collect();
        let out = pretty("VALUES ($1, $10)", Placeholder::Dollar, &args);
        assert_eq!(out, "VALUES (1, 10)");
    }

    #[test]
    fn test_unbound_placeholders_left_verbatim() {
        let out = pretty("a = $1 AND b = $2 AND c = $", Placeholder::Dollar, &params![1]);
        assert_eq!(out, "a = 1 AND b = $2 AND c = $");
        assert_eq!(pretty("x = $0", Placeholder::Dollar, &params![1]), "x = $0");
    }

    #[test]
    fn test_string_escaping() {
        let out = pretty(
            "INSERT INTO notes VALUES ($1)",
            Placeholder::Dollar,
            &params!["say \"hi\"\n\tbye\\"],
        );
        assert_eq!(out, r#"INSERT INTO notes VALUES ("say \"hi\"\n\tbye\\")"#);
        assert!(!out.contains('\t'));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn test_bytes_render_as_quoted_text() {
        let out = pretty("x = $1", Placeholder::Dollar, &params![b"raw".to_vec()]);
        assert_eq!(out, r#"x = "raw""#);

        let invalid = pretty("x = $1", Placeholder::Dollar, &params![vec![0xff, b'a']]);
        assert_eq!(invalid, "x = \"\u{fffd}a\"");
    }

    #[test]
    fn test_other_values_use_display() {
        let out = pretty(
            "$1 $2 $3 $4",
            Placeholder::Dollar,
            &params![None::<i64>, true, 1.25, serde_json::json!({"k": [1, 2]})],
        );
        assert_eq!(out, r#"NULL true 1.25 {"k":[1,2]}"#);
    }

    #[test]
    fn test_values_are_not_resubstituted() {
        let out = pretty("a = $1 AND b = $2", Placeholder::Dollar, &params!["$2", 5]);
        assert_eq!(out, r#"a = "$2" AND b = 5"#);
    }

    #[test]
    fn test_question_style() {
        let out = pretty(
            "SELECT * FROM t WHERE a = ? AND b = ? AND c = ?",
            Placeholder::Question,
            &params!["x", 2],
        );
        assert_eq!(out, r#"SELECT * FROM t WHERE a = "x" AND b = 2 AND c = ?"#);
    }

    #[test]
    fn test_dollar_style_ignores_question_marks() {
        let out = pretty("a = ? AND b = $1", Placeholder::Dollar, &params![1]);
        assert_eq!(out, "a = ? AND b = 1");
    }

    #[test]
    fn test_lazy_display_matches_eager() {
        let args = params![1, "z"];
        let lazy = PrettyQuery::new("f($1,\n$2)", Placeholder::Dollar, &args).to_string();
        assert_eq!(lazy, pretty("f($1,\n$2)", Placeholder::Dollar, &args));
    }

    #[test]
    fn test_placeholder_for_database() {
        assert_eq!(
            Placeholder::for_database(DatabaseType::PostgreSQL),
            Placeholder::Dollar
        );
        assert_eq!(
            Placeholder::for_database(DatabaseType::MySQL),
            Placeholder::Question
        );
        assert_eq!(
            Placeholder::for_database(DatabaseType::SQLite),
            Placeholder::Dollar
        );
    }
}
