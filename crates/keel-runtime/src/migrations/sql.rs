//! Statement splitting for migration script bodies.

/// How a backend treats backslashes inside string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Backslash is an ordinary character (SQLite).
    Standard,
    /// Backslash escapes only inside `E'...'` strings (PostgreSQL).
    Postgres,
    /// Backslash escapes inside `'...'` and `"..."` literals (MySQL default mode).
    MySql,
}

/// Lexical context while scanning a script.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scan {
    Code,
    Quoted { quote: char, escapes: bool },
    LineComment,
    BlockComment,
    DollarQuoted(String),
}

/// Split a script into individual statements.
///
/// Semicolons inside string literals, quoted identifiers, comments and
/// PostgreSQL dollar-quoted bodies (`$$ ... $$`, `$tag$ ... $tag$`) do not end
/// a statement. Comment-only fragments are dropped.
pub fn split_sql_statements(sql: &str, dialect: Dialect) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut scan = Scan::Code;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        let next = match &scan {
            Scan::Code => match c {
                '\'' | '"' | '`' => Some(Scan::Quoted {
                    quote: c,
                    escapes: takes_escapes(dialect, c, &current),
                }),
                '-' if chars.peek() == Some(&'-') => {
                    current.push('-');
                    chars.next();
                    Some(Scan::LineComment)
                }
                '/' if chars.peek() == Some(&'*') => {
                    current.push('*');
                    chars.next();
                    Some(Scan::BlockComment)
                }
                '$' => read_dollar_tag(&mut chars, &mut current).map(Scan::DollarQuoted),
                ';' => {
                    push_statement(&mut statements, &current);
                    current.clear();
                    None
                }
                _ => None,
            },
            Scan::Quoted { escapes: true, .. } if c == '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                None
            }
            // A doubled quote ('') is an escaped quote, not the end of the literal.
            Scan::Quoted { quote, .. } if c == *quote && chars.peek() == Some(quote) => {
                current.push(*quote);
                chars.next();
                None
            }
            Scan::Quoted { quote, .. } if c == *quote => Some(Scan::Code),
            Scan::Quoted { .. } => None,
            Scan::LineComment if c == '\n' => Some(Scan::Code),
            Scan::LineComment => None,
            Scan::BlockComment if c == '*' && chars.peek() == Some(&'/') => {
                current.push('/');
                chars.next();
                Some(Scan::Code)
            }
            Scan::BlockComment => None,
            Scan::DollarQuoted(tag) if c == '$' => {
                match read_dollar_tag(&mut chars, &mut current) {
                    Some(closing) if closing == *tag => Some(Scan::Code),
                    _ => None,
                }
            }
            Scan::DollarQuoted(_) => None,
        };

        if let Some(next) = next {
            scan = next;
        }
    }

    // Last statement might not end with ;
    push_statement(&mut statements, &current);
    statements
}

/// Whether the literal opened by `quote` (the last char of `current`) treats
/// backslash as an escape.
fn takes_escapes(dialect: Dialect, quote: char, current: &str) -> bool {
    match dialect {
        Dialect::Standard => false,
        Dialect::MySql => quote != '`',
        Dialect::Postgres => {
            if quote != '\'' {
                return false;
            }
            let mut before = current.chars().rev().skip(1);
            matches!(before.next(), Some('E' | 'e'))
                && !before.next().is_some_and(|c| c.is_alphanumeric() || c == '_')
        }
    }
}

/// After a `$`, consume an optional identifier and the closing `$`.
///
/// Returns the full tag (`$$` or `$name$`). Positional parameters such as
/// `$1` are not tags.
fn read_dollar_tag(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    current: &mut String,
) -> Option<String> {
    let mut tag = String::from("$");

    while let Some(&c) = chars.peek() {
        if c == '$' {
            chars.next();
            current.push(c);
            tag.push(c);
            return Some(tag);
        }

        let starts_with_digit = tag.len() == 1 && c.is_ascii_digit();
        if starts_with_digit || !(c.is_alphanumeric() || c == '_') {
            return None;
        }

        chars.next();
        current.push(c);
        tag.push(c);
    }

    None
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let stmt = raw.trim().trim_end_matches(';').trim();

    if !stmt.is_empty() && !is_comment_only(stmt) {
        statements.push(stmt.to_string());
    }
}

fn is_comment_only(stmt: &str) -> bool {
    let line_comments = stmt.lines().all(|l| {
        let l = l.trim();
        l.is_empty() || l.starts_with("--")
    });

    let block_comment = stmt.len() >= 4
        && stmt.starts_with("/*")
        && stmt.ends_with("*/")
        && !stmt[2..stmt.len() - 2].contains("*/");

    line_comments || block_comment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple_statements() {
        let stmts = split_sql_statements("SELECT 1; SELECT 2; SELECT 3;", Dialect::Standard);
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
    }

    #[test]
    fn test_split_without_trailing_semicolon() {
        let stmts = split_sql_statements("CREATE TABLE t(x int);\nDROP TABLE t", Dialect::Standard);
        assert_eq!(stmts, vec!["CREATE TABLE t(x int)", "DROP TABLE t"]);
    }

    #[test]
    fn test_split_empty_and_comment_only() {
        assert!(split_sql_statements("", Dialect::Standard).is_empty());
        assert!(split_sql_statements("   \n\t", Dialect::Standard).is_empty());
        assert!(
            split_sql_statements("-- Migration: add users\n-- nothing yet\n", Dialect::Standard)
                .is_empty()
        );
        assert!(split_sql_statements("/* reserved */;", Dialect::Standard).is_empty());
    }

    #[test]
    fn test_split_ignores_semicolons_in_literals() {
        let sql = "INSERT INTO notes (body) VALUES ('a; b');\n\
                   INSERT INTO notes (body) VALUES ('it''s; fine');";
        let stmts = split_sql_statements(sql, Dialect::Standard);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].ends_with("('a; b')"));
        assert!(stmts[1].contains("'it''s; fine'"));
    }

    #[test]
    fn test_split_ignores_semicolons_in_comments() {
        let sql = "-- drop; later\nCREATE TABLE a(x int); /* one; two */ CREATE TABLE b(y int);";
        let stmts = split_sql_statements(sql, Dialect::Standard);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("CREATE TABLE a"));
        assert!(stmts[1].contains("CREATE TABLE b"));
    }

    #[test]
    fn test_split_with_dollar_quoted_function() {
        let sql = r#"
CREATE FUNCTION test() RETURNS void AS $$
BEGIN
    SELECT 1;
    SELECT 2;
END;
$$ LANGUAGE plpgsql;

SELECT 3;
"#;
        let stmts = split_sql_statements(sql, Dialect::Postgres);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("CREATE FUNCTION"));
        assert!(stmts[0].contains("$$ LANGUAGE plpgsql"));
        assert!(stmts[1].contains("SELECT 3"));
    }

    #[test]
    fn test_split_with_named_dollar_tag() {
        let sql = "CREATE FUNCTION f() RETURNS text AS $body$ SELECT 'x;y'; $body$ LANGUAGE sql; \
                   SELECT 4;";
        let stmts = split_sql_statements(sql, Dialect::Postgres);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].ends_with("$body$ LANGUAGE sql"));
    }

    #[test]
    fn test_positional_parameter_is_not_a_tag() {
        let stmts = split_sql_statements("SELECT $1; SELECT 2;", Dialect::Postgres);
        assert_eq!(stmts, vec!["SELECT $1", "SELECT 2"]);
    }

    #[test]
    fn test_mysql_backslash_escaped_quote() {
        let sql = "INSERT INTO t VALUES ('it\\'s; fine'); SELECT 1;";
        let stmts = split_sql_statements(sql, Dialect::MySql);
        assert_eq!(stmts, vec!["INSERT INTO t VALUES ('it\\'s; fine')", "SELECT 1"]);
    }

    #[test]
    fn test_mysql_escaped_backslash_before_closing_quote() {
        let sql = "INSERT INTO t VALUES ('C:\\\\'); SELECT 2;";
        let stmts = split_sql_statements(sql, Dialect::MySql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1], "SELECT 2");
    }

    #[test]
    fn test_postgres_escape_string() {
        let sql = "INSERT INTO t VALUES (E'it\\'s; fine'); \
                   INSERT INTO t VALUES ('C:\\'); SELECT 3;";
        let stmts = split_sql_statements(sql, Dialect::Postgres);
        assert_eq!(stmts.len(), 3);
        assert_eq!(stmts[0], "INSERT INTO t VALUES (E'it\\'s; fine')");
        assert_eq!(stmts[2], "SELECT 3");

        let doubled = "INSERT INTO t VALUES (E'a''b\\'; c'); SELECT 4;";
        assert_eq!(split_sql_statements(doubled, Dialect::Postgres).len(), 2);
    }

    #[test]
    fn test_standard_backslash_is_literal() {
        let stmts = split_sql_statements("SELECT 'a\\'; SELECT 2;", Dialect::Standard);
        assert_eq!(stmts, vec!["SELECT 'a\\'", "SELECT 2"]);
    }
}
