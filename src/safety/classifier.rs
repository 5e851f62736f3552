//! Ordered allow-list rules for SQL statements.
//!
//! Each rule is a pure predicate over the trimmed text. Rules run in order
//! and the first one that objects decides the rejection reason.

use super::{AllowedStatement, Rejection, Verdict};

/// Reserved namespace prefixes rejected when `[safety]` does not override them.
pub const DEFAULT_RESERVED_PREFIXES: &[&str] = &["pg_"];

/// Leading keywords a statement may start with.
const ALLOWED_LEADING_KEYWORDS: &[&str] = &["SELECT", "WITH"];

/// Keywords that may not appear anywhere outside quoted text.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "EXECUTE", "EXEC", "CALL", "LOAD_FILE",
];

type Rule = fn(&SqlClassifier, &str) -> Option<Rejection>;

/// Rules in application order.
const RULES: &[Rule] = &[
    reject_empty,
    reject_non_select,
    reject_multiple_statements,
    reject_comments,
    reject_system_objects,
    reject_forbidden_keywords,
];

/// Classifier holding the configurable parts of the rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlClassifier {
    reserved_prefixes: Vec<String>,
}

impl Default for SqlClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlClassifier {
    /// Creates a classifier with the default reserved prefixes.
    pub fn new() -> Self {
        Self::with_reserved_prefixes(DEFAULT_RESERVED_PREFIXES.iter().copied())
    }

    /// Creates a classifier rejecting references to the given namespace prefixes.
    ///
    /// Prefixes are matched case-insensitively; empty entries are ignored.
    pub fn with_reserved_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let reserved_prefixes = prefixes
            .into_iter()
            .map(|p| p.as_ref().trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { reserved_prefixes }
    }

    /// Returns the configured reserved prefixes (lowercased).
    pub fn reserved_prefixes(&self) -> &[String] {
        &self.reserved_prefixes
    }

    /// Classifies a SQL string.
    pub fn classify(&self, sql: &str) -> Verdict {
        let trimmed = sql.trim();
        match RULES.iter().find_map(|rule| rule(self, trimmed)) {
            Some(rejection) => Verdict::Rejected(rejection),
            None => Verdict::Allowed(AllowedStatement::new(trimmed)),
        }
    }
}

/// Convenience function to classify SQL with the default rule set.
pub fn classify_sql(sql: &str) -> Verdict {
    SqlClassifier::new().classify(sql)
}

fn reject_empty(_: &SqlClassifier, sql: &str) -> Option<Rejection> {
    sql.is_empty().then_some(Rejection::Empty)
}

fn reject_non_select(_: &SqlClassifier, sql: &str) -> Option<Rejection> {
    let end = sql
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(sql.len());
    let keyword = sql[..end].to_ascii_uppercase();

    if ALLOWED_LEADING_KEYWORDS.contains(&keyword.as_str()) {
        None
    } else {
        Some(Rejection::NonSelect)
    }
}

fn reject_multiple_statements(_: &SqlClassifier, sql: &str) -> Option<Rejection> {
    let trailing_content = sql
        .match_indices(';')
        .any(|(i, _)| !skip_trivia(&sql[i + 1..]).is_empty());
    trailing_content.then_some(Rejection::MultipleStatements)
}

fn reject_comments(_: &SqlClassifier, sql: &str) -> Option<Rejection> {
    let has_comment = sql.contains("--") || sql.contains("/*") || sql.contains("*/");
    has_comment.then_some(Rejection::Comments)
}

fn reject_system_objects(classifier: &SqlClassifier, sql: &str) -> Option<Rejection> {
    let masked = mask_quoted(sql, &['\'']).to_ascii_lowercase();

    let referenced = classifier.reserved_prefixes.iter().any(|prefix| {
        masked
            .match_indices(prefix.as_str())
            .any(|(i, _)| !masked[..i].chars().next_back().is_some_and(is_ident_char))
    });
    referenced.then_some(Rejection::SystemObject)
}

fn reject_forbidden_keywords(_: &SqlClassifier, sql: &str) -> Option<Rejection> {
    let masked = mask_quoted(sql, &['\'', '"']);
    let words: Vec<String> = masked
        .split(|c: char| !is_ident_char(c))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase())
        .collect();

    let forbidden = words
        .iter()
        .any(|w| FORBIDDEN_KEYWORDS.contains(&w.as_str()))
        || words.windows(2).any(|w| w[0] == "INTO" && w[1] == "OUTFILE");
    forbidden.then_some(Rejection::ForbiddenKeyword)
}

/// Skips whitespace and comments, returning whatever follows.
fn skip_trivia(mut s: &str) -> &str {
    loop {
        s = s.trim_start();
        if let Some(rest) = s.strip_prefix("--") {
            s = rest.find('\n').map_or("", |i| &rest[i + 1..]);
        } else if let Some(rest) = s.strip_prefix("/*") {
            s = rest.find("*/").map_or("", |i| &rest[i + 2..]);
        } else {
            return s;
        }
    }
}

/// Replaces quoted sections (quotes included) with spaces.
///
/// A doubled quote inside a quoted section is an escaped quote. An
/// unterminated section runs to the end of the text. Text containing `$`
/// or `\` may use dollar quoting or backslash escapes, whose boundaries
/// this scanner cannot follow, so it is returned unmasked.
fn mask_quoted(text: &str, quotes: &[char]) -> String {
    if text.contains(['$', '\\']) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut open: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match open {
            Some(q) => {
                if c == q {
                    if chars.peek() == Some(&q) {
                        chars.next();
                        out.push_str("  ");
                        continue;
                    }
                    open = None;
                }
                out.push(' ');
            }
            None if quotes.contains(&c) => {
                open = Some(c);
                out.push(' ');
            }
            None => out.push(c),
        }
    }

    out
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(sql: &str) -> Option<Rejection> {
        classify_sql(sql).rejection()
    }

    #[test]
    fn test_simple_select_allowed() {
        assert!(classify_sql("SELECT * FROM t;").is_allowed());
        assert!(classify_sql("select id, temperature from readings").is_allowed());
        assert!(classify_sql("  \n\tSELECT 1  \n").is_allowed());
    }

    #[test]
    fn test_allowed_statement_is_trimmed() {
        let stmt = classify_sql("  SELECT 1  ").into_result().unwrap();
        assert_eq!(stmt.sql(), "SELECT 1");
    }

    #[test]
    fn test_cte_allowed() {
        let sql = "WITH recent AS (SELECT * FROM readings WHERE ts > now() - interval '1 day') \
                   SELECT device_id, avg(value) FROM recent GROUP BY device_id";
        assert!(classify_sql(sql).is_allowed());
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(rejection(""), Some(Rejection::Empty));
        assert_eq!(rejection("   \n\t "), Some(Rejection::Empty));
    }

    #[test]
    fn test_non_select_rejected() {
        assert_eq!(rejection("DELETE FROM t"), Some(Rejection::NonSelect));
        for sql in [
            "INSERT INTO t VALUES (1)",
            "UPDATE t SET a = 1",
            "DROP TABLE t",
            "ALTER TABLE t ADD COLUMN c int",
            "CREATE TABLE t (id int)",
            "TRUNCATE t",
            "GRANT ALL ON t TO bob",
            "REVOKE ALL ON t FROM bob",
            "VACUUM t",
            "EXPLAIN SELECT 1",
            "(SELECT 1)",
        ] {
            assert_eq!(rejection(sql), Some(Rejection::NonSelect), "{sql}");
        }
    }

    #[test]
    fn test_leading_keyword_must_be_whole_word() {
        assert_eq!(rejection("SELECTED FROM t"), Some(Rejection::NonSelect));
        assert_eq!(rejection("WITHDRAW 1"), Some(Rejection::NonSelect));
        assert!(classify_sql("SELECT*FROM t").is_allowed());
        assert!(classify_sql("sElEcT 1").is_allowed());
    }

    #[test]
    fn test_multiple_statements_rejected() {
        assert_eq!(
            rejection("SELECT 1; DROP TABLE t;"),
            Some(Rejection::MultipleStatements)
        );
        assert_eq!(
            rejection("SELECT 1;SELECT 2"),
            Some(Rejection::MultipleStatements)
        );
        assert_eq!(rejection("SELECT 1;;"), Some(Rejection::MultipleStatements));
    }

    #[test]
    fn test_trailing_semicolon_allowed() {
        assert!(classify_sql("SELECT 1;").is_allowed());
        assert!(classify_sql("SELECT 1;   \n").is_allowed());
    }

    #[test]
    fn test_semicolon_followed_by_comment_is_a_comment_rejection() {
        assert_eq!(rejection("SELECT 1; -- done"), Some(Rejection::Comments));
        assert_eq!(rejection("SELECT 1; /* done */"), Some(Rejection::Comments));
    }

    #[test]
    fn test_comments_rejected() {
        assert_eq!(
            rejection("SELECT * FROM t -- comment"),
            Some(Rejection::Comments)
        );
        assert_eq!(rejection("SELECT /* hi */ 1"), Some(Rejection::Comments));
        assert_eq!(rejection("SELECT 1 */"), Some(Rejection::Comments));
    }

    #[test]
    fn test_comment_markers_inside_literals_still_rejected() {
        assert_eq!(
            rejection("SELECT * FROM t WHERE note = 'a--b'"),
            Some(Rejection::Comments)
        );
    }

    #[test]
    fn test_system_object_rejected() {
        assert_eq!(
            rejection("SELECT * FROM pg_catalog.pg_tables"),
            Some(Rejection::SystemObject)
        );
        assert_eq!(rejection("SELECT PG_SLEEP(10)"), Some(Rejection::SystemObject));
        assert_eq!(
            rejection("SELECT * FROM \"pg_stats\""),
            Some(Rejection::SystemObject)
        );
    }

    #[test]
    fn test_system_prefix_inside_literal_allowed() {
        assert!(classify_sql("SELECT * FROM devices WHERE name = 'pg_sensor'").is_allowed());
        assert!(classify_sql("SELECT 'it''s pg_x' AS label").is_allowed());
    }

    #[test]
    fn test_system_prefix_requires_word_boundary() {
        assert!(classify_sql("SELECT avg_pg_level FROM tanks").is_allowed());
        assert!(classify_sql("SELECT mpg_rating FROM vehicles").is_allowed());
    }

    #[test]
    fn test_custom_reserved_prefixes() {
        let classifier = SqlClassifier::with_reserved_prefixes(["sys_", " "]);
        assert_eq!(classifier.reserved_prefixes(), &["sys_".to_string()]);
        assert_eq!(
            classifier.classify("SELECT * FROM SYS_users").rejection(),
            Some(Rejection::SystemObject)
        );
        assert!(classifier.classify("SELECT * FROM pg_tables").is_allowed());
    }

    #[test]
    fn test_data_modifying_cte_rejected() {
        assert_eq!(
            rejection("WITH d AS (DELETE FROM t RETURNING *) SELECT * FROM d"),
            Some(Rejection::ForbiddenKeyword)
        );
    }

    #[test]
    fn test_forbidden_keywords_rejected() {
        for sql in [
            "SELECT * FROM t FOR UPDATE",
            "SELECT exec('x')",
            "SELECT * INTO OUTFILE '/tmp/x' FROM t",
            "SELECT LOAD_FILE('/etc/passwd')",
            "SELECT 1 FROM t WHERE EXISTS (SELECT 1) AND call(1) = 1",
        ] {
            assert_eq!(rejection(sql), Some(Rejection::ForbiddenKeyword), "{sql}");
        }
    }

    #[test]
    fn test_dollar_quoted_text_does_not_hide_sql() {
        assert_eq!(
            rejection("SELECT $$'$$, pg_sleep(10), $$'$$"),
            Some(Rejection::SystemObject)
        );
        assert_eq!(
            rejection("SELECT $q$'$q$, pg_sleep(10), $q$'$q$"),
            Some(Rejection::SystemObject)
        );
        assert_eq!(
            rejection(
                "WITH a AS (SELECT $$'$$ AS q), d AS (DELETE FROM readings RETURNING *) \
                 SELECT $$'$$ FROM a"
            ),
            Some(Rejection::ForbiddenKeyword)
        );
    }

    #[test]
    fn test_backslash_escaped_quote_does_not_hide_sql() {
        assert_eq!(
            rejection(r"SELECT E'\'', pg_read_file('x'), '\''"),
            Some(Rejection::SystemObject)
        );
        assert_eq!(
            rejection(r"WITH a AS (SELECT E'\'' AS q), d AS (UPDATE t SET v = 1 RETURNING *) SELECT '\'' FROM d"),
            Some(Rejection::ForbiddenKeyword)
        );
    }

    #[test]
    fn test_literals_with_dollar_or_backslash_are_scanned_raw() {
        assert_eq!(
            rejection("SELECT * FROM prices WHERE label = '$ pg_fee'"),
            Some(Rejection::SystemObject)
        );
        assert!(classify_sql("SELECT '$5' AS price FROM tanks").is_allowed());
    }

    #[test]
    fn test_forbidden_keywords_in_quotes_allowed() {
        assert!(classify_sql("SELECT * FROM audit WHERE action = 'DELETE'").is_allowed());
        assert!(classify_sql("SELECT \"update\" FROM audit").is_allowed());
        assert!(classify_sql("SELECT updated_at, created_by FROM audit").is_allowed());
    }

    #[test]
    fn test_rule_order_first_match_wins() {
        // Non-SELECT beats everything after it.
        assert_eq!(rejection("DROP t; -- x"), Some(Rejection::NonSelect));
        // Multiple statements beats comments.
        assert_eq!(
            rejection("SELECT 1; SELECT 2 -- x"),
            Some(Rejection::MultipleStatements)
        );
        // Comments beat system objects.
        assert_eq!(
            rejection("SELECT * FROM pg_tables -- x"),
            Some(Rejection::Comments)
        );
    }

    #[test]
    fn test_classification_is_idempotent() {
        let classifier = SqlClassifier::new();
        for sql in [
            "SELECT * FROM t;",
            "SELECT 1; DROP TABLE t;",
            "DELETE FROM t",
            "SELECT * FROM t -- comment",
            "",
        ] {
            assert_eq!(classifier.classify(sql), classifier.classify(sql));
        }
    }

    #[test]
    fn test_mask_quoted() {
        assert_eq!(mask_quoted("a 'b' c", &['\'']), "a     c");
        assert_eq!(mask_quoted("'it''s' x", &['\'']), "        x");
        assert_eq!(mask_quoted("a \"b\" 'c'", &['\'', '"']), "a        ");
        assert_eq!(mask_quoted("a 'open", &['\'']), "a      ");
        assert_eq!(mask_quoted("$$'$$ x", &['\'']), "$$'$$ x");
        assert_eq!(mask_quoted(r"E'\'' x", &['\'']), r"E'\'' x");
    }

    #[test]
    fn test_skip_trivia() {
        assert_eq!(skip_trivia("   "), "");
        assert_eq!(skip_trivia(" -- x\n  y"), "y");
        assert_eq!(skip_trivia(" /* x */ y"), "y");
        assert_eq!(skip_trivia(" /* open"), "");
    }
}
