//! Splitting of migration scripts into individually executable statements.

/// Substrings of database errors that mean a statement was already applied.
const TOLERATED_ERRORS: &[&str] = &[
    "already exists",
    "duplicate column name",
    "UNIQUE constraint failed",
];

/// Split a migration script into statements.
///
/// Blank lines and `--` comment lines are dropped. A statement ends at a line
/// ending in `;`, except inside a `CREATE TRIGGER` body, which ends only at a
/// line that is exactly `END;`. Anything left after the last terminator is
/// kept as a final statement.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_trigger = false;

    for line in sql.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        if trimmed.to_uppercase().contains("CREATE TRIGGER") {
            in_trigger = true;
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(trimmed);

        let ends_statement = if in_trigger {
            trimmed.eq_ignore_ascii_case("END;")
        } else {
            trimmed.ends_with(';')
        };

        if ends_statement {
            statements.push(std::mem::take(&mut current));
            in_trigger = false;
        }
    }

    if !current.trim().is_empty() {
        statements.push(current);
    }

    statements
}

/// Whether a statement error indicates the change is already in place.
pub fn is_tolerated_error(message: &str) -> bool {
    TOLERATED_ERRORS.iter().any(|t| message.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_trailing_semicolons() {
        let sql = "CREATE TABLE a (id TEXT);\nCREATE TABLE b (\n  id TEXT\n);\n";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "CREATE TABLE a (id TEXT);");
        assert_eq!(statements[1], "CREATE TABLE b (\nid TEXT\n);");
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let sql = "-- header\n\n  -- indented comment\nSELECT 1;\n\n-- trailing\n";
        assert_eq!(split_sql_statements(sql), vec!["SELECT 1;".to_string()]);
    }

    #[test]
    fn keeps_trigger_body_together() {
        let sql = "CREATE TRIGGER t AFTER INSERT ON a\nBEGIN\n  UPDATE b SET n = n + 1;\n  UPDATE c SET n = n + 1;\nEND;\nSELECT 1;";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TRIGGER"));
        assert!(statements[0].ends_with("END;"));
        assert!(statements[0].contains("UPDATE c"));
        assert_eq!(statements[1], "SELECT 1;");
    }

    #[test]
    fn case_expression_does_not_end_trigger() {
        let sql = "CREATE TRIGGER IF NOT EXISTS t AFTER UPDATE ON x\nBEGIN\n  UPDATE x SET f = CASE WHEN NEW.a THEN 1 ELSE 0 END;\n  UPDATE x SET g = 1;\nend;\nSELECT 1;";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("ELSE 0 END;\nUPDATE x SET g = 1;"));
        assert!(statements[0].ends_with("end;"));
        assert_eq!(statements[1], "SELECT 1;");
    }

    #[test]
    fn keeps_unterminated_remainder() {
        let sql = "SELECT 1;\nSELECT 2";
        assert_eq!(
            split_sql_statements(sql),
            vec!["SELECT 1;".to_string(), "SELECT 2".to_string()]
        );
    }

    #[test]
    fn empty_script_yields_nothing() {
        assert!(split_sql_statements("").is_empty());
        assert!(split_sql_statements("-- only a comment\n\n").is_empty());
    }

    #[test]
    fn tolerated_errors() {
        assert!(is_tolerated_error("table users already exists"));
        assert!(is_tolerated_error("duplicate column name: managed"));
        assert!(is_tolerated_error("UNIQUE constraint failed: plugins.name"));
        assert!(!is_tolerated_error("no such table: users"));
    }
}
