//! Idempotent loader for the source-table DDL in `sql/`

use rusqlite::Connection;
use std::fs;
use std::path::Path;

/// Run every `.sql` file in `schema_dir` in file-name order
///
/// All files must use `IF NOT EXISTS` clauses so repeated runs are safe.
/// Returns the number of files executed.
pub fn run_schema_migrations(
    conn: &mut Connection,
    schema_dir: &str,
) -> Result<usize, Box<dyn std::error::Error>> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(format!("Schema directory not found: {}", schema_dir).into());
    }

    // Sorted so 01_, 02_, ... run in order
    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort();

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for path in &sql_files {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        log::info!("   ├─ Executing: {}", filename);

        let sql_content = fs::read_to_string(path)?;
        conn.execute_batch(&sql_content)?;
    }

    log::info!("   └─ ✅ {} migrations applied", sql_files.len());

    Ok(sql_files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("02_second.sql"),
            "CREATE INDEX IF NOT EXISTS idx_probe ON probe(value);",
        )
        .unwrap();
        fs::write(
            dir.path().join("01_first.sql"),
            "CREATE TABLE IF NOT EXISTS probe (value INTEGER);",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not sql").unwrap();

        let mut conn = Connection::open_in_memory().unwrap();
        let schema_dir = dir.path().to_str().unwrap();

        assert_eq!(run_schema_migrations(&mut conn, schema_dir).unwrap(), 2);
        assert_eq!(run_schema_migrations(&mut conn, schema_dir).unwrap(), 2);
    }

    #[test]
    fn test_shipped_schema_applies() {
        let mut conn = Connection::open_in_memory().unwrap();
        let schema_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/sql");
        run_schema_migrations(&mut conn, schema_dir).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_missing_directory() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert!(run_schema_migrations(&mut conn, "/nonexistent/schema/dir").is_err());
    }
}
