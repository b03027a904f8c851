use rusqlite::params;

use crate::{Database, DbError};

const LEDGER: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    module     TEXT NOT NULL,
    id         TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (module, id)
);";

/// Migration contributed by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub id: &'static str,
    pub up: &'static str,
}

impl Database {
    /// Apply every migration not yet recorded in `schema_migrations`.
    ///
    /// Each migration runs in its own transaction together with its ledger
    /// row. Returns how many were applied.
    pub async fn apply_migrations(
        &self,
        migrations: Vec<(String, Migration)>,
    ) -> Result<usize, DbError> {
        self.call(move |conn| {
            conn.execute_batch(LEDGER)?;

            let mut applied = 0;
            for (module, migration) in &migrations {
                let done: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE module = ?1 AND id = ?2)",
                    params![module, migration.id],
                    |row| row.get(0),
                )?;
                if done {
                    tracing::debug!(target: "bookshelf-db", module = %module, id = migration.id, "migration already applied");
                    continue;
                }

                let tx = conn.transaction()?;
                tx.execute_batch(migration.up)?;
                tx.execute(
                    "INSERT INTO schema_migrations (module, id) VALUES (?1, ?2)",
                    params![module, migration.id],
                )?;
                tx.commit()?;

                tracing::info!(target: "bookshelf-db", module = %module, id = migration.id, "migration applied");
                applied += 1;
            }
            Ok(applied)
        })
        .await
    }

    /// `(module, id)` pairs in the order they were applied.
    pub async fn applied_migrations(&self) -> Result<Vec<(String, String)>, DbError> {
        self.call(|conn| {
            conn.execute_batch(LEDGER)?;
            let mut stmt =
                conn.prepare("SELECT module, id FROM schema_migrations ORDER BY rowid")?;
            let applied = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(applied)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widgets() -> Vec<(String, Migration)> {
        vec![
            (
                "widgets".to_string(),
                Migration {
                    id: "001_init",
                    up: "CREATE TABLE widget (id INTEGER PRIMARY KEY, name TEXT);",
                },
            ),
            (
                "widgets".to_string(),
                Migration {
                    id: "002_color",
                    up: "ALTER TABLE widget ADD COLUMN color TEXT;",
                },
            ),
        ]
    }

    #[tokio::test]
    async fn migrations_apply_once() {
        let db = Database::open_in_memory().unwrap();

        assert_eq!(db.apply_migrations(widgets()).await.unwrap(), 2);
        assert_eq!(db.apply_migrations(widgets()).await.unwrap(), 0);

        let applied = db.applied_migrations().await.unwrap();
        assert_eq!(
            applied,
            vec![
                ("widgets".to_string(), "001_init".to_string()),
                ("widgets".to_string(), "002_color".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn failed_migration_is_not_recorded() {
        let db = Database::open_in_memory().unwrap();
        let broken = vec![(
            "widgets".to_string(),
            Migration {
                id: "001_broken",
                up: "CREATE TABLE widget (; nonsense",
            },
        )];

        assert!(db.apply_migrations(broken).await.is_err());
        assert!(db.applied_migrations().await.unwrap().is_empty());
    }
}
