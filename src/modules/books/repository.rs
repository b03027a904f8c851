use bookshelf_db::{Database, DbError};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::models::{Book, CreateBook, UpdateBook};

/// Persistence for the `book` table.
#[derive(Debug, Clone)]
pub struct BookRepository {
    db: Database,
}

impl BookRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// All books in insertion order.
    pub async fn list(&self) -> Result<Vec<Book>, DbError> {
        self.db
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM book ORDER BY id", Book::COLUMNS))?;
                let books = stmt
                    .query_map([], Book::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(books)
            })
            .await
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        self.db
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM book", [], |row| row.get(0)))
            .await
    }

    pub async fn create(&self, new_book: CreateBook) -> Result<Book, DbError> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO book (title, author, description) VALUES (?1, ?2, ?3)",
                    params![new_book.title, new_book.author, new_book.description],
                )?;
                Ok(Book {
                    id: conn.last_insert_rowid(),
                    title: Some(new_book.title),
                    author: Some(new_book.author),
                    description: Some(new_book.description),
                })
            })
            .await
    }

    /// Apply `update` to the book with `id`; `None` when no such book exists.
    ///
    /// The read and the write share one transaction. It takes the write lock
    /// up front, so another process holding the file waits out the busy
    /// timeout instead of failing the lock upgrade.
    pub async fn update(&self, id: i64, update: UpdateBook) -> Result<Option<Book>, DbError> {
        self.db
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let Some(mut book) = find(&tx, id)? else {
                    return Ok(None);
                };

                update.apply(&mut book);
                tx.execute(
                    "UPDATE book SET title = ?1, author = ?2, description = ?3 WHERE id = ?4",
                    params![book.title, book.author, book.description, book.id],
                )?;
                tx.commit()?;
                Ok(Some(book))
            })
            .await
    }

    /// Remove the book with `id`; `false` when no such book exists.
    pub async fn delete(&self, id: i64) -> Result<bool, DbError> {
        self.db
            .call(move |conn| {
                let removed = conn.execute("DELETE FROM book WHERE id = ?1", params![id])?;
                Ok(removed > 0)
            })
            .await
    }
}

fn find(conn: &Connection, id: i64) -> rusqlite::Result<Option<Book>> {
    conn.query_row(
        &format!("SELECT {} FROM book WHERE id = ?1", Book::COLUMNS),
        params![id],
        Book::from_row,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::BooksModule;
    use bookshelf_kernel::Module;

    async fn repository() -> BookRepository {
        let db = Database::open_in_memory().unwrap();
        let migrations = BooksModule::new(db.clone())
            .migrations()
            .into_iter()
            .map(|m| ("books".to_string(), m))
            .collect();
        db.apply_migrations(migrations).await.unwrap();
        BookRepository::new(db)
    }

    fn new_book(title: &str) -> CreateBook {
        CreateBook {
            title: title.to_string(),
            author: "Author".to_string(),
            description: "Description".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let repo = repository().await;
        assert!(repo.list().await.unwrap().is_empty());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn created_books_are_listed_in_insertion_order() {
        let repo = repository().await;
        let first = repo.create(new_book("First")).await.unwrap();
        let second = repo.create(new_book("Second")).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(repo.list().await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn update_missing_book_returns_none() {
        let repo = repository().await;
        let update = UpdateBook {
            title: Some(Some("X".to_string())),
            ..UpdateBook::default()
        };
        assert_eq!(repo.update(42, update).await.unwrap(), None);
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_can_clear_a_field() {
        let repo = repository().await;
        let book = repo.create(new_book("Dune")).await.unwrap();

        let update = UpdateBook {
            description: Some(None),
            ..UpdateBook::default()
        };
        let updated = repo.update(book.id, update).await.unwrap().unwrap();
        assert_eq!(updated.description, None);
        assert_eq!(updated.title.as_deref(), Some("Dune"));
        assert_eq!(repo.list().await.unwrap(), vec![updated]);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let repo = repository().await;
        let first = repo.create(new_book("A")).await.unwrap();
        let second = repo.create(new_book("B")).await.unwrap();

        assert!(repo.delete(second.id).await.unwrap());
        assert!(!repo.delete(second.id).await.unwrap());

        let third = repo.create(new_book("C")).await.unwrap();
        assert!(third.id > second.id);
        assert_eq!(repo.list().await.unwrap(), vec![first, third]);
    }

    #[tokio::test]
    async fn concurrent_updates_through_separate_connections_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("books.db").to_str().unwrap().to_string();
        let timeout = std::time::Duration::from_secs(5);

        let first = Database::open(&url, timeout).unwrap();
        let migrations = BooksModule::new(first.clone())
            .migrations()
            .into_iter()
            .map(|m| ("books".to_string(), m))
            .collect();
        first.apply_migrations(migrations).await.unwrap();
        let first = BookRepository::new(first);
        let second = BookRepository::new(Database::open(&url, timeout).unwrap());

        let id = first.create(new_book("Dune")).await.unwrap().id;

        let mut tasks = Vec::new();
        for n in 0..20 {
            let repo = if n % 2 == 0 { first.clone() } else { second.clone() };
            tasks.push(tokio::spawn(async move {
                let update = UpdateBook {
                    author: Some(Some(format!("Author {n}"))),
                    ..UpdateBook::default()
                };
                repo.update(id, update).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_some());
        }

        let books = second.list().await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title.as_deref(), Some("Dune"));
        assert!(books[0].author.as_deref().unwrap().starts_with("Author "));
    }

    #[tokio::test]
    async fn missing_table_surfaces_as_error() {
        let repo = BookRepository::new(Database::open_in_memory().unwrap());
        assert!(matches!(repo.list().await, Err(DbError::Sqlite(_))));
    }
}
