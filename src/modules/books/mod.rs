pub mod models;
pub mod repository;
pub mod routes;

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    routing::{get, put},
    Router,
};
use bookshelf_db::Database;
use bookshelf_http::error::MessageBody;
use bookshelf_kernel::{InitCtx, Migration, Module};
use utoipa::OpenApi;

use models::{Book, CreateBook, UpdateBook};
use repository::BookRepository;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::list_books,
        routes::create_book,
        routes::update_book,
        routes::delete_book
    ),
    components(schemas(Book, CreateBook, UpdateBook, MessageBody)),
    tags((name = "Books", description = "Book catalog CRUD"))
)]
struct BooksApi;

/// Book catalog: list, create, update and delete book records
pub struct BooksModule {
    repository: BookRepository,
}

impl BooksModule {
    pub fn new(db: Database) -> Self {
        Self {
            repository: BookRepository::new(db),
        }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        // Fails fast when the schema was never migrated.
        let count = self
            .repository
            .count()
            .await
            .context("book table unavailable; run `bookshelf-cli migrate` first")?;

        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            books = count,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(routes::list_books).post(routes::create_book))
            .route("/{id}", put(routes::update_book).delete(routes::delete_book))
            .with_state(self.repository.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        match serde_json::to_value(BooksApi::openapi()) {
            Ok(spec) => Some(spec),
            Err(err) => {
                tracing::warn!(module = self.name(), error = %err, "failed to render OpenAPI fragment");
                None
            }
        }
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_init",
            up: r#"
                CREATE TABLE IF NOT EXISTS book (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    title       VARCHAR(255),
                    author      VARCHAR(255),
                    description VARCHAR(255)
                );
                "#,
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create a new instance of the books module
pub fn create_module(db: Database) -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(BooksModule::new(db))
}
