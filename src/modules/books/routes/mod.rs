//! HTTP handlers for the books module.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Json,
};
use bookshelf_http::error::{AppError, MessageBody};

use super::models::{Book, CreateBook, UpdateBook};
use super::repository::BookRepository;

const BOOK_NOT_FOUND: &str = "Book not found";

/// A path id that is not an integer cannot name a book.
fn book_id(id: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    id.map(|Path(id)| id)
        .map_err(|_| AppError::not_found(BOOK_NOT_FOUND))
}

/// List every book
#[utoipa::path(
    get,
    path = "/",
    tag = "Books",
    responses(
        (status = 200, description = "All books in insertion order", body = [Book]),
        (status = 500, description = "Internal server error", body = MessageBody)
    )
)]
pub async fn list_books(State(repo): State<BookRepository>) -> Result<Json<Vec<Book>>, AppError> {
    Ok(Json(repo.list().await?))
}

/// Create a book
#[utoipa::path(
    post,
    path = "/",
    tag = "Books",
    request_body = CreateBook,
    responses(
        (status = 200, description = "The created book", body = Book),
        (status = 400, description = "Missing or malformed field", body = MessageBody),
        (status = 500, description = "Internal server error", body = MessageBody)
    )
)]
pub async fn create_book(
    State(repo): State<BookRepository>,
    payload: Result<Json<CreateBook>, JsonRejection>,
) -> Result<Json<Book>, AppError> {
    let Json(new_book) = payload?;
    let book = repo.create(new_book).await?;

    tracing::info!(book_id = book.id, "book created");
    Ok(Json(book))
}

/// Update the fields present in the body
#[utoipa::path(
    put,
    path = "/{id}",
    tag = "Books",
    params(("id" = i64, Path, description = "Book identifier")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "The updated book", body = Book),
        (status = 400, description = "Malformed body", body = MessageBody),
        (status = 404, description = "Book not found", body = MessageBody)
    )
)]
pub async fn update_book(
    State(repo): State<BookRepository>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateBook>, JsonRejection>,
) -> Result<Json<Book>, AppError> {
    let id = book_id(id)?;
    let Json(update) = payload?;

    match repo.update(id, update).await? {
        Some(book) => {
            tracing::info!(book_id = id, "book updated");
            Ok(Json(book))
        }
        None => Err(AppError::not_found(BOOK_NOT_FOUND)),
    }
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Books",
    params(("id" = i64, Path, description = "Book identifier")),
    responses(
        (status = 200, description = "Book deleted", body = MessageBody),
        (status = 404, description = "Book not found", body = MessageBody)
    )
)]
pub async fn delete_book(
    State(repo): State<BookRepository>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageBody>, AppError> {
    let id = book_id(id)?;

    if repo.delete(id).await? {
        tracing::info!(book_id = id, "book deleted");
        Ok(Json(MessageBody::new("Book deleted")))
    } else {
        Err(AppError::not_found(BOOK_NOT_FOUND))
    }
}
