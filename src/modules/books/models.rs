use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// A stored book record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Book {
    /// Identifier assigned on creation, never reused
    pub id: i64,
    /// Title of the book
    pub title: Option<String>,
    /// Author of the book
    pub author: Option<String>,
    /// Short description of the book
    pub description: Option<String>,
}

impl Book {
    /// Column list matching [`Book::from_row`].
    pub const COLUMNS: &'static str = "id, title, author, description";

    /// Decode a row selected with [`Book::COLUMNS`].
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            description: row.get(3)?,
        })
    }
}

/// Request model for creating a new book. All three keys are required.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
    pub description: String,
}

/// Partial update. An absent key keeps the stored value; `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, ToSchema)]
pub struct UpdateBook {
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub author: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

impl UpdateBook {
    /// Overwrite the fields present in this update.
    pub fn apply(self, book: &mut Book) {
        if let Some(title) = self.title {
            book.title = title;
        }
        if let Some(author) = self.author {
            book.author = author;
        }
        if let Some(description) = self.description {
            book.description = description;
        }
    }
}

// Only runs when the key is present, so `null` becomes `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
