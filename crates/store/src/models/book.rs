use crate::error::{Error, ErrorKind};
use crate::models::{id_from_row, id_to_row};
use crate::record::{Book, SqliteQuery};
use exn::ResultExt;

#[derive(sqlx::FromRow)]
pub struct BookRow {
    pub(crate) id: Option<i64>,
    pub(crate) isbn: String,
    pub(crate) title: String,
    pub(crate) author: String,
    pub(crate) total_copies: i64,
    pub(crate) available_copies: i64,
}
impl BookRow {
    /// Insert, or overwrite the row with the same identifier.
    ///
    /// A `NULL` identifier lets SQLite assign the next one.
    pub(crate) fn upsert(self) -> SqliteQuery {
        sqlx::query(include_str!("../../queries/upsert_book.sql"))
            .bind(self.id)
            .bind(self.isbn)
            .bind(self.title)
            .bind(self.author)
            .bind(self.total_copies)
            .bind(self.available_copies)
    }

    /// Plain insert; an identifier that is already taken fails.
    pub(crate) fn insert(self) -> SqliteQuery {
        sqlx::query(include_str!("../../queries/insert_book.sql"))
            .bind(self.id)
            .bind(self.isbn)
            .bind(self.title)
            .bind(self.author)
            .bind(self.total_copies)
            .bind(self.available_copies)
    }
}
impl TryFrom<&Book> for BookRow {
    type Error = Error;
    fn try_from(book: &Book) -> Result<Self, Self::Error> {
        Ok(Self {
            id: book.id.map(|id| id_to_row(id, "book id")).transpose()?,
            isbn: book.isbn.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            total_copies: i64::from(book.total_copies),
            available_copies: i64::from(book.available_copies),
        })
    }
}
impl TryFrom<BookRow> for Book {
    type Error = Error;
    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Some(id_from_row(row.id, "book id")?),
            isbn: row.isbn,
            title: row.title,
            author: row.author,
            total_copies: u32::try_from(row.total_copies).or_raise(|| ErrorKind::InvalidData("total copies"))?,
            available_copies: u32::try_from(row.available_copies)
                .or_raise(|| ErrorKind::InvalidData("available copies"))?,
        })
    }
}
