use crate::error::Error;
use crate::models::{BookRow, LoanRow, StudentRow};
use crate::record::{Book, Loan, LoanDetails, Reference, Student};
use sqlx::{FromRow, Row};
use sqlx::sqlite::SqliteRow;

/// Left-join Row Result
///
/// Selecting from "loans LEFT JOIN books LEFT JOIN students" yields `NULL`
/// book or student columns when the referenced record has been deleted. The
/// joined columns are aliased with a `b_`/`s_` prefix so they don't shadow the
/// loan's own `id`.
pub(crate) struct LoanDetailsRow {
    pub(crate) loan: LoanRow,
    pub(crate) book: Option<BookRow>,
    pub(crate) student: Option<StudentRow>,
}

fn partially_null(what: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: what.to_string(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "LEFT JOIN columns are partially NULL",
        )),
    }
}

impl<'r> FromRow<'r, SqliteRow> for LoanDetailsRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let loan = LoanRow::from_row(row)?;
        let id: Option<i64> = row.try_get("b_id")?;
        let isbn: Option<String> = row.try_get("b_isbn")?;
        let title: Option<String> = row.try_get("b_title")?;
        let author: Option<String> = row.try_get("b_author")?;
        let total_copies: Option<i64> = row.try_get("b_total_copies")?;
        let available_copies: Option<i64> = row.try_get("b_available_copies")?;
        let book = match (id, isbn, title, author, total_copies, available_copies) {
            (Some(id), Some(isbn), Some(title), Some(author), Some(total_copies), Some(available_copies)) => {
                Some(BookRow {
                    id: Some(id),
                    isbn,
                    title,
                    author,
                    total_copies,
                    available_copies,
                })
            },
            (None, None, None, None, None, None) => None,
            _ => return Err(partially_null("book columns")),
        };
        let id: Option<i64> = row.try_get("s_id")?;
        let registration_number: Option<String> = row.try_get("s_registration_number")?;
        let name: Option<String> = row.try_get("s_name")?;
        let class_name: Option<String> = row.try_get("s_class_name")?;
        let student = match (id, registration_number, name, class_name) {
            (Some(id), Some(registration_number), Some(name), Some(class_name)) => Some(StudentRow {
                id: Some(id),
                registration_number,
                name,
                class_name,
            }),
            (None, None, None, None) => None,
            _ => return Err(partially_null("student columns")),
        };
        Ok(LoanDetailsRow { loan, book, student })
    }
}
impl TryFrom<LoanDetailsRow> for LoanDetails {
    type Error = Error;
    fn try_from(join: LoanDetailsRow) -> Result<Self, Self::Error> {
        let loan = Loan::try_from(join.loan)?;
        let book = match join.book {
            Some(row) => Reference::Present(Book::try_from(row)?),
            None => Reference::Deleted(loan.book_id),
        };
        let student = match join.student {
            Some(row) => Reference::Present(Student::try_from(row)?),
            None => Reference::Deleted(loan.student_id),
        };
        Ok(LoanDetails { loan, book, student })
    }
}
