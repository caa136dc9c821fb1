//! Domain records handed to (and accepted from) callers.

use crate::error::{Error, ErrorKind, Result};
use crate::models::{BookRow, LoanRow, StudentRow};
use serde::{Deserialize, Serialize};
use sqlx::Sqlite;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use time::{Date, Duration};

time::serde::format_description!(calendar_date, Date, "[year]-[month]-[day]");

pub(crate) type SqliteQuery = Query<'static, Sqlite, SqliteArguments<'static>>;

/// One of the three named record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Books,
    Students,
    Loans,
}
impl Collection {
    pub const ALL: [Collection; 3] = [Self::Books, Self::Students, Self::Loans];

    /// Name used in backups and in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Books => "books",
            Self::Students => "students",
            Self::Loans => "loans",
        }
    }

    pub(crate) fn select_all_sql(&self) -> &'static str {
        match self {
            Self::Books => include_str!("../queries/list_books.sql"),
            Self::Students => include_str!("../queries/list_students.sql"),
            Self::Loans => include_str!("../queries/list_loans.sql"),
        }
    }

    pub(crate) fn select_by_id_sql(&self) -> &'static str {
        match self {
            Self::Books => include_str!("../queries/get_book.sql"),
            Self::Students => include_str!("../queries/get_student.sql"),
            Self::Loans => include_str!("../queries/get_loan.sql"),
        }
    }

    pub(crate) fn delete_by_id_sql(&self) -> &'static str {
        match self {
            Self::Books => "DELETE FROM books WHERE id = ?",
            Self::Students => "DELETE FROM students WHERE id = ?",
            Self::Loans => "DELETE FROM loans WHERE id = ?",
        }
    }

    pub(crate) fn clear_sql(&self) -> &'static str {
        match self {
            Self::Books => "DELETE FROM books",
            Self::Students => "DELETE FROM students",
            Self::Loans => "DELETE FROM loans",
        }
    }
}
impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Book {}
    impl Sealed for super::Student {}
    impl Sealed for super::Loan {}
}

/// A record kind stored in one of the [`Collection`]s.
///
/// Sealed: implemented for [`Book`], [`Student`] and [`Loan`] only.
pub trait Record: private::Sealed + Sized + Send + Unpin + 'static {
    const COLLECTION: Collection;
    #[doc(hidden)]
    type Row: for<'r> sqlx::FromRow<'r, SqliteRow> + Send + Unpin;

    /// Store-assigned identifier, if the record has been saved.
    fn id(&self) -> Option<u64>;

    #[doc(hidden)]
    fn from_row(row: Self::Row) -> Result<Self>;

    /// Write statement keeping the record's identifier, if it has one.
    #[doc(hidden)]
    fn write_query(&self) -> Result<SqliteQuery>;

    /// Like [`write_query`](Self::write_query), but never overwrites: a
    /// second record with the same identifier is a constraint violation.
    #[doc(hidden)]
    fn insert_query(&self) -> Result<SqliteQuery>;
}

/// A record that callers may write directly with
/// [`Repository::save`](crate::Repository::save).
///
/// Loans are excluded: they only come into existence through
/// [`Repository::checkout`](crate::Repository::checkout).
pub trait Saveable: Record {
    /// The field guarded by the collection's unique index.
    const UNIQUE_FIELD: &'static str;

    /// Reject records the schema would refuse, with a precise reason.
    fn validate(&self) -> Result<()>;
}

/// A catalogued title and its stock of physical copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: Option<u64>,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub total_copies: u32,
    pub available_copies: u32,
}
impl Book {
    /// A new, unsaved book with every copy on the shelf.
    pub fn new(isbn: impl Into<String>, title: impl Into<String>, author: impl Into<String>, copies: u32) -> Self {
        Self {
            id: None,
            isbn: isbn.into(),
            title: title.into(),
            author: author.into(),
            total_copies: copies,
            available_copies: copies,
        }
    }

    /// Number of copies currently out on loan.
    pub fn copies_on_loan(&self) -> u32 {
        self.total_copies.saturating_sub(self.available_copies)
    }

    /// Apply an edit, carrying the change in total copies over to the
    /// available copies.
    ///
    /// Returns `None` if the edit would leave fewer copies than are currently
    /// on loan (a negative number available).
    pub fn apply(&self, edit: &BookEdit) -> Option<Book> {
        let available = i64::from(self.available_copies) + i64::from(edit.total_copies)
            - i64::from(self.total_copies);
        let available = u32::try_from(available).ok()?;
        Some(Book {
            id: self.id,
            isbn: edit.isbn.clone(),
            title: edit.title.clone(),
            author: edit.author.clone(),
            total_copies: edit.total_copies,
            available_copies: available,
        })
    }
}

/// Editable fields of a [`Book`]. The available copies are always derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookEdit {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub total_copies: u32,
}
impl From<&Book> for BookEdit {
    fn from(book: &Book) -> Self {
        Self {
            isbn: book.isbn.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            total_copies: book.total_copies,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Option<u64>,
    pub name: String,
    pub registration_number: String,
    pub class_name: String,
}
impl Student {
    pub fn new(
        registration_number: impl Into<String>,
        name: impl Into<String>,
        class_name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            registration_number: registration_number.into(),
            class_name: class_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Returned,
}
impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Returned => "returned",
        }
    }
}
impl Display for LoanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
impl FromStr for LoanStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "returned" => Ok(Self::Returned),
            _ => exn::bail!(ErrorKind::InvalidData("loan status")),
        }
    }
}

/// A book lent to a student.
///
/// `status` is [`LoanStatus::Returned`] exactly when `return_date` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: u64,
    pub book_id: u64,
    pub student_id: u64,
    #[serde(with = "calendar_date")]
    pub loan_date: Date,
    #[serde(with = "calendar_date")]
    pub due_date: Date,
    #[serde(default, with = "calendar_date::option")]
    pub return_date: Option<Date>,
    pub status: LoanStatus,
}
impl Loan {
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    /// `true` when the status agrees with the return date: returned loans
    /// have one, active loans don't.
    pub fn status_matches_return_date(&self) -> bool {
        (self.status == LoanStatus::Returned) == self.return_date.is_some()
    }

    /// Active and past its due date.
    pub fn is_overdue(&self, today: Date) -> bool {
        self.is_active() && self.due_date < today
    }
}

/// A loan about to be checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub book_id: u64,
    pub student_id: u64,
    pub loan_date: Date,
    pub due_date: Date,
}
impl NewLoan {
    /// Loan starting on `loan_date`, due back `days` later.
    pub fn for_days(book_id: u64, student_id: u64, loan_date: Date, days: u16) -> Self {
        Self {
            book_id,
            student_id,
            loan_date,
            due_date: loan_date.saturating_add(Duration::days(i64::from(days))),
        }
    }
}

/// A reference from a loan to a record that may since have been deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<T> {
    Present(T),
    /// The referenced record no longer exists; only its identifier remains.
    Deleted(u64),
}
impl<T> Reference<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            Self::Present(record) => Some(record),
            Self::Deleted(_) => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }
}

/// A loan joined with the book and student it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanDetails {
    pub loan: Loan,
    pub book: Reference<Book>,
    pub student: Reference<Student>,
}

/// Point-in-time copy of every collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub books: Vec<Book>,
    pub students: Vec<Student>,
    pub loans: Vec<Loan>,
}
impl Snapshot {
    /// Total number of records across all three collections.
    pub fn record_count(&self) -> usize {
        self.books.len() + self.students.len() + self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub books: u64,
    pub total_copies: u64,
    pub available_copies: u64,
    pub students: u64,
    pub active_loans: u64,
    pub overdue_loans: u64,
}

impl Record for Book {
    const COLLECTION: Collection = Collection::Books;
    type Row = BookRow;

    fn id(&self) -> Option<u64> {
        self.id
    }

    fn from_row(row: BookRow) -> Result<Self> {
        Book::try_from(row)
    }

    fn write_query(&self) -> Result<SqliteQuery> {
        BookRow::try_from(self).map(BookRow::upsert)
    }

    fn insert_query(&self) -> Result<SqliteQuery> {
        BookRow::try_from(self).map(BookRow::insert)
    }
}
impl Saveable for Book {
    const UNIQUE_FIELD: &'static str = "isbn";

    fn validate(&self) -> Result<()> {
        if self.isbn.trim().is_empty() {
            exn::bail!(ErrorKind::InvalidRecord("isbn must not be empty"));
        }
        if self.available_copies > self.total_copies {
            exn::bail!(ErrorKind::InvalidRecord("available copies exceed total copies"));
        }
        Ok(())
    }
}

impl Record for Student {
    const COLLECTION: Collection = Collection::Students;
    type Row = StudentRow;

    fn id(&self) -> Option<u64> {
        self.id
    }

    fn from_row(row: StudentRow) -> Result<Self> {
        Student::try_from(row)
    }

    fn write_query(&self) -> Result<SqliteQuery> {
        StudentRow::try_from(self).map(StudentRow::upsert)
    }

    fn insert_query(&self) -> Result<SqliteQuery> {
        StudentRow::try_from(self).map(StudentRow::insert)
    }
}
impl Saveable for Student {
    const UNIQUE_FIELD: &'static str = "registrationNumber";

    fn validate(&self) -> Result<()> {
        if self.registration_number.trim().is_empty() {
            exn::bail!(ErrorKind::InvalidRecord("registration number must not be empty"));
        }
        Ok(())
    }
}

impl Record for Loan {
    const COLLECTION: Collection = Collection::Loans;
    type Row = LoanRow;

    fn id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn from_row(row: LoanRow) -> Result<Self> {
        Loan::try_from(row)
    }

    fn write_query(&self) -> Result<SqliteQuery> {
        LoanRow::try_from(self).map(LoanRow::insert)
    }

    fn insert_query(&self) -> Result<SqliteQuery> {
        self.write_query()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::date;

    fn book(total: u32, available: u32) -> Book {
        Book {
            id: Some(1),
            isbn: "9780441013593".to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            total_copies: total,
            available_copies: available,
        }
    }

    #[rstest]
    #[case(5, 3, 7, Some(5))]
    #[case(5, 3, 5, Some(3))]
    #[case(5, 3, 3, Some(1))]
    #[case(5, 3, 2, Some(0))]
    #[case(5, 3, 1, None)]
    #[case(2, 0, 0, None)]
    #[case(0, 0, 4, Some(4))]
    fn test_apply_edit_recomputes_available(
        #[case] total: u32,
        #[case] available: u32,
        #[case] new_total: u32,
        #[case] expected: Option<u32>,
    ) {
        let original = book(total, available);
        let mut edit = BookEdit::from(&original);
        edit.total_copies = new_total;
        let edited = original.apply(&edit);
        assert_eq!(edited.as_ref().map(|b| b.available_copies), expected);
        if let Some(edited) = edited {
            assert!(edited.available_copies <= edited.total_copies);
            assert_eq!(edited.copies_on_loan(), original.copies_on_loan());
        }
    }

    #[rstest]
    #[case("active", LoanStatus::Active)]
    #[case("returned", LoanStatus::Returned)]
    fn test_loan_status_round_trip(#[case] s: &str, #[case] status: LoanStatus) {
        assert_eq!(s.parse::<LoanStatus>().unwrap(), status);
        assert_eq!(status.to_string(), s);
    }

    #[test]
    fn test_loan_status_rejects_unknown() {
        assert!("overdue".parse::<LoanStatus>().is_err());
    }

    #[test]
    fn test_new_loan_due_date() {
        let loan = NewLoan::for_days(1, 2, date!(2024 - 02 - 20), 14);
        assert_eq!(loan.due_date, date!(2024 - 03 - 05));
    }

    #[test]
    fn test_loan_wire_format() {
        let loan = Loan {
            id: 4,
            book_id: 1,
            student_id: 2,
            loan_date: date!(2024 - 01 - 10),
            due_date: date!(2024 - 01 - 24),
            return_date: None,
            status: LoanStatus::Active,
        };
        let json = serde_json::to_value(&loan).unwrap();
        assert_eq!(json["loanDate"], "2024-01-10");
        assert_eq!(json["returnDate"], serde_json::Value::Null);
        assert_eq!(json["status"], "active");
        let parsed: Loan = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, loan);
    }

    #[test]
    fn test_loan_without_return_date_field() {
        let json = r#"{"id":1,"bookId":1,"studentId":1,"loanDate":"2024-01-10","dueDate":"2024-01-24","status":"active"}"#;
        let loan: Loan = serde_json::from_str(json).unwrap();
        assert_eq!(loan.return_date, None);
    }

    #[test]
    fn test_overdue() {
        let mut loan = Loan {
            id: 1,
            book_id: 1,
            student_id: 1,
            loan_date: date!(2024 - 01 - 10),
            due_date: date!(2024 - 01 - 24),
            return_date: None,
            status: LoanStatus::Active,
        };
        assert!(!loan.is_overdue(date!(2024 - 01 - 24)));
        assert!(loan.is_overdue(date!(2024 - 01 - 25)));
        loan.status = LoanStatus::Returned;
        loan.return_date = Some(date!(2024 - 01 - 30));
        assert!(!loan.is_overdue(date!(2024 - 02 - 01)));
    }
}
