//! Record-level access to the three collections.
//!
//! Single-record operations run directly against the pool (SQLite makes each
//! statement atomic on its own). Operations that touch several records run in
//! a transaction, see [`Repository::checkout`] and [`Repository::replace_all`].

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{BookRow, LoanDetailsRow, LoanRow, StudentRow, date_to_row, id_to_row};
use crate::record::{Book, Loan, LoanDetails, LoanStatus, Record, Saveable, Statistics, Student};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::Date;
use tracing::{debug, instrument};

/// Repository for books, students and loans.
///
/// Cheap to clone: it only holds a handle to the connection pool.
///
/// # Relationships
///
/// - A loan references one book and one student by identifier
/// - Deleting a book or student never touches its loans (no cascade)
/// - Loans are created by [`checkout`](Self::checkout) and changed by
///   [`return_loan`](Self::return_loan), never written directly
#[derive(Debug, Clone)]
pub struct Repository {
    pub(crate) pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Save / Delete
    // =========================================================================

    /// Insert or update a book or student.
    ///
    /// A record without an identifier is inserted and receives one; a record
    /// with an identifier overwrites the stored record with that identifier
    /// (or is inserted under it). Returns the assigned/confirmed identifier.
    ///
    /// Returns [`ErrorKind::ConstraintViolation`] if the record's ISBN or
    /// registration number already belongs to a different record.
    #[instrument(skip_all, fields(collection = %R::COLLECTION, id = ?record.id()))]
    pub async fn save<R: Saveable>(&self, record: &R) -> Result<u64> {
        record.validate()?;
        let result = record
            .write_query()?
            .execute(&self.pool)
            .await
            .map_err(|e| ErrorKind::write(e, R::UNIQUE_FIELD, R::COLLECTION.as_str()))?;
        let id = match record.id() {
            Some(id) => id,
            None => u64::try_from(result.last_insert_rowid()).or_raise(|| ErrorKind::InvalidData("row id"))?,
        };
        debug!(id, "saved record");
        Ok(id)
    }

    /// Remove a record. Deleting an identifier that doesn't exist is not an
    /// error.
    ///
    /// Loans referencing a deleted book or student are left untouched.
    #[instrument(skip(self), fields(collection = %R::COLLECTION))]
    pub async fn delete<R: Record>(&self, id: u64) -> Result<()> {
        let result = sqlx::query(R::COLLECTION.delete_by_id_sql())
            .bind(id_to_row(id, "id")?)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        debug!(deleted = result.rows_affected(), "deleted record");
        Ok(())
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// All records of a collection, ordered by identifier.
    pub async fn get_all<R: Record>(&self) -> Result<Vec<R>> {
        let rows: Vec<R::Row> = sqlx::query_as(R::COLLECTION.select_all_sql())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(R::from_row).collect()
    }

    /// A single record, or `None` if no record has that identifier.
    pub async fn get_by_id<R: Record>(&self, id: u64) -> Result<Option<R>> {
        let row: Option<R::Row> = sqlx::query_as(R::COLLECTION.select_by_id_sql())
            .bind(id_to_row(id, "id")?)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(R::from_row).transpose()
    }

    /// Look a book up through the unique ISBN index.
    pub async fn find_book_by_isbn(&self, isbn: impl AsRef<str>) -> Result<Option<Book>> {
        let row: Option<BookRow> = sqlx::query_as(include_str!("../queries/get_book_by_isbn.sql"))
            .bind(isbn.as_ref())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Book::try_from).transpose()
    }

    /// Look a student up through the unique registration number index.
    pub async fn find_student_by_registration(&self, number: impl AsRef<str>) -> Result<Option<Student>> {
        let row: Option<StudentRow> = sqlx::query_as(include_str!("../queries/get_student_by_registration.sql"))
            .bind(number.as_ref())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Student::try_from).transpose()
    }

    // =========================================================================
    // Search / Listing
    // =========================================================================

    /// Books whose title or author contains `term` (ASCII case-insensitive).
    pub async fn search_books(&self, term: impl AsRef<str>) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/search_books.sql"))
            .bind(term.as_ref())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Book::try_from).collect()
    }

    /// Students whose name contains `term` (ASCII case-insensitive).
    pub async fn search_students(&self, term: impl AsRef<str>) -> Result<Vec<Student>> {
        let rows: Vec<StudentRow> = sqlx::query_as(include_str!("../queries/search_students.sql"))
            .bind(term.as_ref())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Student::try_from).collect()
    }

    /// Loan history of a student, most recent first.
    pub async fn loans_for_student(&self, student_id: u64) -> Result<Vec<Loan>> {
        let rows: Vec<LoanRow> = sqlx::query_as(include_str!("../queries/list_loans_for_student.sql"))
            .bind(id_to_row(student_id, "student id")?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Loan::try_from).collect()
    }

    /// Loan history of a book, most recent first.
    pub async fn loans_for_book(&self, book_id: u64) -> Result<Vec<Loan>> {
        let rows: Vec<LoanRow> = sqlx::query_as(include_str!("../queries/list_loans_for_book.sql"))
            .bind(id_to_row(book_id, "book id")?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Loan::try_from).collect()
    }

    /// Every loan that hasn't been returned yet, soonest due first.
    pub async fn active_loans(&self) -> Result<Vec<Loan>> {
        let rows: Vec<LoanRow> = sqlx::query_as(include_str!("../queries/list_loans_by_status.sql"))
            .bind(LoanStatus::Active.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Loan::try_from).collect()
    }

    /// Active loans whose due date is before `today`.
    pub async fn overdue_loans(&self, today: Date) -> Result<Vec<Loan>> {
        let rows: Vec<LoanRow> = sqlx::query_as(include_str!("../queries/list_overdue_loans.sql"))
            .bind(date_to_row(today))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Loan::try_from).collect()
    }

    /// Every loan with its book and student resolved, most recent first.
    ///
    /// A book or student that has since been deleted is reported as
    /// [`Reference::Deleted`](crate::Reference::Deleted); that is an expected
    /// state, not an error.
    pub async fn loan_details(&self) -> Result<Vec<LoanDetails>> {
        let rows: Vec<LoanDetailsRow> = sqlx::query_as(include_str!("../queries/list_loan_details.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(LoanDetails::try_from).collect()
    }

    // =========================================================================
    // Counts
    // =========================================================================

    pub async fn statistics(&self, today: Date) -> Result<Statistics> {
        let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(include_str!("../queries/statistics.sql"))
            .bind(date_to_row(today))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let count = |n: i64| u64::try_from(n).or_raise(|| ErrorKind::InvalidData("count"));
        Ok(Statistics {
            books: count(row.0)?,
            total_copies: count(row.1)?,
            available_copies: count(row.2)?,
            students: count(row.3)?,
            active_loans: count(row.4)?,
            overdue_loans: count(row.5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, NewLoan, Reference};
    use rstest::rstest;
    use time::macros::date;

    async fn repo() -> Repository {
        let db = Database::connect_in_memory().await.unwrap();
        Repository::from(&db)
    }

    #[tokio::test]
    async fn test_save_assigns_and_confirms_id() {
        let repo = repo().await;
        let mut book = Book::new("9780261103573", "The Fellowship of the Ring", "J. R. R. Tolkien", 3);
        let id = repo.save(&book).await.unwrap();
        book.id = Some(id);
        book.title = "The Fellowship of the Ring (50th Anniversary)".to_string();
        assert_eq!(repo.save(&book).await.unwrap(), id);
        let stored: Book = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored, book);
        assert_eq!(repo.get_all::<Book>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_with_unknown_id_inserts_under_that_id() {
        let repo = repo().await;
        let mut student = Student::new("S-042", "Ada Lovelace", "5B");
        student.id = Some(42);
        assert_eq!(repo.save(&student).await.unwrap(), 42);
        let stored: Option<Student> = repo.get_by_id(42).await.unwrap();
        assert_eq!(stored, Some(student));
    }

    #[tokio::test]
    async fn test_duplicate_isbn_is_constraint_violation() {
        let repo = repo().await;
        repo.save(&Book::new("9780261103573", "Fellowship", "Tolkien", 1)).await.unwrap();
        let err = repo.save(&Book::new("9780261103573", "Another", "Someone", 1)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::ConstraintViolation("isbn"));
        assert_eq!(repo.get_all::<Book>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_constraint_violation() {
        let repo = repo().await;
        repo.save(&Student::new("S-001", "Alan Turing", "6A")).await.unwrap();
        let id = repo.save(&Student::new("S-002", "Grace Hopper", "6A")).await.unwrap();
        let mut hopper: Student = repo.get_by_id(id).await.unwrap().unwrap();
        hopper.registration_number = "S-001".to_string();
        let err = repo.save(&hopper).await.unwrap_err();
        assert_eq!(*err, ErrorKind::ConstraintViolation("registrationNumber"));
    }

    #[rstest]
    #[case(Book::new("", "Untitled", "Anonymous", 1))]
    #[case(Book::new("   ", "Untitled", "Anonymous", 1))]
    #[case(Book { available_copies: 3, ..Book::new("9780000000001", "Untitled", "Anonymous", 2) })]
    #[tokio::test]
    async fn test_invalid_books_are_rejected(#[case] book: Book) {
        let repo = repo().await;
        let err = repo.save(&book).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::InvalidRecord(_)));
        assert!(repo.get_all::<Book>().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let repo = repo().await;
        assert_eq!(repo.get_by_id::<Book>(99).await.unwrap(), None);
        assert_eq!(repo.get_by_id::<Loan>(99).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let repo = repo().await;
        let id = repo.save(&Student::new("S-001", "Alan Turing", "6A")).await.unwrap();
        repo.delete::<Student>(id).await.unwrap();
        repo.delete::<Student>(id).await.unwrap();
        assert_eq!(repo.get_by_id::<Student>(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookups_and_search() {
        let repo = repo().await;
        repo.save(&Book::new("9780261103573", "The Fellowship of the Ring", "J. R. R. Tolkien", 1)).await.unwrap();
        repo.save(&Book::new("9780261102361", "The Hobbit", "J. R. R. Tolkien", 1)).await.unwrap();
        repo.save(&Book::new("9780140328721", "Matilda", "Roald Dahl", 1)).await.unwrap();
        repo.save(&Student::new("S-001", "Alan Turing", "6A")).await.unwrap();

        let hobbit = repo.find_book_by_isbn("9780261102361").await.unwrap().unwrap();
        assert_eq!(hobbit.title, "The Hobbit");
        assert!(repo.find_book_by_isbn("0000").await.unwrap().is_none());

        let tolkien = repo.search_books("tolkien").await.unwrap();
        assert_eq!(tolkien.len(), 2);
        let matilda = repo.search_books("MATIL").await.unwrap();
        assert_eq!(matilda.len(), 1);

        let turing = repo.find_student_by_registration("S-001").await.unwrap().unwrap();
        assert_eq!(turing.name, "Alan Turing");
        assert_eq!(repo.search_students("turing").await.unwrap().len(), 1);
        assert!(repo.search_students("hopper").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_loan_details_resolve_deleted_references() {
        let repo = repo().await;
        let book_id = repo.save(&Book::new("9780140328721", "Matilda", "Roald Dahl", 2)).await.unwrap();
        let student_id = repo.save(&Student::new("S-001", "Alan Turing", "6A")).await.unwrap();
        let loan = repo
            .checkout(&NewLoan::for_days(book_id, student_id, date!(2024 - 05 - 01), 14))
            .await
            .unwrap();

        let details = repo.loan_details().await.unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].loan, loan);
        assert!(matches!(&details[0].book, Reference::Present(b) if b.title == "Matilda"));
        assert!(matches!(&details[0].student, Reference::Present(s) if s.name == "Alan Turing"));

        repo.delete::<Book>(book_id).await.unwrap();
        repo.delete::<Student>(student_id).await.unwrap();
        let details = repo.loan_details().await.unwrap();
        assert_eq!(details.len(), 1, "loan history survives deletion");
        assert_eq!(details[0].book, Reference::Deleted(book_id));
        assert_eq!(details[0].student, Reference::Deleted(student_id));
    }

    #[tokio::test]
    async fn test_loan_listings_and_statistics() {
        let repo = repo().await;
        let book_id = repo.save(&Book::new("9780140328721", "Matilda", "Roald Dahl", 3)).await.unwrap();
        let ada = repo.save(&Student::new("S-001", "Ada Lovelace", "6A")).await.unwrap();
        let alan = repo.save(&Student::new("S-002", "Alan Turing", "6A")).await.unwrap();
        let early = repo.checkout(&NewLoan::for_days(book_id, ada, date!(2024 - 05 - 01), 7)).await.unwrap();
        let late = repo.checkout(&NewLoan::for_days(book_id, alan, date!(2024 - 05 - 10), 14)).await.unwrap();
        repo.return_loan(early.id, date!(2024 - 05 - 05)).await.unwrap();
        let again = repo.checkout(&NewLoan::for_days(book_id, ada, date!(2024 - 05 - 06), 7)).await.unwrap();

        let history = repo.loans_for_student(ada).await.unwrap();
        assert_eq!(history.iter().map(|l| l.id).collect::<Vec<_>>(), vec![again.id, early.id]);
        assert_eq!(repo.loans_for_book(book_id).await.unwrap().len(), 3);
        assert_eq!(repo.active_loans().await.unwrap().len(), 2);

        let today = date!(2024 - 05 - 20);
        let overdue = repo.overdue_loans(today).await.unwrap();
        assert_eq!(overdue.iter().map(|l| l.id).collect::<Vec<_>>(), vec![again.id]);
        assert!(!overdue.iter().any(|l| l.id == late.id));

        let stats = repo.statistics(today).await.unwrap();
        assert_eq!(
            stats,
            Statistics {
                books: 1,
                total_copies: 3,
                available_copies: 1,
                students: 2,
                active_loans: 2,
                overdue_loans: 1,
            }
        );
    }
}
