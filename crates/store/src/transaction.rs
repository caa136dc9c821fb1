//! Transaction coordinator.
//!
//! Every operation here groups several writes into one SQLite transaction.
//! The body of a transaction returns an [`Outcome`]; the coordinator commits
//! on [`Outcome::Commit`] and rolls back on [`Outcome::Abort`], so business
//! rules never leave partial state behind. A storage fault inside a body is
//! returned as an error, and the transaction is rolled back when it is
//! dropped.

use crate::error::{ErrorKind, Result};
use crate::models::{BookRow, LoanRow, date_to_row, id_to_row};
use crate::record::{Book, BookEdit, Collection, Loan, LoanStatus, NewLoan, Record, Saveable, Snapshot, Student};
use crate::repo::Repository;
use exn::{Exn, ResultExt};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use time::Date;
use tracing::{debug, instrument, warn};

/// Result of a transaction body, deciding between commit and rollback.
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    Commit(T),
    Abort(ErrorKind),
}

/// Commit or roll back according to the outcome of the transaction body.
async fn settle<T>(tx: Transaction<'static, Sqlite>, outcome: Outcome<T>) -> Result<T> {
    match outcome {
        Outcome::Commit(value) => {
            tx.commit().await.or_raise(|| ErrorKind::Database)?;
            Ok(value)
        },
        Outcome::Abort(reason) => {
            warn!(%reason, "aborting transaction");
            tx.rollback().await.or_raise(|| ErrorKind::Database)?;
            Err(Exn::new(reason))
        },
    }
}

async fn fetch_book(conn: &mut SqliteConnection, id: u64) -> Result<Option<Book>> {
    let row: Option<BookRow> = sqlx::query_as(Collection::Books.select_by_id_sql())
        .bind(id_to_row(id, "book id")?)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(Book::try_from).transpose()
}

async fn fetch_loan(conn: &mut SqliteConnection, id: u64) -> Result<Option<Loan>> {
    let row: Option<LoanRow> = sqlx::query_as(Collection::Loans.select_by_id_sql())
        .bind(id_to_row(id, "loan id")?)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(Loan::try_from).transpose()
}

async fn fetch_all<R: Record>(conn: &mut SqliteConnection) -> Result<Vec<R>> {
    let rows: Vec<R::Row> = sqlx::query_as(R::COLLECTION.select_all_sql())
        .fetch_all(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    rows.into_iter().map(R::from_row).collect()
}

async fn insert_all<R: Record>(conn: &mut SqliteConnection, records: &[R]) -> Result<()> {
    let collection = R::COLLECTION.as_str();
    for record in records {
        record
            .insert_query()?
            .execute(&mut *conn)
            .await
            .map_err(|e| ErrorKind::write(e, collection, collection))?;
    }
    Ok(())
}

async fn checkout_in(conn: &mut SqliteConnection, loan: &NewLoan) -> Result<Outcome<Loan>> {
    let Some(book) = fetch_book(conn, loan.book_id).await? else {
        return Ok(Outcome::Abort(ErrorKind::Unavailable(loan.book_id)));
    };
    if book.available_copies == 0 {
        return Ok(Outcome::Abort(ErrorKind::Unavailable(loan.book_id)));
    }
    sqlx::query(include_str!("../queries/decrement_available_copies.sql"))
        .bind(id_to_row(loan.book_id, "book id")?)
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    let result = LoanRow::try_from(loan)?
        .insert()
        .execute(&mut *conn)
        .await
        .map_err(|e| ErrorKind::write(e, "loan id", "loan"))?;
    let id = u64::try_from(result.last_insert_rowid()).or_raise(|| ErrorKind::InvalidData("loan id"))?;
    Ok(Outcome::Commit(Loan {
        id,
        book_id: loan.book_id,
        student_id: loan.student_id,
        loan_date: loan.loan_date,
        due_date: loan.due_date,
        return_date: None,
        status: LoanStatus::Active,
    }))
}

async fn return_in(conn: &mut SqliteConnection, loan_id: u64, return_date: Date) -> Result<Outcome<Loan>> {
    let Some(mut loan) = fetch_loan(conn, loan_id).await? else {
        return Ok(Outcome::Abort(ErrorKind::InvalidLoanState(loan_id)));
    };
    if loan.status == LoanStatus::Returned {
        return Ok(Outcome::Abort(ErrorKind::InvalidLoanState(loan_id)));
    }
    sqlx::query(include_str!("../queries/mark_loan_returned.sql"))
        .bind(date_to_row(return_date))
        .bind(id_to_row(loan_id, "loan id")?)
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    loan.status = LoanStatus::Returned;
    loan.return_date = Some(return_date);
    match fetch_book(conn, loan.book_id).await? {
        None => debug!(book_id = loan.book_id, "returned loan references a deleted book"),
        Some(book) if book.available_copies >= book.total_copies => {
            warn!(book_id = loan.book_id, total = book.total_copies, "all copies already on the shelf, not restocking");
        },
        Some(_) => {
            sqlx::query(include_str!("../queries/increment_available_copies.sql"))
                .bind(id_to_row(loan.book_id, "book id")?)
                .execute(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?;
        },
    }
    Ok(Outcome::Commit(loan))
}

async fn edit_book_in(conn: &mut SqliteConnection, id: u64, edit: &BookEdit) -> Result<Outcome<Book>> {
    let Some(book) = fetch_book(conn, id).await? else {
        return Ok(Outcome::Abort(ErrorKind::NotFound("book", id)));
    };
    let Some(edited) = book.apply(edit) else {
        return Ok(Outcome::Abort(ErrorKind::InvalidRecord("fewer copies than are on loan")));
    };
    if let Err(err) = edited.validate() {
        return Ok(Outcome::Abort((*err).clone()));
    }
    BookRow::try_from(&edited)?
        .upsert()
        .execute(&mut *conn)
        .await
        .map_err(|e| ErrorKind::write(e, "isbn", "book"))?;
    Ok(Outcome::Commit(edited))
}

async fn replace_in(conn: &mut SqliteConnection, snapshot: &Snapshot) -> Result<Outcome<()>> {
    // Loans first: they reference the other two.
    for collection in [Collection::Loans, Collection::Students, Collection::Books] {
        sqlx::query(collection.clear_sql())
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
    }
    insert_all(conn, &snapshot.books).await?;
    insert_all(conn, &snapshot.students).await?;
    insert_all(conn, &snapshot.loans).await?;
    Ok(Outcome::Commit(()))
}

impl Repository {
    async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool.begin().await.or_raise(|| ErrorKind::Database)
    }

    /// Lend a copy of a book.
    ///
    /// Inside one transaction: reads the book, decrements its available
    /// copies and creates an active loan. If the book doesn't exist or has no
    /// copies left, fails with [`ErrorKind::Unavailable`] and nothing changes.
    #[instrument(skip(self), fields(book_id = loan.book_id, student_id = loan.student_id))]
    pub async fn checkout(&self, loan: &NewLoan) -> Result<Loan> {
        let mut tx = self.begin().await?;
        let outcome = checkout_in(&mut tx, loan).await?;
        let loan = settle(tx, outcome).await?;
        debug!(loan_id = loan.id, "checked out");
        Ok(loan)
    }

    /// Bring a loaned copy back.
    ///
    /// Inside one transaction: marks the loan returned on `return_date` and
    /// puts the copy back on the shelf. If the book has since been deleted the
    /// loan is still returned. Fails with [`ErrorKind::InvalidLoanState`] if
    /// the loan doesn't exist or was already returned; nothing changes.
    #[instrument(skip(self))]
    pub async fn return_loan(&self, loan_id: u64, return_date: Date) -> Result<Loan> {
        let mut tx = self.begin().await?;
        let outcome = return_in(&mut tx, loan_id, return_date).await?;
        let loan = settle(tx, outcome).await?;
        debug!(book_id = loan.book_id, "returned");
        Ok(loan)
    }

    /// Edit a book, carrying a change in total copies over to the available
    /// copies (see [`Book::apply`]).
    ///
    /// Fails with [`ErrorKind::NotFound`] for a missing book and
    /// [`ErrorKind::InvalidRecord`] if more copies are on loan than the new
    /// total allows.
    #[instrument(skip(self, edit))]
    pub async fn edit_book(&self, id: u64, edit: &BookEdit) -> Result<Book> {
        let mut tx = self.begin().await?;
        let outcome = edit_book_in(&mut tx, id, edit).await?;
        settle(tx, outcome).await
    }

    /// Consistent copy of all three collections, read inside one
    /// transaction.
    #[instrument(skip(self))]
    pub async fn export_all(&self) -> Result<Snapshot> {
        let mut tx = self.begin().await?;
        let snapshot = Snapshot {
            books: fetch_all::<Book>(&mut tx).await?,
            students: fetch_all::<Student>(&mut tx).await?,
            loans: fetch_all::<Loan>(&mut tx).await?,
        };
        settle(tx, Outcome::Commit(snapshot)).await
    }

    /// Replace the contents of every collection with `snapshot`, keeping the
    /// snapshot's identifiers.
    ///
    /// All or nothing: if any record can't be inserted the transaction is
    /// rolled back and the previous contents remain exactly as they were.
    #[instrument(skip_all, fields(records = snapshot.record_count()))]
    pub async fn replace_all(&self, snapshot: &Snapshot) -> Result<()> {
        let mut tx = self.begin().await?;
        let outcome = replace_in(&mut tx, snapshot).await?;
        settle(tx, outcome).await?;
        debug!("replaced all collections");
        Ok(())
    }
}
