//! SQLite record store for the libris school library.
//!
//! This crate owns every persisted record. Callers receive plain snapshots of
//! books, students and loans; changing a returned value has no effect until it
//! is handed back to the [`Repository`].
//!
//! # Architecture
//! The store keeps three collections:
//! - **Books**: catalogued titles with a unique ISBN and a stock of copies.
//!   The schema guarantees `0 <= available_copies <= total_copies`.
//! - **Students**: borrowers, unique by registration number.
//! - **Loans**: a book lent to a student. Loans reference books and students
//!   by identifier only; deleting either side never cascades, and
//!   [`Repository::loan_details`] resolves missing references to
//!   [`Reference::Deleted`] instead of failing.
//!
//! Multi-record mutations (checkout, return, bulk replace and book edits) run
//! inside a single SQLite transaction: either every effect becomes visible or
//! none does. See [`Repository::checkout`], [`Repository::return_loan`] and
//! [`Repository::replace_all`].

mod db;
pub mod error;
mod models;
mod record;
mod repo;
mod transaction;

pub use crate::db::Database;
pub use crate::record::{
    Book, BookEdit, Collection, Loan, LoanDetails, LoanStatus, NewLoan, Record, Reference, Saveable, Snapshot,
    Statistics, Student,
};
pub use crate::repo::Repository;
