use crate::error::{Error, ErrorKind};
use crate::models::{date_from_row, date_to_row, id_from_row, id_to_row};
use crate::record::{Loan, LoanStatus, NewLoan, SqliteQuery};

#[derive(sqlx::FromRow)]
pub struct LoanRow {
    pub(crate) id: Option<i64>,
    pub(crate) book_id: i64,
    pub(crate) student_id: i64,
    pub(crate) loan_date: i64,
    pub(crate) due_date: i64,
    #[sqlx(default)]
    pub(crate) return_date: Option<i64>,
    pub(crate) status: String,
}
impl LoanRow {
    pub(crate) fn insert(self) -> SqliteQuery {
        sqlx::query(include_str!("../../queries/insert_loan.sql"))
            .bind(self.id)
            .bind(self.book_id)
            .bind(self.student_id)
            .bind(self.loan_date)
            .bind(self.due_date)
            .bind(self.return_date)
            .bind(self.status)
    }
}
impl TryFrom<&Loan> for LoanRow {
    type Error = Error;
    fn try_from(loan: &Loan) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Some(id_to_row(loan.id, "loan id")?),
            book_id: id_to_row(loan.book_id, "book id")?,
            student_id: id_to_row(loan.student_id, "student id")?,
            loan_date: date_to_row(loan.loan_date),
            due_date: date_to_row(loan.due_date),
            return_date: loan.return_date.map(date_to_row),
            status: loan.status.to_string(),
        })
    }
}
impl TryFrom<&NewLoan> for LoanRow {
    type Error = Error;
    fn try_from(loan: &NewLoan) -> Result<Self, Self::Error> {
        Ok(Self {
            id: None,
            book_id: id_to_row(loan.book_id, "book id")?,
            student_id: id_to_row(loan.student_id, "student id")?,
            loan_date: date_to_row(loan.loan_date),
            due_date: date_to_row(loan.due_date),
            return_date: None,
            status: LoanStatus::Active.to_string(),
        })
    }
}
impl TryFrom<LoanRow> for Loan {
    type Error = Error;
    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<LoanStatus>()?;
        let return_date = row.return_date.map(|d| date_from_row(d, "return date")).transpose()?;
        if (status == LoanStatus::Returned) != return_date.is_some() {
            exn::bail!(ErrorKind::InvalidData("loan status"));
        }
        Ok(Self {
            id: id_from_row(row.id, "loan id")?,
            book_id: id_from_row(Some(row.book_id), "book id")?,
            student_id: id_from_row(Some(row.student_id), "student id")?,
            loan_date: date_from_row(row.loan_date, "loan date")?,
            due_date: date_from_row(row.due_date, "due date")?,
            return_date,
            status,
        })
    }
}
