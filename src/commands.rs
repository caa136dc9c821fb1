use crate::cli::{BackupCommand, BookCommand, Cli, Command, LoanCommand, StudentCommand};
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use libris_backup::{ImportPipeline, export_backup};
use libris_config::Config;
use libris_store::{Book, BookEdit, Database, Loan, LoanDetails, NewLoan, Reference, Repository, Student};
use std::path::Path;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

fn book_line(book: &Book) -> String {
    format!(
        "#{:<4} {}  {} by {}  ({}/{} available)",
        book.id.unwrap_or_default(),
        book.isbn,
        book.title,
        book.author,
        book.available_copies,
        book.total_copies
    )
}

fn student_line(student: &Student) -> String {
    format!(
        "#{:<4} {}  {} ({})",
        student.id.unwrap_or_default(),
        student.registration_number,
        student.name,
        student.class_name
    )
}

fn loan_line(loan: &Loan) -> String {
    let returned = match loan.return_date {
        Some(date) => format!(", returned {date}"),
        None => String::new(),
    };
    format!(
        "loan #{:<4} book #{} to student #{}  {} → {}  [{}{}]",
        loan.id, loan.book_id, loan.student_id, loan.loan_date, loan.due_date, loan.status, returned
    )
}

fn details_line(details: &LoanDetails, today: Date) -> String {
    let book = match &details.book {
        Reference::Present(book) => book.title.clone(),
        Reference::Deleted(id) => format!("(deleted book #{id})"),
    };
    let student = match &details.student {
        Reference::Present(student) => student.name.clone(),
        Reference::Deleted(id) => format!("(deleted student #{id})"),
    };
    let overdue = if details.loan.is_overdue(today) { "  OVERDUE" } else { "" };
    format!("{}  \"{book}\" → {student}{overdue}", loan_line(&details.loan))
}

/// Load configuration, connect to the database and run the command.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref()).map_err(ErrorKind::config)?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }
    if let Some(parent) = config.database.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .or_raise(|| ErrorKind::Io(parent.to_path_buf()))?;
    }
    debug!(path = %config.database.path.display(), "opening database");
    let db = Database::connect_with_max(&config.database.path, config.database.max_connections)
        .await
        .map_err(ErrorKind::store)?;
    let repo = Repository::from(&db);
    let result = dispatch(&config, &repo, cli.command).await;
    db.close().await;
    result
}

async fn dispatch(config: &Config, repo: &Repository, command: Command) -> Result<()> {
    match command {
        Command::Book(command) => book(repo, command).await,
        Command::Student(command) => student(repo, command).await,
        Command::Loan(command) => loan(config, repo, command).await,
        Command::Backup(command) => backup(config, repo, command).await,
        Command::Stats(args) => {
            let stats = repo.statistics(args.date.unwrap_or_else(today)).await.map_err(ErrorKind::store)?;
            println!("books:            {}", stats.books);
            println!("copies:           {} ({} available)", stats.total_copies, stats.available_copies);
            println!("students:         {}", stats.students);
            println!("active loans:     {}", stats.active_loans);
            println!("overdue loans:    {}", stats.overdue_loans);
            Ok(())
        },
    }
}

async fn find_book(repo: &Repository, id: u64) -> Result<Book> {
    repo.get_by_id::<Book>(id)
        .await
        .map_err(ErrorKind::store)?
        .ok_or_raise(|| ErrorKind::NotFound("book", id.to_string()))
}

async fn find_student(repo: &Repository, id: u64) -> Result<Student> {
    repo.get_by_id::<Student>(id)
        .await
        .map_err(ErrorKind::store)?
        .ok_or_raise(|| ErrorKind::NotFound("student", id.to_string()))
}

async fn book(repo: &Repository, command: BookCommand) -> Result<()> {
    match command {
        BookCommand::Add(args) => {
            let book = Book::new(args.isbn, args.title, args.author, args.copies);
            let id = repo.save(&book).await.map_err(ErrorKind::store)?;
            info!(id, "book added");
            println!("added book #{id}");
        },
        BookCommand::List => {
            for book in repo.get_all::<Book>().await.map_err(ErrorKind::store)? {
                println!("{}", book_line(&book));
            }
        },
        BookCommand::Show { id } => {
            let book = find_book(repo, id).await?;
            println!("{}", book_line(&book));
            for loan in repo.loans_for_book(id).await.map_err(ErrorKind::store)? {
                println!("  {}", loan_line(&loan));
            }
        },
        BookCommand::Edit(args) => {
            let mut edit = BookEdit::from(&find_book(repo, args.id).await?);
            if let Some(isbn) = args.isbn {
                edit.isbn = isbn;
            }
            if let Some(title) = args.title {
                edit.title = title;
            }
            if let Some(author) = args.author {
                edit.author = author;
            }
            if let Some(copies) = args.copies {
                edit.total_copies = copies;
            }
            let book = repo.edit_book(args.id, &edit).await.map_err(ErrorKind::store)?;
            println!("{}", book_line(&book));
        },
        BookCommand::Delete { id } => {
            repo.delete::<Book>(id).await.map_err(ErrorKind::store)?;
            println!("deleted book #{id}");
        },
        BookCommand::Search { term } => {
            for book in repo.search_books(&term).await.map_err(ErrorKind::store)? {
                println!("{}", book_line(&book));
            }
        },
    }
    Ok(())
}

async fn student(repo: &Repository, command: StudentCommand) -> Result<()> {
    match command {
        StudentCommand::Add(args) => {
            let student = Student::new(args.registration, args.name, args.class_name);
            let id = repo.save(&student).await.map_err(ErrorKind::store)?;
            info!(id, "student added");
            println!("added student #{id}");
        },
        StudentCommand::List => {
            for student in repo.get_all::<Student>().await.map_err(ErrorKind::store)? {
                println!("{}", student_line(&student));
            }
        },
        StudentCommand::Show { id } => {
            let student = find_student(repo, id).await?;
            println!("{}", student_line(&student));
            for loan in repo.loans_for_student(id).await.map_err(ErrorKind::store)? {
                println!("  {}", loan_line(&loan));
            }
        },
        StudentCommand::Edit(args) => {
            let mut student = find_student(repo, args.id).await?;
            if let Some(registration) = args.registration {
                student.registration_number = registration;
            }
            if let Some(name) = args.name {
                student.name = name;
            }
            if let Some(class_name) = args.class_name {
                student.class_name = class_name;
            }
            repo.save(&student).await.map_err(ErrorKind::store)?;
            println!("{}", student_line(&student));
        },
        StudentCommand::Delete { id } => {
            repo.delete::<Student>(id).await.map_err(ErrorKind::store)?;
            println!("deleted student #{id}");
        },
        StudentCommand::Search { term } => {
            for student in repo.search_students(&term).await.map_err(ErrorKind::store)? {
                println!("{}", student_line(&student));
            }
        },
    }
    Ok(())
}

async fn loan(config: &Config, repo: &Repository, command: LoanCommand) -> Result<()> {
    match command {
        LoanCommand::Checkout(args) => {
            let days = args.days.unwrap_or(config.loans.period_days);
            let new_loan = NewLoan::for_days(args.book, args.student, args.date.unwrap_or_else(today), days);
            let loan = repo.checkout(&new_loan).await.map_err(ErrorKind::store)?;
            println!("{}", loan_line(&loan));
        },
        LoanCommand::Return { loan, date } => {
            let loan = repo.return_loan(loan, date.unwrap_or_else(today)).await.map_err(ErrorKind::store)?;
            println!("{}", loan_line(&loan));
        },
        LoanCommand::List { active } => {
            let today = today();
            for details in repo.loan_details().await.map_err(ErrorKind::store)? {
                if !active || details.loan.is_active() {
                    println!("{}", details_line(&details, today));
                }
            }
        },
        LoanCommand::Overdue(args) => {
            for loan in repo.overdue_loans(args.date.unwrap_or_else(today)).await.map_err(ErrorKind::store)? {
                println!("{}", loan_line(&loan));
            }
        },
    }
    Ok(())
}

async fn backup(config: &Config, repo: &Repository, command: BackupCommand) -> Result<()> {
    match command {
        BackupCommand::Export { output } => {
            let backup = export_backup(repo).await.map_err(ErrorKind::backup)?;
            let json = backup.to_json(config.backup.pretty).map_err(ErrorKind::backup)?;
            let path = match output {
                Some(path) => path,
                None => {
                    let stamp = OffsetDateTime::now_utc()
                        .format(format_description!("[year][month][day]T[hour][minute][second]Z"))
                        .or_raise(|| ErrorKind::Io(config.backup.directory.clone()))?;
                    config.backup_path(&stamp)
                },
            };
            write_file(&path, json).await?;
            println!("exported {} records to {}", backup.record_count(), path.display());
        },
        BackupCommand::Import { file } => {
            let input = tokio::fs::read_to_string(&file).await.or_raise(|| ErrorKind::Io(file.clone()))?;
            let mut pipeline = ImportPipeline::new(repo);
            let summary = pipeline.run(&input).await.map_err(ErrorKind::backup)?;
            info!(state = %pipeline.state(), "import finished");
            println!(
                "imported {} books, {} students and {} loans (exported {})",
                summary.books, summary.students, summary.loans, summary.export_timestamp
            );
        },
    }
    Ok(())
}

async fn write_file(path: &Path, contents: String) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .or_raise(|| ErrorKind::Io(parent.to_path_buf()))?;
    }
    tokio::fs::write(path, contents).await.or_raise(|| ErrorKind::Io(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::EditStudentArgs;
    use libris_store::LoanStatus;
    use time::macros::date;

    fn loan() -> Loan {
        Loan {
            id: 5,
            book_id: 1,
            student_id: 2,
            loan_date: date!(2024 - 09 - 02),
            due_date: date!(2024 - 09 - 16),
            return_date: None,
            status: LoanStatus::Active,
        }
    }

    #[test]
    fn test_details_line_marks_deleted_and_overdue() {
        let details = LoanDetails {
            loan: loan(),
            book: Reference::Deleted(1),
            student: Reference::Present(Student::new("S-002", "Ada Lovelace", "5B")),
        };
        let line = details_line(&details, date!(2024 - 09 - 20));
        assert!(line.contains("(deleted book #1)"), "{line}");
        assert!(line.contains("Ada Lovelace"), "{line}");
        assert!(line.ends_with("OVERDUE"), "{line}");
        assert!(!details_line(&details, date!(2024 - 09 - 10)).contains("OVERDUE"));
    }

    #[tokio::test]
    async fn test_student_edit_keeps_unchanged_fields() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let id = repo.save(&Student::new("S-002", "Ada Lovelace", "5B")).await.unwrap();
        let edit = EditStudentArgs {
            id,
            registration: None,
            name: None,
            class_name: Some("6A".to_string()),
        };
        student(&repo, StudentCommand::Edit(edit)).await.unwrap();

        let stored: Student = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.class_name, "6A");
        assert_eq!(stored.registration_number, "S-002");
        assert_eq!(stored.name, "Ada Lovelace");
        assert_eq!(repo.get_all::<Student>().await.unwrap().len(), 1);

        let missing = EditStudentArgs {
            id: 404,
            registration: None,
            name: None,
            class_name: None,
        };
        let err = student(&repo, StudentCommand::Edit(missing)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound("student", _)));
        db.close().await;
    }

    #[test]
    fn test_loan_line_shows_return_date() {
        let mut loan = loan();
        assert!(loan_line(&loan).contains("[active]"));
        loan.status = LoanStatus::Returned;
        loan.return_date = Some(date!(2024 - 09 - 10));
        assert!(loan_line(&loan).contains("[returned, returned 2024-09-10]"));
    }
}
