use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use time::Date;
use time::macros::format_description;

#[derive(Debug, Parser)]
#[command(name = "libris", about = "School library records: books, students and loans", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, env = "LIBRIS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configuration
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// More logging; repeat for more detail
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the catalogue
    #[command(subcommand)]
    Book(BookCommand),
    /// Manage borrowers
    #[command(subcommand)]
    Student(StudentCommand),
    /// Lend and return books
    #[command(subcommand)]
    Loan(LoanCommand),
    /// Export or restore every record
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Show counts across the library
    Stats(DateArgs),
}

#[derive(Debug, Subcommand)]
pub enum BookCommand {
    /// Catalogue a new book
    Add(NewBookArgs),
    List,
    /// Show a book and its loan history
    Show { id: u64 },
    /// Change a book; copies on loan are carried over
    Edit(EditBookArgs),
    /// Remove a book; its loan history is kept
    Delete { id: u64 },
    /// Find books by title or author
    Search { term: String },
}

#[derive(Debug, Args)]
pub struct NewBookArgs {
    #[arg(long)]
    pub isbn: String,
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub author: String,
    #[arg(long, default_value_t = 1)]
    pub copies: u32,
}

#[derive(Debug, Args)]
pub struct EditBookArgs {
    pub id: u64,
    #[arg(long)]
    pub isbn: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub author: Option<String>,
    /// New total number of copies
    #[arg(long)]
    pub copies: Option<u32>,
}

#[derive(Debug, Subcommand)]
pub enum StudentCommand {
    /// Register a new student
    Add(NewStudentArgs),
    List,
    /// Show a student and their loan history
    Show { id: u64 },
    /// Change a student's details
    Edit(EditStudentArgs),
    /// Remove a student; their loan history is kept
    Delete { id: u64 },
    /// Find students by name
    Search { term: String },
}

#[derive(Debug, Args)]
pub struct NewStudentArgs {
    #[arg(long)]
    pub registration: String,
    #[arg(long)]
    pub name: String,
    #[arg(long = "class")]
    pub class_name: String,
}

#[derive(Debug, Args)]
pub struct EditStudentArgs {
    pub id: u64,
    #[arg(long)]
    pub registration: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long = "class")]
    pub class_name: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum LoanCommand {
    /// Lend a copy of a book to a student
    Checkout(CheckoutArgs),
    /// Bring a loaned copy back
    Return {
        loan: u64,
        /// Return date (YYYY-MM-DD), today if omitted
        #[arg(long, value_parser = parse_date)]
        date: Option<Date>,
    },
    /// List loans with their book and student
    List {
        /// Only loans that haven't been returned
        #[arg(long)]
        active: bool,
    },
    /// List active loans past their due date
    Overdue(DateArgs),
}

#[derive(Debug, Args)]
pub struct CheckoutArgs {
    #[arg(long)]
    pub book: u64,
    #[arg(long)]
    pub student: u64,
    /// Loan date (YYYY-MM-DD), today if omitted
    #[arg(long, value_parser = parse_date)]
    pub date: Option<Date>,
    /// Loan period in days, from the configuration if omitted
    #[arg(long)]
    pub days: Option<u16>,
}

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Write every record to a JSON backup file
    Export {
        /// Output file, a timestamped file in the backup directory if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace every record with the contents of a backup file
    Import { file: PathBuf },
}

#[derive(Debug, Args)]
pub struct DateArgs {
    /// Reference date (YYYY-MM-DD), today if omitted
    #[arg(long, value_parser = parse_date)]
    pub date: Option<Date>,
}

pub fn parse_date(s: &str) -> Result<Date, String> {
    Date::parse(s, format_description!("[year]-[month]-[day]")).map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;
    use time::macros::date;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case("2024-09-02", Some(date!(2024 - 09 - 02)))]
    #[case("2024-02-29", Some(date!(2024 - 02 - 29)))]
    #[case("2023-02-29", None)]
    #[case("02/09/2024", None)]
    #[case("", None)]
    fn test_parse_date(#[case] input: &str, #[case] expected: Option<Date>) {
        assert_eq!(parse_date(input).ok(), expected);
    }

    #[test]
    fn test_checkout_arguments() {
        let cli = Cli::parse_from([
            "libris", "-vv", "loan", "checkout", "--book", "3", "--student", "7", "--date", "2024-09-02",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Loan(LoanCommand::Checkout(args)) = cli.command else {
            panic!("expected loan checkout");
        };
        assert_eq!((args.book, args.student, args.days), (3, 7, None));
        assert_eq!(args.date, Some(date!(2024 - 09 - 02)));
    }

    #[test]
    fn test_student_edit_arguments() {
        let cli = Cli::parse_from(["libris", "student", "edit", "4", "--class", "6A"]);
        let Command::Student(StudentCommand::Edit(args)) = cli.command else {
            panic!("expected student edit");
        };
        assert_eq!(args.id, 4);
        assert_eq!(args.class_name.as_deref(), Some("6A"));
        assert_eq!((args.registration, args.name), (None, None));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["libris", "backup", "import", "dump.json", "--database", "/tmp/l.sqlite3"]);
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/l.sqlite3")));
        assert!(matches!(cli.command, Command::Backup(BackupCommand::Import { .. })));
    }
}
