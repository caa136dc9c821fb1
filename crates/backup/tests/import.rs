use async_trait::async_trait;
use libris_backup::error::ErrorKind;
use libris_backup::{Backup, ImportPipeline, ImportState, SnapshotStore, export_backup, read_backup};
use libris_store::error::{ErrorKind as StoreErrorKind, Result as StoreResult};
use libris_store::{Book, Database, Loan, LoanStatus, NewLoan, Repository, Snapshot, Student};
use std::sync::atomic::{AtomicUsize, Ordering};
use time::macros::{date, datetime};
use tokio::sync::RwLock;

async fn library() -> Repository {
    let db = Database::connect_in_memory().await.unwrap();
    let repo = Repository::from(&db);
    let dune = repo.save(&Book::new("9780441013593", "Dune", "Frank Herbert", 2)).await.unwrap();
    let matilda = repo.save(&Book::new("9780140328721", "Matilda", "Roald Dahl", 1)).await.unwrap();
    let paul = repo.save(&Student::new("S-001", "Paul Atreides", "4C")).await.unwrap();
    let ada = repo.save(&Student::new("S-002", "Ada Lovelace", "5B")).await.unwrap();
    let first = repo.checkout(&NewLoan::for_days(dune, paul, date!(2024 - 09 - 02), 14)).await.unwrap();
    repo.checkout(&NewLoan::for_days(matilda, ada, date!(2024 - 09 - 03), 14)).await.unwrap();
    repo.return_loan(first.id, date!(2024 - 09 - 09)).await.unwrap();
    repo
}

fn book(id: u64, isbn: &str, total: u32, available: u32) -> Book {
    Book {
        id: Some(id),
        available_copies: available,
        ..Book::new(isbn, "Title", "Author", total)
    }
}

fn backup_of(snapshot: Snapshot) -> String {
    Backup::create_at(snapshot, datetime!(2024-10-01 12:00:00 UTC))
        .unwrap()
        .to_json(true)
        .unwrap()
}

#[tokio::test]
async fn test_round_trip_into_a_fresh_store() {
    let source = library().await;
    let original = source.export_all().await.unwrap();
    let json = export_backup(&source).await.unwrap().to_json(true).unwrap();

    let validated = read_backup(&json).unwrap();
    assert_eq!(validated.clone().into_snapshot(), original);

    let target = Repository::from(&Database::connect_in_memory().await.unwrap());
    target.save(&Student::new("S-999", "Overwritten", "1A")).await.unwrap();
    let mut pipeline = ImportPipeline::new(&target);
    let summary = pipeline.run(&json).await.unwrap();
    assert_eq!(pipeline.state(), ImportState::Committed);
    assert_eq!((summary.books, summary.students, summary.loans), (2, 2, 2));
    assert_eq!(target.export_all().await.unwrap(), original);

    // Identifiers survive, so the loan history still lines up.
    let details = target.loan_details().await.unwrap();
    assert!(details.iter().all(|d| !d.book.is_deleted() && !d.student.is_deleted()));
}

#[tokio::test]
async fn test_tampered_backup_is_rejected_before_any_write() {
    let repo = library().await;
    let before = repo.export_all().await.unwrap();
    let json = export_backup(&repo).await.unwrap().to_json(true).unwrap();
    let tampered = json.replacen("Frank Herbert", "Brian Herbert", 1);

    let mut pipeline = ImportPipeline::new(&repo);
    let err = pipeline.run(&tampered).await.unwrap_err();
    assert_eq!(*err, ErrorKind::ChecksumMismatch);
    assert_eq!(pipeline.state(), ImportState::Aborted);
    assert_eq!(repo.export_all().await.unwrap(), before);
}

#[tokio::test]
async fn test_unparseable_backup() {
    let repo = library().await;
    let mut pipeline = ImportPipeline::new(&repo);
    let err = pipeline.run("{\"version\": \"1.0\"").await.unwrap_err();
    assert_eq!(*err, ErrorKind::ParseError);
    assert_eq!(pipeline.state(), ImportState::Aborted);
}

#[tokio::test]
async fn test_failed_replace_restores_previous_records() {
    let repo = library().await;
    let before = repo.export_all().await.unwrap();
    // Well-formed and correctly checksummed, but the ISBN index refuses it.
    let json = backup_of(Snapshot {
        books: vec![book(1, "9780000000001", 1, 1), book(2, "9780000000001", 1, 1)],
        ..Snapshot::default()
    });

    let mut pipeline = ImportPipeline::new(&repo);
    let err = pipeline.run(&json).await.unwrap_err();
    assert_eq!(*err, ErrorKind::RolledBack);
    assert!(!err.is_fatal());
    assert_eq!(pipeline.state(), ImportState::RolledBack);
    assert_eq!(repo.export_all().await.unwrap(), before);
}

#[tokio::test]
async fn test_repeated_identifiers_are_not_merged() {
    let repo = library().await;
    let before = repo.export_all().await.unwrap();
    let json = backup_of(Snapshot {
        books: vec![book(3, "111", 1, 1), book(3, "222", 1, 1)],
        ..Snapshot::default()
    });
    assert_eq!(read_backup(&json).unwrap().books.len(), 2);

    let mut pipeline = ImportPipeline::new(&repo);
    let err = pipeline.run(&json).await.unwrap_err();
    assert_eq!(*err, ErrorKind::RolledBack);
    assert_eq!(pipeline.state(), ImportState::RolledBack);
    assert_eq!(repo.export_all().await.unwrap(), before);
}

#[tokio::test]
async fn test_record_rejected_by_schema_restores_previous_records() {
    let repo = library().await;
    let before = repo.export_all().await.unwrap();
    let json = backup_of(Snapshot {
        books: vec![book(1, "9780000000001", 1, 5)],
        ..Snapshot::default()
    });

    let err = ImportPipeline::new(&repo).run(&json).await.unwrap_err();
    assert_eq!(*err, ErrorKind::RolledBack);
    assert_eq!(repo.export_all().await.unwrap(), before);
}

/// In-memory [`SnapshotStore`] with injectable failures.
#[derive(Default)]
struct FaultyStore {
    snapshot: RwLock<Snapshot>,
    fail_export: bool,
    /// Number of upcoming `replace_all` calls that fail.
    failing_replaces: AtomicUsize,
    replace_calls: AtomicUsize,
}

impl FaultyStore {
    fn with(snapshot: Snapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            ..Self::default()
        }
    }

    fn failing_replaces(self, count: usize) -> Self {
        self.failing_replaces.store(count, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl SnapshotStore for FaultyStore {
    async fn export_all(&self) -> StoreResult<Snapshot> {
        if self.fail_export {
            exn::bail!(StoreErrorKind::Database);
        }
        Ok(self.snapshot.read().await.clone())
    }

    async fn replace_all(&self, snapshot: &Snapshot) -> StoreResult<()> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_replaces.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_replaces.store(failing - 1, Ordering::SeqCst);
            exn::bail!(StoreErrorKind::Database);
        }
        *self.snapshot.write().await = snapshot.clone();
        Ok(())
    }
}

fn current() -> Snapshot {
    Snapshot {
        books: vec![book(1, "9780441013593", 2, 1)],
        students: vec![Student {
            id: Some(1),
            ..Student::new("S-001", "Paul Atreides", "4C")
        }],
        loans: vec![Loan {
            id: 1,
            book_id: 1,
            student_id: 1,
            loan_date: date!(2024 - 09 - 02),
            due_date: date!(2024 - 09 - 16),
            return_date: None,
            status: LoanStatus::Active,
        }],
    }
}

fn incoming() -> String {
    backup_of(Snapshot {
        books: vec![book(7, "9780140328721", 1, 1)],
        ..Snapshot::default()
    })
}

#[tokio::test]
async fn test_transient_fault_is_rolled_back() {
    let store = FaultyStore::with(current()).failing_replaces(1);
    let mut pipeline = ImportPipeline::new(&store);
    let err = pipeline.run(&incoming()).await.unwrap_err();
    assert_eq!(*err, ErrorKind::RolledBack);
    assert_eq!(pipeline.state(), ImportState::RolledBack);
    assert_eq!(store.replace_calls.load(Ordering::SeqCst), 2);
    assert_eq!(*store.snapshot.read().await, current());
}

#[tokio::test]
async fn test_failed_rollback_is_fatal() {
    let store = FaultyStore::with(current()).failing_replaces(2);
    let mut pipeline = ImportPipeline::new(&store);
    let err = pipeline.run(&incoming()).await.unwrap_err();
    assert_eq!(*err, ErrorKind::RollbackFailed);
    assert!(err.is_fatal());
    assert_eq!(pipeline.state(), ImportState::Aborted);
    assert_eq!(store.replace_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_no_replace_without_a_rollback_point() {
    let store = FaultyStore {
        fail_export: true,
        ..FaultyStore::with(current())
    };
    let mut pipeline = ImportPipeline::new(&store);
    let err = pipeline.run(&incoming()).await.unwrap_err();
    assert_eq!(*err, ErrorKind::Snapshot);
    assert_eq!(pipeline.state(), ImportState::Aborted);
    assert_eq!(store.replace_calls.load(Ordering::SeqCst), 0);
    assert_eq!(*store.snapshot.read().await, current());
}

#[tokio::test]
async fn test_successful_import_through_trait_object() {
    let store = FaultyStore::with(current());
    let dyn_store: &dyn SnapshotStore = &store;
    let mut pipeline = ImportPipeline::new(dyn_store);
    let summary = pipeline.run(&incoming()).await.unwrap();
    assert_eq!(summary.record_count(), 1);
    assert_eq!(pipeline.state(), ImportState::Committed);
    assert_eq!(store.snapshot.read().await.books[0].id, Some(7));
}
