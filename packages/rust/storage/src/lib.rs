//! libSQL storage layer for the Storyloom library.
//!
//! The [`Storage`] struct wraps a libSQL database holding books, committed
//! prose segments, and the generation audit trail. It implements the core's
//! [`SegmentStore`] and [`RecordStore`] seams, so the session controller
//! never sees SQL.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use uuid::Uuid;

use storyloom_core::{RecordStore, SegmentStore};
use storyloom_shared::{
    Book, BookId, GenerationRecord, NewGenerationRecord, NewSegment, Result, SamplingParams,
    Segment, StoryloomError,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoryloomError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoryloomError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| StoryloomError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        StoryloomError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Book operations
    // -----------------------------------------------------------------------

    /// Create a new book and return its record.
    pub async fn create_book(&self, title: &str, author_id: &str) -> Result<Book> {
        let book = Book {
            id: BookId::new(),
            title: title.to_string(),
            author_id: author_id.to_string(),
            created_at: Utc::now(),
        };
        self.conn
            .execute(
                "INSERT INTO books (id, title, author_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    book.id.to_string(),
                    book.title.as_str(),
                    book.author_id.as_str(),
                    book.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoryloomError::Storage(e.to_string()))?;
        Ok(book)
    }

    /// Get a book by ID.
    pub async fn get_book(&self, id: &BookId) -> Result<Option<Book>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, author_id, created_at FROM books WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoryloomError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_book(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoryloomError::Storage(e.to_string())),
        }
    }

    /// List all books, newest first.
    pub async fn list_books(&self) -> Result<Vec<Book>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, author_id, created_at FROM books ORDER BY created_at DESC",
                params![],
            )
            .await
            .map_err(|e| StoryloomError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_book(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Segment operations
    // -----------------------------------------------------------------------

    /// Append one committed segment. The UNIQUE(book_id, sequence_no) index
    /// rejects a duplicate sequence number.
    pub async fn insert_segment(&self, segment: &NewSegment) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO segments (id, book_id, chapter_no, sequence_no, title, text, author_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    Uuid::now_v7().to_string(),
                    segment.book_id.to_string(),
                    i64::from(segment.chapter_no),
                    segment.sequence_no as i64,
                    segment.title.as_str(),
                    segment.text.as_str(),
                    segment.author_id.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoryloomError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List every segment of a book. No ordering is promised — the chapter
    /// assembler sorts on read.
    pub async fn list_segments(&self, book_id: &BookId) -> Result<Vec<Segment>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, book_id, chapter_no, sequence_no, title, text, author_id, created_at
                 FROM segments WHERE book_id = ?1",
                params![book_id.to_string()],
            )
            .await
            .map_err(|e| StoryloomError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_segment(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Generation record operations
    // -----------------------------------------------------------------------

    /// Append one generation audit record.
    pub async fn insert_generation_record(&self, record: &NewGenerationRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO generation_records
                 (id, book_id, model, system_prompt, user_prompt,
                  top_k, top_p, min_p, temperature, repeat_penalty, author_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    Uuid::now_v7().to_string(),
                    record.book_id.to_string(),
                    record.model.as_str(),
                    record.system_prompt.as_str(),
                    record.user_prompt.as_str(),
                    record.params.top_k,
                    record.params.top_p,
                    record.params.min_p,
                    record.params.temperature,
                    record.params.repeat_penalty,
                    record.author_id.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoryloomError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List a book's generation records, oldest first.
    pub async fn list_generation_records(&self, book_id: &BookId) -> Result<Vec<GenerationRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, book_id, model, system_prompt, user_prompt,
                        top_k, top_p, min_p, temperature, repeat_penalty, author_id, created_at
                 FROM generation_records WHERE book_id = ?1 ORDER BY created_at",
                params![book_id.to_string()],
            )
            .await
            .map_err(|e| StoryloomError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Core trait seams
// ---------------------------------------------------------------------------

impl SegmentStore for Storage {
    async fn fetch_segments(&self, book_id: &BookId) -> Result<Vec<Segment>> {
        self.list_segments(book_id).await
    }

    async fn insert_segment(&self, segment: &NewSegment) -> Result<()> {
        Storage::insert_segment(self, segment).await
    }
}

impl RecordStore for Storage {
    async fn insert_record(&self, record: &NewGenerationRecord) -> Result<()> {
        self.insert_generation_record(record).await
    }
}

// ---------------------------------------------------------------------------
// Row converters
// ---------------------------------------------------------------------------

fn get_str(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| StoryloomError::Storage(e.to_string()))
}

fn get_timestamp(row: &libsql::Row, idx: i32) -> Result<chrono::DateTime<chrono::Utc>> {
    let s = get_str(row, idx)?;
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| StoryloomError::Storage(format!("invalid date: {e}")))
}

fn get_book_id(row: &libsql::Row, idx: i32) -> Result<BookId> {
    get_str(row, idx)?
        .parse()
        .map_err(|e| StoryloomError::Storage(format!("invalid book id: {e}")))
}

fn row_to_book(row: &libsql::Row) -> Result<Book> {
    Ok(Book {
        id: get_book_id(row, 0)?,
        title: get_str(row, 1)?,
        author_id: get_str(row, 2)?,
        created_at: get_timestamp(row, 3)?,
    })
}

fn row_to_segment(row: &libsql::Row) -> Result<Segment> {
    Ok(Segment {
        id: get_str(row, 0)?,
        book_id: get_book_id(row, 1)?,
        chapter_no: row
            .get::<i64>(2)
            .map_err(|e| StoryloomError::Storage(e.to_string()))? as u32,
        sequence_no: row
            .get::<i64>(3)
            .map_err(|e| StoryloomError::Storage(e.to_string()))? as u64,
        title: get_str(row, 4)?,
        text: get_str(row, 5)?,
        author_id: get_str(row, 6)?,
        created_at: get_timestamp(row, 7)?,
    })
}

fn row_to_record(row: &libsql::Row) -> Result<GenerationRecord> {
    let get_f64 = |idx: i32| -> Result<f64> {
        row.get::<f64>(idx)
            .map_err(|e| StoryloomError::Storage(e.to_string()))
    };
    Ok(GenerationRecord {
        id: get_str(row, 0)?,
        book_id: get_book_id(row, 1)?,
        model: get_str(row, 2)?,
        system_prompt: get_str(row, 3)?,
        user_prompt: get_str(row, 4)?,
        params: SamplingParams {
            top_k: get_f64(5)?,
            top_p: get_f64(6)?,
            min_p: get_f64(7)?,
            temperature: get_f64(8)?,
            repeat_penalty: get_f64(9)?,
        },
        author_id: get_str(row, 10)?,
        created_at: get_timestamp(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sl_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn new_segment(book_id: &BookId, chapter_no: u32, sequence_no: u64, text: &str) -> NewSegment {
        NewSegment {
            book_id: book_id.clone(),
            chapter_no,
            sequence_no,
            title: format!("Chapter {chapter_no}"),
            text: text.into(),
            author_id: "tester".into(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sl_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn book_crud() {
        let storage = test_storage().await;

        let book = storage
            .create_book("The Glass Harbor", "author-1")
            .await
            .expect("create book");

        let found = storage.get_book(&book.id).await.expect("get book");
        assert_eq!(found.expect("book exists").title, "The Glass Harbor");

        let books = storage.list_books().await.expect("list books");
        assert_eq!(books.len(), 1);
    }

    #[tokio::test]
    async fn segment_roundtrip() {
        let storage = test_storage().await;
        let book = storage.create_book("b", "a").await.unwrap();

        for (chapter, seq, text) in [(1, 1, "first"), (1, 2, "second"), (2, 3, "third")] {
            storage
                .insert_segment(&new_segment(&book.id, chapter, seq, text))
                .await
                .expect("insert segment");
        }

        let mut segments = storage.list_segments(&book.id).await.expect("list");
        assert_eq!(segments.len(), 3);
        segments.sort_by_key(|s| s.sequence_no);
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn duplicate_sequence_no_is_rejected() {
        let storage = test_storage().await;
        let book = storage.create_book("b", "a").await.unwrap();

        storage
            .insert_segment(&new_segment(&book.id, 1, 1, "one"))
            .await
            .expect("first insert");

        let err = storage
            .insert_segment(&new_segment(&book.id, 2, 1, "conflict"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoryloomError::Storage(_)));
    }

    #[tokio::test]
    async fn generation_record_roundtrip() {
        let storage = test_storage().await;
        let book = storage.create_book("b", "a").await.unwrap();

        let record = NewGenerationRecord {
            book_id: book.id.clone(),
            model: "moonshotai/kimi-k2.5".into(),
            system_prompt: "You are a novelist.".into(),
            user_prompt: "Continue the scene.".into(),
            params: SamplingParams {
                temperature: 1.2,
                ..SamplingParams::default()
            },
            author_id: "tester".into(),
        };
        storage
            .insert_generation_record(&record)
            .await
            .expect("insert record");

        let records = storage
            .list_generation_records(&book.id)
            .await
            .expect("list records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model, "moonshotai/kimi-k2.5");
        assert_eq!(records[0].params.temperature, 1.2);
        assert_eq!(records[0].params.top_p, 0.9);
    }

    #[tokio::test]
    async fn records_survive_independent_of_segments() {
        // The audit trail is append-only and unrelated to segment commits.
        let storage = test_storage().await;
        let book = storage.create_book("b", "a").await.unwrap();

        let record = NewGenerationRecord {
            book_id: book.id.clone(),
            model: "m".into(),
            system_prompt: String::new(),
            user_prompt: "p".into(),
            params: SamplingParams::default(),
            author_id: "tester".into(),
        };
        storage.insert_generation_record(&record).await.unwrap();

        assert!(storage.list_segments(&book.id).await.unwrap().is_empty());
        assert_eq!(
            storage.list_generation_records(&book.id).await.unwrap().len(),
            1
        );
    }
}
