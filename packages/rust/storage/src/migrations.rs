//! SQL migration definitions for the Storyloom library database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: books, segments, generation_records",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Books
CREATE TABLE IF NOT EXISTS books (
    id         TEXT PRIMARY KEY,
    title      TEXT NOT NULL,
    author_id  TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Committed prose segments. sequence_no is book-wide and strictly
-- increasing in commit order; the unique index is the backstop for the
-- ordering invariant.
CREATE TABLE IF NOT EXISTS segments (
    id          TEXT PRIMARY KEY,
    book_id     TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    chapter_no  INTEGER NOT NULL,
    sequence_no INTEGER NOT NULL,
    title       TEXT NOT NULL,
    text        TEXT NOT NULL,
    author_id   TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE(book_id, sequence_no)
);

CREATE INDEX IF NOT EXISTS idx_segments_book_id ON segments(book_id);

-- Append-only audit trail of generation sessions
CREATE TABLE IF NOT EXISTS generation_records (
    id             TEXT PRIMARY KEY,
    book_id        TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    model          TEXT NOT NULL,
    system_prompt  TEXT NOT NULL,
    user_prompt    TEXT NOT NULL,
    top_k          REAL NOT NULL,
    top_p          REAL NOT NULL,
    min_p          REAL NOT NULL,
    temperature    REAL NOT NULL,
    repeat_penalty REAL NOT NULL,
    author_id      TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_generation_records_book_id ON generation_records(book_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
