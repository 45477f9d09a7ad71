//! Canonical relational schema
//!
//! The single source of truth for table and column names. The DDL, the
//! schema description sent to the language model and the SQL validator's
//! allow-list are all derived from here.

use serde::{Deserialize, Serialize};

/// SQL dialect of the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlDialect {
    Postgres,
    Sqlite,
}

impl SqlDialect {
    pub fn name(&self) -> &'static str {
        match self {
            SqlDialect::Postgres => "PostgreSQL",
            SqlDialect::Sqlite => "SQLite",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(column))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSchema {
    pub tables: Vec<TableDef>,
}

fn column(name: &str, sql_type: &str, note: Option<&str>) -> ColumnDef {
    ColumnDef {
        name: name.to_string(),
        sql_type: sql_type.to_string(),
        note: note.map(str::to_string),
    }
}

impl CanonicalSchema {
    /// The `posts` / `comments` schema every platform is projected into.
    pub fn social() -> Self {
        let posts = TableDef {
            name: "posts".to_string(),
            columns: vec![
                column("id", "INTEGER", Some("primary key")),
                column("source", "TEXT", Some("one of 'amazon', 'reddit', 'youtube'")),
                column("source_key", "TEXT", Some("unique '<source>:<original id>' ingestion key")),
                column("title", "TEXT", None),
                column("created_at", "TEXT", Some("date string 'YYYY-MM-DD'")),
                column("asin", "TEXT", Some("amazon only")),
                column("subreddit", "TEXT", Some("reddit only")),
                column("url", "TEXT", None),
                column("description", "TEXT", None),
                column("channel_name", "TEXT", Some("youtube only")),
                column("country_of_origin", "TEXT", Some("amazon only")),
                column("price", "REAL", Some("amazon only")),
                column("currency", "TEXT", Some("ISO code, e.g. 'USD'")),
                column("star_ratings", "TEXT", Some("average star rating as text, e.g. '4.5'")),
                column("total_rating", "INTEGER", Some("number of ratings")),
                column("raw_json", "TEXT", Some("original record")),
            ],
        };
        let comments = TableDef {
            name: "comments".to_string(),
            columns: vec![
                column("id", "INTEGER", Some("primary key")),
                column("post_id", "INTEGER", Some("foreign key referencing posts(id)")),
                column("author_name", "TEXT", None),
                column("content", "TEXT", None),
                column("rating", "REAL", Some("review stars, amazon only")),
                column("helpful_votes", "INTEGER", Some("amazon only")),
                column("karma", "INTEGER", Some("reddit only")),
                column("created_at", "TEXT", Some("date string 'YYYY-MM-DD'")),
                column("age_group", "TEXT", None),
                column("gender", "TEXT", None),
                column("income_band", "TEXT", None),
            ],
        };
        Self {
            tables: vec![posts, comments],
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// True when any table defines `column`.
    pub fn has_column(&self, column: &str) -> bool {
        self.tables.iter().any(|t| t.has_column(column))
    }

    /// Textual description handed to the SQL generator: names, types and
    /// dialect hints, never data.
    pub fn describe(&self, dialect: SqlDialect) -> String {
        let mut out = format!("Database dialect: {}\n\n", dialect.name());
        for table in &self.tables {
            out.push_str(&format!("TABLE {}:\n", table.name));
            for col in &table.columns {
                match &col.note {
                    Some(note) => out.push_str(&format!("  {} ({}) -- {}\n", col.name, col.sql_type, note)),
                    None => out.push_str(&format!("  {} ({})\n", col.name, col.sql_type)),
                }
            }
            out.push('\n');
        }
        out.push_str("Notes:\n");
        out.push_str("- Filter platforms with exact equality on posts.source, e.g. source = 'reddit'.\n");
        out.push_str("- Optional attributes are NULL when a platform does not provide them.\n");
        match dialect {
            SqlDialect::Postgres => out.push_str(
                "- created_at is text; cast with created_at::date for date arithmetic.\n",
            ),
            SqlDialect::Sqlite => out.push_str(
                "- created_at is text; use date(created_at) / strftime() for date arithmetic.\n",
            ),
        }
        out
    }
}

/// DDL creating both tables if they are missing.
pub fn create_statements(dialect: SqlDialect) -> &'static [&'static str] {
    match dialect {
        SqlDialect::Postgres => &[
            r#"CREATE TABLE IF NOT EXISTS posts (
                id BIGSERIAL PRIMARY KEY,
                source TEXT NOT NULL,
                source_key TEXT NOT NULL UNIQUE,
                title TEXT,
                created_at TEXT,
                asin TEXT,
                subreddit TEXT,
                url TEXT,
                description TEXT,
                channel_name TEXT,
                country_of_origin TEXT,
                price DOUBLE PRECISION,
                currency TEXT,
                star_ratings TEXT,
                total_rating BIGINT,
                raw_json TEXT
            )"#,
            r#"CREATE TABLE IF NOT EXISTS comments (
                id BIGSERIAL PRIMARY KEY,
                post_id BIGINT NOT NULL REFERENCES posts(id),
                author_name TEXT,
                content TEXT,
                rating DOUBLE PRECISION,
                helpful_votes BIGINT,
                karma BIGINT,
                created_at TEXT,
                age_group TEXT,
                gender TEXT,
                income_band TEXT
            )"#,
            "CREATE INDEX IF NOT EXISTS comments_post_id_idx ON comments (post_id)",
        ],
        SqlDialect::Sqlite => &[
            r#"CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                source_key TEXT NOT NULL UNIQUE,
                title TEXT,
                created_at TEXT,
                asin TEXT,
                subreddit TEXT,
                url TEXT,
                description TEXT,
                channel_name TEXT,
                country_of_origin TEXT,
                price REAL,
                currency TEXT,
                star_ratings TEXT,
                total_rating INTEGER,
                raw_json TEXT
            )"#,
            r#"CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES posts(id),
                author_name TEXT,
                content TEXT,
                rating REAL,
                helpful_votes INTEGER,
                karma INTEGER,
                created_at TEXT,
                age_group TEXT,
                gender TEXT,
                income_band TEXT
            )"#,
            "CREATE INDEX IF NOT EXISTS comments_post_id_idx ON comments (post_id)",
        ],
    }
}

pub(crate) const INSERT_POST_COLUMNS: &str = "source, source_key, title, created_at, asin, subreddit, url, description, \
     channel_name, country_of_origin, price, currency, star_ratings, total_rating, raw_json";

pub(crate) const INSERT_COMMENT_COLUMNS: &str = "post_id, author_name, content, rating, helpful_votes, karma, \
     created_at, age_group, gender, income_band";
