//! Graph infrastructure - SQLite persistence

mod repository;

pub use repository::SqliteGraphRepository;
