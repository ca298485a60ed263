//! Local persistence for Hazard

mod connection;
mod migrations;
mod token_store;

pub use connection::Database;
pub use token_store::{
    ChangeTokenStore, MemoryChangeTokenStore, SqliteChangeTokenStore, DEFAULT_TOKEN_KEY,
};
