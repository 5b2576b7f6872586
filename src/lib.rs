//! # cli-unites
//!
//! Query-able project notes for teams, from the terminal.
//!
//! Notes are captured with git context (commit, branch, repository path),
//! stored either in a local SQLite database or on a hosted Postgres platform,
//! and found again by keyword or by semantic similarity.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────────┐
//! │   CLI    │──▶│  NoteStore   │──▶│ SQLite (FTS5)   │
//! │ (notes)  │   │    trait     │   │ or PostgREST    │
//! └────┬─────┘   └──────────────┘   └─────────────────┘
//!      │
//!      ▼
//! ┌──────────┐   ┌──────────────────┐
//! │ Embedder │──▶│ rank_candidates  │  (client-side cosine ranking)
//! └──────────┘   └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | JSON config file, team and auth state |
//! | [`context`] | Git context for new notes |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Local [`NoteStore`](store::NoteStore) |
//! | [`remote`] | Hosted [`NoteStore`](store::NoteStore) |
//! | [`embedding`] | Embedding providers |
//! | [`search`] | Keyword and semantic search |
//! | [`output`] | Terminal rendering |

pub mod add;
pub mod auth;
pub mod backend;
pub mod config;
pub mod context;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod get;
pub mod list;
pub mod migrate;
pub mod onboarding;
pub mod output;
pub mod remote;
pub mod search;
pub mod sqlite_store;
pub mod team;

pub use cli_unites_core::models;
pub use cli_unites_core::store;
