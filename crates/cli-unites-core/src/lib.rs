//! # cli-unites core
//!
//! Shared, I/O-free logic for cli-unites: note models, the [`store::NoteStore`]
//! abstraction, embedding helpers, and the similarity ranking function.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem access. The
//! `cli-unites` app crate supplies the SQLite and hosted backends, the
//! network embedding providers, and the command layer.

pub mod embedding;
pub mod models;
pub mod search;
pub mod store;

pub use search::{rank_candidates, Candidate, InvalidVectorError, RankParams, Ranked};
