//! # seedsync
//!
//! Reconciles tabular CSV seed files against collections in a document
//! store, producing idempotent upserts, field-shape normalization, and
//! pruning of stale documents.
//!
//! Source files are hand-maintained spreadsheets whose column headers
//! drift between exports; seedsync fuzzily maps those headers onto a
//! canonical logical schema, normalizes heterogeneous cell values
//! (lists, booleans, numbers, identifiers), derives stable store-safe
//! document keys, and commits batched merge-upserts, guaranteeing
//! at-most-one-document-per-logical-key and safe re-runnability.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────────────────┐   ┌───────────┐
//! │ CSV files │──▶│ Resolve + Normalize +   │──▶│ Document  │
//! │ (headers  │   │ Project → batch upserts │   │ store     │
//! │  drift)   │   │ (→ prune, field-strip)  │   │ SQLite/mem│
//! └───────────┘   └─────────────────────────┘   └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`csvio`] | CSV loading into BOM-stripped source rows |
//! | [`normalize`] | Pure cell-value normalizers |
//! | [`schema`] | Entity types and the logical-field alias registry |
//! | [`resolve`] | Header → logical-field resolution |
//! | [`ident`] | Store-safe key derivation and collision tracking |
//! | [`project`] | Source rows → canonical documents |
//! | [`reconcile`] | The reconciliation driver (sync/reset/prune/strict) |
//! | [`backup`] | Pre-mutation collection snapshots |
//! | [`rekey`] | Report key migration (create-then-delete) |
//! | [`store`] | Document-store trait and backends |
//! | [`get`] | Store inspection |

pub mod backup;
pub mod config;
pub mod csvio;
pub mod get;
pub mod ident;
pub mod normalize;
pub mod project;
pub mod reconcile;
pub mod rekey;
pub mod resolve;
pub mod schema;
pub mod store;
