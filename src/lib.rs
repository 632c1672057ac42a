/// YachtLife syndicate backend core
///
/// Apple Sign-In identity token verification with a cached Apple key set,
/// and booking-aware logbook entry classification, over a SQLite store.

pub mod account;
pub mod apple;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logbook;
pub mod telemetry;

pub use context::AppContext;
pub use error::{AppError, AppResult};
