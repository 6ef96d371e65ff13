//! casesim Engine library.
//!
//! Turn processing for the case-study advisor: streaming aggregation with
//! drafts, completion and scripted fallbacks, and transcript persistence.
//!
//! ## Structure
//!
//! - `use_cases/` - Turn engine and session flows
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `app` - Application composition

pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
