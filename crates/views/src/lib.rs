//! Read-side aggregation views (spec.md §4.G): leaderboard, per-run
//! scorecard, and run-to-run comparison, all pure functions over `store`
//! query results so `server` handlers stay thin.

mod assertions;
mod compare;
mod leaderboard;
mod scorecard;
mod stats;

pub use compare::{compare, Comparison, Verdict};
pub use leaderboard::leaderboard;
pub use scorecard::scorecard;
pub use stats::CarScorecard;
