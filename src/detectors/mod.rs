//! Trap and calm-state detectors
//!
//! - **levels**: recent high/low reference levels and the volume baseline
//! - **trap**: bull/bear false-breakout candidates, confirmation and scoring
//! - **stability**: debounced calm-state markers
//! - **state**: the accumulator carried across the forward scan

pub mod helpers;
pub mod levels;
pub mod stability;
pub mod state;
pub mod trap;

pub use levels::{
    recent_high, recent_low, volume_baseline, BarAnatomy, LevelContext, LevelProvider,
    LevelTracker,
};
pub use stability::StabilityDetector;
pub use state::ScanState;
pub use trap::{ScoreTerms, TrapCandidate, TrapDetector};
