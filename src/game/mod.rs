pub mod cards;
pub mod scoring;
pub mod state;
pub mod actions;
