pub mod assignments;
pub mod auth;
pub mod core;
pub mod homeworks;
pub mod results;
pub mod roster;
pub mod setup;
