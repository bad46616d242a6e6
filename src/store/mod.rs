//! SQLite persistence for reviews, iterations, issues, the activity log and
//! agent mail.

pub mod db;
pub mod models;

pub use db::{DbHandle, ReviewDb};
pub use models::{
    Activity, Agent, Message, NewIteration, NewReview, Priority, Review, ReviewFilter,
    ReviewIssue, ReviewIteration,
};
