//! Viewer-aware content aggregation core for a realworld-style blogging
//! platform.
//!
//! The crate turns stored entities (articles, tags, favorites, follow edges,
//! comments) into response views that are correct relative to the requester:
//! which articles they favorited, which authors they follow, their
//! personalized feed, and a consistently maintained favorite counter. HTTP
//! routing, request marshaling and the database itself are external
//! collaborators; the boundary is the [`store::Store`] trait on one side and
//! the [`auth::AuthResolver`] producing a [`ViewerContext`] on the other.

pub mod article;
pub mod auth;
pub mod comment;
pub mod error;
pub mod profile;
pub mod store;
pub mod tag;
pub mod users;
mod utils;
pub mod viewer;

pub use error::{Error, Result, ValidationError};
pub use viewer::{AuthUser, ViewerContext};
