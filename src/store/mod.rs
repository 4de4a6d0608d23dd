//! Abstract persistence boundary of the core.
//!
//! The aggregation engine issues declarative queries through the [`Store`]
//! trait and never talks to a database driver directly. Two bindings ship with
//! the crate: [`pg::PgStore`] over Diesel/Postgres for production and
//! [`mem::MemStore`] for the test suite.

pub mod mem;
pub mod pg;
pub mod schema;

use crate::article::{Article, NewArticle};
use crate::comment::{Comment, NewComment};
use crate::error::Result;
use crate::tag::Tag;
use crate::users::models::{NewUser, User};

pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Listing criteria for the filter & pagination pipeline. All criteria are
/// independently optional and AND-composed.
#[derive(Debug, Default, Clone)]
pub struct ArticleQuery {
    /// Article must carry a tag with this exact name.
    pub tag: Option<String>,
    /// Author username must equal this value.
    pub author: Option<String>,
    /// Article must be favorited by the user with this username. An unknown
    /// username yields an empty result set, not an error.
    pub favorited_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ArticleQuery {
    /// Effective page size; defaults to 20, no upper bound.
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(0)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Raw article projection as it comes out of the store: the row itself, its
/// author and its tag names in insertion order. Viewer-relative flags are
/// attached later by enrichment, never here.
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    pub article: Article,
    pub author: User,
    pub tags: Vec<String>,
}

/// One page of records plus the total count matching the same predicate,
/// computed before limit/offset were applied.
#[derive(Debug)]
pub struct ArticlePage {
    pub articles: Vec<ArticleRecord>,
    pub total: i64,
}

/// Entity CRUD and the filtered-query primitives the core composes. Every
/// binding must uphold:
///
/// - `list_articles`/`feed_articles` order newest-created first, ties broken
///   by descending id, and derive page and `total` from one predicate.
/// - `add_favorite`/`add_follow` are insert-if-absent under the pair
///   uniqueness constraint and report whether a row was created.
/// - `refresh_favorites_count` recomputes the denormalized counter from the
///   favorite rows and persists it as a single atomic unit per article.
/// - `get_or_create_tag` never duplicates a name; a lost creation race is
///   recovered by fetching the existing row.
/// - `update_article` persists the author-editable fields only; the favorite
///   counter is owned by `refresh_favorites_count`.
pub trait Store: Send + Sync {
    // Users
    fn create_user(&self, user: NewUser) -> Result<User>;
    fn user_by_id(&self, id: i32) -> Result<User>;
    fn user_by_email(&self, email: &str) -> Result<User>;
    fn user_by_username(&self, username: &str) -> Result<User>;
    fn email_taken(&self, email: &str, exclude: Option<i32>) -> Result<bool>;
    fn username_taken(&self, username: &str, exclude: Option<i32>) -> Result<bool>;
    fn update_user(&self, user: &User) -> Result<()>;

    // Follow graph
    fn is_following(&self, follower_id: i32, followed_id: i32) -> Result<bool>;
    fn add_follow(&self, follower_id: i32, followed_id: i32) -> Result<bool>;
    fn remove_follow(&self, follower_id: i32, followed_id: i32) -> Result<bool>;
    fn following_ids(&self, follower_id: i32) -> Result<Vec<i32>>;

    // Articles
    fn create_article(&self, article: NewArticle) -> Result<Article>;
    fn article_by_slug(&self, slug: &str) -> Result<Article>;
    fn article_record_by_slug(&self, slug: &str) -> Result<ArticleRecord>;
    fn update_article(&self, article: &Article) -> Result<()>;
    fn delete_article(&self, article_id: i32) -> Result<()>;
    fn list_articles(&self, query: &ArticleQuery) -> Result<ArticlePage>;
    fn feed_articles(&self, author_ids: &[i32], limit: i64, offset: i64) -> Result<ArticlePage>;

    // Favorites
    fn is_favorited(&self, user_id: i32, article_id: i32) -> Result<bool>;
    fn add_favorite(&self, user_id: i32, article_id: i32) -> Result<bool>;
    fn remove_favorite(&self, user_id: i32, article_id: i32) -> Result<bool>;
    fn refresh_favorites_count(&self, article_id: i32) -> Result<i64>;

    // Tags
    fn get_or_create_tag(&self, name: &str) -> Result<Tag>;
    fn tag_article(&self, article_id: i32, tag_id: i32) -> Result<()>;
    fn list_tags(&self) -> Result<Vec<String>>;

    // Comments
    fn create_comment(&self, comment: NewComment) -> Result<Comment>;
    fn comment_by_id(&self, id: i32) -> Result<Comment>;
    fn comments_for_article(&self, article_id: i32) -> Result<Vec<(Comment, User)>>;
    fn delete_comment(&self, id: i32) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_defaults() {
        let query = ArticleQuery::default();
        assert_eq!(query.limit(), 20);
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn negative_paging_is_clamped() {
        let query = ArticleQuery {
            limit: Some(-5),
            offset: Some(-1),
            ..Default::default()
        };
        assert_eq!(query.limit(), 0);
        assert_eq!(query.offset(), 0);
    }
}
