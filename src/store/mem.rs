//! In-memory [`Store`] binding.
//!
//! Backs the test suite and mirrors the Postgres binding's contract exactly:
//! unique constraints (reported as diesel unique violations), newest-first
//! ordering with descending-id tiebreak, count-before-pagination, and a
//! favorite counter refreshed atomically under one lock scope. It also counts
//! viewer membership checks so tests can assert that anonymous enrichment
//! issues none.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{ArticlePage, ArticleQuery, ArticleRecord, Store};
use crate::article::{Article, NewArticle};
use crate::comment::{Comment, NewComment};
use crate::error::{Error, Result};
use crate::tag::Tag;
use crate::users::models::{NewUser, User};

#[derive(Debug, Clone)]
struct TagLink {
    id: i32,
    article_id: i32,
    tag_id: i32,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    articles: Vec<Article>,
    tags: Vec<Tag>,
    article_tags: Vec<TagLink>,
    /// (user_id, article_id)
    favorites: Vec<(i32, i32)>,
    /// (follower_id, followed_id)
    follows: Vec<(i32, i32)>,
    comments: Vec<Comment>,
    next_user_id: i32,
    next_article_id: i32,
    next_tag_id: i32,
    next_link_id: i32,
    next_comment_id: i32,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
    membership_checks: AtomicUsize,
}

fn unique_violation() -> Error {
    Error::Store(DieselError::DatabaseError(
        DatabaseErrorKind::UniqueViolation,
        Box::new("duplicate key value violates unique constraint".to_string()),
    ))
}

fn next(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }

    /// Number of per-viewer membership lookups (`is_favorited` plus
    /// `is_following`) issued so far.
    pub fn membership_checks(&self) -> usize {
        self.membership_checks.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a test already panicked; propagate.
        self.inner.lock().unwrap()
    }
}

fn matches(inner: &Inner, article: &Article, query: &ArticleQuery) -> bool {
    if let Some(tag) = query.tag.as_deref() {
        let tag_id = inner.tags.iter().find(|t| t.name == tag).map(|t| t.id);
        let tagged = tag_id.map_or(false, |tid| {
            inner
                .article_tags
                .iter()
                .any(|link| link.article_id == article.id && link.tag_id == tid)
        });
        if !tagged {
            return false;
        }
    }
    if let Some(author) = query.author.as_deref() {
        let by_author = inner
            .users
            .iter()
            .any(|u| u.id == article.author_id && u.username == author);
        if !by_author {
            return false;
        }
    }
    if let Some(fan) = query.favorited_by.as_deref() {
        let fan_id = inner.users.iter().find(|u| u.username == fan).map(|u| u.id);
        let favorited = fan_id.map_or(false, |uid| {
            inner
                .favorites
                .iter()
                .any(|&(user, art)| user == uid && art == article.id)
        });
        if !favorited {
            return false;
        }
    }
    true
}

/// Newest-created first, descending id as tiebreak.
fn sort_newest_first(rows: &mut [Article]) {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

fn assemble(inner: &Inner, rows: Vec<Article>) -> Result<Vec<ArticleRecord>> {
    let mut records = Vec::with_capacity(rows.len());
    for article in rows {
        let author = inner
            .users
            .iter()
            .find(|u| u.id == article.author_id)
            .cloned()
            .ok_or(Error::NotFound)?;
        let tags = tag_names(inner, article.id);
        records.push(ArticleRecord {
            article,
            author,
            tags,
        });
    }
    Ok(records)
}

fn tag_names(inner: &Inner, article_id: i32) -> Vec<String> {
    let mut links: Vec<&TagLink> = inner
        .article_tags
        .iter()
        .filter(|link| link.article_id == article_id)
        .collect();
    links.sort_by_key(|link| link.id);
    links
        .iter()
        .filter_map(|link| {
            inner
                .tags
                .iter()
                .find(|t| t.id == link.tag_id)
                .map(|t| t.name.clone())
        })
        .collect()
}

fn paginate(mut rows: Vec<Article>, limit: i64, offset: i64) -> (Vec<Article>, i64) {
    let total = rows.len() as i64;
    sort_newest_first(&mut rows);
    let page = rows
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect();
    (page, total)
}

impl Store for MemStore {
    fn create_user(&self, user: NewUser) -> Result<User> {
        let mut inner = self.lock();
        if inner
            .users
            .iter()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(unique_violation());
        }
        let id = next(&mut inner.next_user_id);
        let user = User {
            id,
            username: user.username,
            email: user.email,
            password: user.password,
            bio: None,
            image: None,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    fn user_by_id(&self, id: i32) -> Result<User> {
        let inner = self.lock();
        inner
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    fn user_by_email(&self, email: &str) -> Result<User> {
        let inner = self.lock();
        inner
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(Error::NotFound)
    }

    fn user_by_username(&self, username: &str) -> Result<User> {
        let inner = self.lock();
        inner
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(Error::NotFound)
    }

    fn email_taken(&self, email: &str, exclude: Option<i32>) -> Result<bool> {
        let inner = self.lock();
        Ok(inner
            .users
            .iter()
            .any(|u| u.email == email && Some(u.id) != exclude))
    }

    fn username_taken(&self, username: &str, exclude: Option<i32>) -> Result<bool> {
        let inner = self.lock();
        Ok(inner
            .users
            .iter()
            .any(|u| u.username == username && Some(u.id) != exclude))
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let mut inner = self.lock();
        let stored = inner
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or(Error::NotFound)?;
        stored.username = user.username.clone();
        stored.email = user.email.clone();
        stored.password = user.password.clone();
        stored.bio = user.bio.clone();
        stored.image = user.image.clone();
        Ok(())
    }

    fn is_following(&self, follower_id: i32, followed_id: i32) -> Result<bool> {
        self.membership_checks.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock();
        Ok(inner
            .follows
            .iter()
            .any(|&(follower, followed)| follower == follower_id && followed == followed_id))
    }

    fn add_follow(&self, follower_id: i32, followed_id: i32) -> Result<bool> {
        let mut inner = self.lock();
        if inner
            .follows
            .iter()
            .any(|&(follower, followed)| follower == follower_id && followed == followed_id)
        {
            return Ok(false);
        }
        inner.follows.push((follower_id, followed_id));
        Ok(true)
    }

    fn remove_follow(&self, follower_id: i32, followed_id: i32) -> Result<bool> {
        let mut inner = self.lock();
        let before = inner.follows.len();
        inner
            .follows
            .retain(|&(follower, followed)| !(follower == follower_id && followed == followed_id));
        Ok(inner.follows.len() < before)
    }

    fn following_ids(&self, follower_id: i32) -> Result<Vec<i32>> {
        let inner = self.lock();
        Ok(inner
            .follows
            .iter()
            .filter(|&&(follower, _)| follower == follower_id)
            .map(|&(_, followed)| followed)
            .collect())
    }

    fn create_article(&self, article: NewArticle) -> Result<Article> {
        let mut inner = self.lock();
        if inner.articles.iter().any(|a| a.slug == article.slug) {
            return Err(unique_violation());
        }
        let id = next(&mut inner.next_article_id);
        let article = Article {
            id,
            author_id: article.author_id,
            slug: article.slug,
            title: article.title,
            description: article.description,
            body: article.body,
            created_at: article.created_at,
            updated_at: article.updated_at,
            favorites_count: article.favorites_count,
        };
        inner.articles.push(article.clone());
        Ok(article)
    }

    fn article_by_slug(&self, slug: &str) -> Result<Article> {
        let inner = self.lock();
        inner
            .articles
            .iter()
            .find(|a| a.slug == slug)
            .cloned()
            .ok_or(Error::NotFound)
    }

    fn article_record_by_slug(&self, slug: &str) -> Result<ArticleRecord> {
        let inner = self.lock();
        let article = inner
            .articles
            .iter()
            .find(|a| a.slug == slug)
            .cloned()
            .ok_or(Error::NotFound)?;
        let mut records = assemble(&inner, vec![article])?;
        Ok(records.remove(0))
    }

    fn update_article(&self, article: &Article) -> Result<()> {
        let mut inner = self.lock();
        let stored = inner
            .articles
            .iter_mut()
            .find(|a| a.id == article.id)
            .ok_or(Error::NotFound)?;
        // Author-editable fields only; favorites_count is owned by
        // refresh_favorites_count.
        stored.title = article.title.clone();
        stored.description = article.description.clone();
        stored.body = article.body.clone();
        stored.updated_at = article.updated_at;
        Ok(())
    }

    fn delete_article(&self, article_id: i32) -> Result<()> {
        let mut inner = self.lock();
        let before = inner.articles.len();
        inner.articles.retain(|a| a.id != article_id);
        if inner.articles.len() == before {
            return Err(Error::NotFound);
        }
        // Orphan-clean the join rows and owned comments.
        inner.favorites.retain(|&(_, art)| art != article_id);
        inner.article_tags.retain(|link| link.article_id != article_id);
        inner.comments.retain(|c| c.article_id != article_id);
        Ok(())
    }

    fn list_articles(&self, query: &ArticleQuery) -> Result<ArticlePage> {
        let inner = self.lock();
        let rows: Vec<Article> = inner
            .articles
            .iter()
            .filter(|a| matches(&inner, a, query))
            .cloned()
            .collect();
        let (page, total) = paginate(rows, query.limit(), query.offset());
        Ok(ArticlePage {
            articles: assemble(&inner, page)?,
            total,
        })
    }

    fn feed_articles(&self, author_ids: &[i32], limit: i64, offset: i64) -> Result<ArticlePage> {
        let inner = self.lock();
        let rows: Vec<Article> = inner
            .articles
            .iter()
            .filter(|a| author_ids.contains(&a.author_id))
            .cloned()
            .collect();
        let (page, total) = paginate(rows, limit, offset);
        Ok(ArticlePage {
            articles: assemble(&inner, page)?,
            total,
        })
    }

    fn is_favorited(&self, user_id: i32, article_id: i32) -> Result<bool> {
        self.membership_checks.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock();
        Ok(inner
            .favorites
            .iter()
            .any(|&(user, art)| user == user_id && art == article_id))
    }

    fn add_favorite(&self, user_id: i32, article_id: i32) -> Result<bool> {
        let mut inner = self.lock();
        if inner
            .favorites
            .iter()
            .any(|&(user, art)| user == user_id && art == article_id)
        {
            return Ok(false);
        }
        inner.favorites.push((user_id, article_id));
        Ok(true)
    }

    fn remove_favorite(&self, user_id: i32, article_id: i32) -> Result<bool> {
        let mut inner = self.lock();
        let before = inner.favorites.len();
        inner
            .favorites
            .retain(|&(user, art)| !(user == user_id && art == article_id));
        Ok(inner.favorites.len() < before)
    }

    fn refresh_favorites_count(&self, article_id: i32) -> Result<i64> {
        // Recount and persist under one lock scope.
        let mut inner = self.lock();
        let count = inner
            .favorites
            .iter()
            .filter(|&&(_, art)| art == article_id)
            .count() as i64;
        let article = inner
            .articles
            .iter_mut()
            .find(|a| a.id == article_id)
            .ok_or(Error::NotFound)?;
        article.favorites_count = count;
        Ok(count)
    }

    fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
        let mut inner = self.lock();
        if let Some(tag) = inner.tags.iter().find(|t| t.name == name) {
            return Ok(tag.clone());
        }
        let id = next(&mut inner.next_tag_id);
        let tag = Tag {
            id,
            name: name.to_string(),
        };
        inner.tags.push(tag.clone());
        Ok(tag)
    }

    fn tag_article(&self, article_id: i32, tag_id: i32) -> Result<()> {
        let mut inner = self.lock();
        if inner
            .article_tags
            .iter()
            .any(|link| link.article_id == article_id && link.tag_id == tag_id)
        {
            return Ok(());
        }
        let id = next(&mut inner.next_link_id);
        inner.article_tags.push(TagLink {
            id,
            article_id,
            tag_id,
        });
        Ok(())
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        let inner = self.lock();
        Ok(inner.tags.iter().map(|t| t.name.clone()).collect())
    }

    fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        let mut inner = self.lock();
        let id = next(&mut inner.next_comment_id);
        let comment = Comment {
            id,
            article_id: comment.article_id,
            user_id: comment.user_id,
            body: comment.body,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        };
        inner.comments.push(comment.clone());
        Ok(comment)
    }

    fn comment_by_id(&self, id: i32) -> Result<Comment> {
        let inner = self.lock();
        inner
            .comments
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    fn comments_for_article(&self, article_id: i32) -> Result<Vec<(Comment, User)>> {
        let inner = self.lock();
        let mut rows = Vec::new();
        for comment in inner.comments.iter().filter(|c| c.article_id == article_id) {
            let author = inner
                .users
                .iter()
                .find(|u| u.id == comment.user_id)
                .cloned()
                .ok_or(Error::NotFound)?;
            rows.push((comment.clone(), author));
        }
        rows.sort_by_key(|(comment, _)| comment.id);
        Ok(rows)
    }

    fn delete_comment(&self, id: i32) -> Result<()> {
        let mut inner = self.lock();
        let before = inner.comments.len();
        inner.comments.retain(|c| c.id != id);
        if inner.comments.len() == before {
            return Err(Error::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn user(store: &MemStore, name: &str) -> User {
        store
            .create_user(NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password: "secret-hash".to_string(),
            })
            .unwrap()
    }

    fn article(store: &MemStore, author_id: i32, slug: &str, age_hours: i64) -> Article {
        store
            .create_article(NewArticle {
                author_id,
                slug: slug.to_string(),
                title: slug.to_string(),
                description: "d".to_string(),
                body: "b".to_string(),
                created_at: Utc::now() - Duration::hours(age_hours),
                updated_at: None,
                favorites_count: 0,
            })
            .unwrap()
    }

    #[test]
    fn duplicate_username_is_a_unique_violation() {
        let store = MemStore::new();
        user(&store, "anna");
        let err = store
            .create_user(NewUser {
                username: "anna".to_string(),
                email: "other@example.com".to_string(),
                password: String::new(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Store(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _
            ))
        ));
    }

    #[test]
    fn listing_orders_newest_first_with_id_tiebreak() {
        let store = MemStore::new();
        let anna = user(&store, "anna");
        let old = article(&store, anna.id, "old", 48);
        let newer = article(&store, anna.id, "newer", 1);
        let newest = article(&store, anna.id, "newest", 0);
        let page = store.list_articles(&ArticleQuery::default()).unwrap();
        let ids: Vec<i32> = page.articles.iter().map(|r| r.article.id).collect();
        assert_eq!(ids, vec![newest.id, newer.id, old.id]);
        assert_eq!(page.total, 3);
    }

    #[test]
    fn total_ignores_pagination() {
        let store = MemStore::new();
        let anna = user(&store, "anna");
        for n in 0..5 {
            article(&store, anna.id, &format!("a{}", n), n);
        }
        let page = store
            .list_articles(&ArticleQuery {
                limit: Some(2),
                offset: Some(4),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.articles.len(), 1);
        assert_eq!(page.total, 5);
    }
}
