//! Articles: creation and author-gated mutation, the filter & pagination
//! listing pipeline, the follow-graph feed, and the favorite counter
//! maintainer. All read paths hand their raw records to [`view_of`] so the
//! viewer-relative flags are computed in exactly one place.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use slug::slugify;

use crate::error::{Error, Result, ValidationError};
use crate::profile::Profile;
use crate::store::schema::articles;
use crate::store::{ArticleQuery, ArticleRecord, Store, DEFAULT_PAGE_SIZE};
use crate::utils::serialize_date;
use crate::viewer::ViewerContext;

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable)]
#[diesel(table_name = articles)]
pub struct Article {
    pub id: i32,
    pub author_id: i32,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Denormalized cache of the favorite-row count; see
    /// [`Store::refresh_favorites_count`].
    pub favorites_count: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = articles)]
pub struct NewArticle {
    pub author_id: i32,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub favorites_count: i64,
}

#[derive(Debug, Default)]
pub struct ArticleDraft {
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Vec<String>,
}

impl ArticleDraft {
    fn validate(&self) -> Result<()> {
        let mut errors = ValidationError::default();
        if self.title.trim().is_empty() {
            errors.add_error("title", "empty title");
        }
        if self.description.trim().is_empty() {
            errors.add_error("description", "empty description");
        }
        if self.body.trim().is_empty() {
            errors.add_error("body", "empty body");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

#[derive(Debug, Default)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleView<'a> {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Vec<String>,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: DateTime<Utc>,
    /// Falls back to `created_at` for never-updated articles.
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: DateTime<Utc>,
    pub favorited: bool,
    pub favorites_count: i64,
    pub author: Profile<'a>,
}

#[derive(Debug, Serialize)]
pub struct ArticleList<'a> {
    pub articles: Vec<ArticleView<'a>>,
    #[serde(rename = "articlesCount")]
    pub articles_count: i64,
}

/// Viewer enrichment: attaches `favorited` and `following` for the current
/// viewer without touching stored state. Anonymous viewers short-circuit to
/// false without issuing any membership lookups.
pub fn view_of<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    record: ArticleRecord,
) -> Result<ArticleView<'static>> {
    let ArticleRecord {
        article,
        author,
        tags,
    } = record;
    let (favorited, following) = match viewer {
        ViewerContext::Anonymous => (false, false),
        ViewerContext::Authenticated(auth) => (
            store.is_favorited(auth.user_id, article.id)?,
            store.is_following(auth.user_id, article.author_id)?,
        ),
    };
    Ok(ArticleView {
        slug: article.slug,
        title: article.title,
        description: article.description,
        body: article.body,
        tag_list: tags,
        created_at: article.created_at,
        updated_at: article.updated_at.unwrap_or(article.created_at),
        favorited,
        favorites_count: article.favorites_count,
        author: author.into_profile(following),
    })
}

pub fn create<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    draft: ArticleDraft,
) -> Result<ArticleView<'static>> {
    let auth = viewer.require()?;
    draft.validate()?;
    let created = Utc::now();
    let article = store.create_article(NewArticle {
        author_id: auth.user_id,
        // Prefixing the creation timestamp keeps slugs unique across articles
        // with identical titles.
        slug: created.timestamp().to_string() + "-" + &slugify(&draft.title),
        title: draft.title,
        description: draft.description,
        body: draft.body,
        created_at: created,
        updated_at: None,
        favorites_count: 0,
    })?;

    // Lazy get-or-create, preserving first-occurrence order.
    let mut tag_names: Vec<String> = Vec::new();
    for name in draft.tag_list {
        if tag_names.contains(&name) {
            continue;
        }
        let tag = store.get_or_create_tag(&name)?;
        store.tag_article(article.id, tag.id)?;
        tag_names.push(name);
    }

    let author = store.user_by_id(auth.user_id)?;
    Ok(ArticleView {
        slug: article.slug,
        title: article.title,
        description: article.description,
        body: article.body,
        tag_list: tag_names,
        created_at: article.created_at,
        updated_at: article.created_at,
        favorited: false,
        favorites_count: 0,
        author: author.into_profile(false),
    })
}

pub fn get<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    slug: &str,
) -> Result<ArticleView<'static>> {
    let record = store.article_record_by_slug(slug)?;
    view_of(store, viewer, record)
}

/// Partial update, restricted to the article's author. The slug stays stable
/// so existing links keep resolving.
pub fn update<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    slug: &str,
    changes: ArticleChanges,
) -> Result<ArticleView<'static>> {
    let auth = viewer.require()?;
    let mut article = store.article_by_slug(slug)?;
    if article.author_id != auth.user_id {
        return Err(Error::Forbidden);
    }

    let mut errors = ValidationError::default();
    if let Some(title) = changes.title {
        if title.trim().is_empty() {
            errors.add_error("title", "empty title");
        } else {
            article.title = title;
        }
    }
    if let Some(description) = changes.description {
        if description.trim().is_empty() {
            errors.add_error("description", "empty description");
        } else {
            article.description = description;
        }
    }
    if let Some(body) = changes.body {
        if body.trim().is_empty() {
            errors.add_error("body", "empty body");
        } else {
            article.body = body;
        }
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    article.updated_at = Some(Utc::now());
    store.update_article(&article)?;
    let record = store.article_record_by_slug(&article.slug)?;
    view_of(store, viewer, record)
}

pub fn delete<S: Store + ?Sized>(store: &S, viewer: &ViewerContext, slug: &str) -> Result<()> {
    let auth = viewer.require()?;
    let article = store.article_by_slug(slug)?;
    if article.author_id != auth.user_id {
        return Err(Error::Forbidden);
    }
    store.delete_article(article.id)
}

/// The filter & pagination pipeline: AND-composed optional criteria, newest
/// first, total count independent of the returned page.
pub fn list<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    query: &ArticleQuery,
) -> Result<ArticleList<'static>> {
    let page = store.list_articles(query)?;
    let mut views = Vec::with_capacity(page.articles.len());
    for record in page.articles {
        views.push(view_of(store, viewer, record)?);
    }
    Ok(ArticleList {
        articles: views,
        articles_count: page.total,
    })
}

/// Articles by authors the viewer follows. Following nobody is an empty page,
/// not an error.
pub fn feed<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<ArticleList<'static>> {
    let auth = viewer.require()?;
    let authors = store.following_ids(auth.user_id)?;
    if authors.is_empty() {
        return Ok(ArticleList {
            articles: Vec::new(),
            articles_count: 0,
        });
    }
    let page = store.feed_articles(
        &authors,
        limit.unwrap_or(DEFAULT_PAGE_SIZE),
        offset.unwrap_or(0),
    )?;
    let mut views = Vec::with_capacity(page.articles.len());
    for record in page.articles {
        views.push(view_of(store, viewer, record)?);
    }
    Ok(ArticleList {
        articles: views,
        articles_count: page.total,
    })
}

/// Favorite counter maintainer. Returns whether the pair was already
/// favorited; on an actual insert the denormalized count is recomputed from
/// the favorite rows, never incremented in place.
pub fn favorite<S: Store + ?Sized>(store: &S, article_id: i32, user_id: i32) -> Result<bool> {
    let created = store.add_favorite(user_id, article_id)?;
    if created {
        store.refresh_favorites_count(article_id)?;
    }
    Ok(!created)
}

/// Mirror image of [`favorite`]: delete-if-present, recompute only on change.
pub fn unfavorite<S: Store + ?Sized>(store: &S, article_id: i32, user_id: i32) -> Result<bool> {
    let deleted = store.remove_favorite(user_id, article_id)?;
    if deleted {
        store.refresh_favorites_count(article_id)?;
    }
    Ok(!deleted)
}

pub fn favorite_by_slug<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    slug: &str,
) -> Result<ArticleView<'static>> {
    let auth = viewer.require()?;
    let article = store.article_by_slug(slug)?;
    favorite(store, article.id, auth.user_id)?;
    let record = store.article_record_by_slug(slug)?;
    view_of(store, viewer, record)
}

pub fn unfavorite_by_slug<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    slug: &str,
) -> Result<ArticleView<'static>> {
    let auth = viewer.require()?;
    let article = store.article_by_slug(slug)?;
    unfavorite(store, article.id, auth.user_id)?;
    let record = store.article_record_by_slug(slug)?;
    view_of(store, viewer, record)
}
