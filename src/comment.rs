use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::error::{Error, Result, ValidationError};
use crate::profile::Profile;
use crate::store::schema::comments;
use crate::store::Store;
use crate::utils::serialize_date;
use crate::viewer::ViewerContext;

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable)]
#[diesel(table_name = comments)]
pub struct Comment {
    pub id: i32,
    pub article_id: i32,
    pub user_id: i32,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment {
    pub article_id: i32,
    pub user_id: i32,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView<'a> {
    pub id: i32,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: DateTime<Utc>,
    pub body: String,
    pub author: Profile<'a>,
}

impl<'a> From<(Comment, Profile<'a>)> for CommentView<'a> {
    fn from((comment, author): (Comment, Profile<'a>)) -> Self {
        CommentView {
            id: comment.id,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            body: comment.body,
            author,
        }
    }
}

pub fn add<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    slug: &str,
    body: &str,
) -> Result<CommentView<'static>> {
    let auth = viewer.require()?;
    let article = store.article_by_slug(slug)?;
    if body.trim().is_empty() {
        return Err(ValidationError::from("body", "empty body").into());
    }
    let now = Utc::now();
    let comment = store.create_comment(NewComment {
        article_id: article.id,
        user_id: auth.user_id,
        body: body.to_string(),
        created_at: now,
        updated_at: now,
    })?;
    let author = store.user_by_id(auth.user_id)?;
    Ok((comment, author.into_profile(false)).into())
}

/// Comments in creation order, with each author's `following` flag relative
/// to the viewer. Anonymous viewers get plain projections without any
/// follow-graph lookups.
pub fn list<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    slug: &str,
) -> Result<Vec<CommentView<'static>>> {
    let article = store.article_by_slug(slug)?;
    let rows = store.comments_for_article(article.id)?;
    let mut views = Vec::with_capacity(rows.len());
    for (comment, author) in rows {
        let following = match viewer.user_id() {
            Some(viewer_id) => store.is_following(viewer_id, author.id)?,
            None => false,
        };
        views.push((comment, author.into_profile(following)).into());
    }
    Ok(views)
}

/// Deletion is authorized only to the comment's author.
pub fn delete<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    comment_id: i32,
) -> Result<()> {
    let auth = viewer.require()?;
    let comment = store.comment_by_id(comment_id)?;
    if comment.user_id != auth.user_id {
        return Err(Error::Forbidden);
    }
    store.delete_comment(comment_id)
}
