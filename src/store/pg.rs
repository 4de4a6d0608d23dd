//! Diesel/Postgres binding of the [`Store`] trait.
//!
//! Pair uniqueness for favorites, follows and tag names is enforced by unique
//! constraints; the favorite counter is recomputed in a single UPDATE from the
//! authoritative rows so concurrent toggles on one article cannot leave it
//! diverged.

use diesel::dsl::{count_star, exists};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool as R2d2Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::Integer;
use diesel::{delete, insert_into, select, sql_query, update};
use std::env;
use tracing::{debug, warn};

use super::schema::{article_tags, articles, comments, favorites, follows, tags, users};
use super::{ArticlePage, ArticleQuery, ArticleRecord, Store};
use crate::article::{Article, NewArticle};
use crate::comment::{Comment, NewComment};
use crate::error::{Error, Result};
use crate::tag::Tag;
use crate::users::models::{NewUser, User};

pub type Pool = R2d2Pool<ConnectionManager<PgConnection>>;
type PooledPg = PooledConnection<ConnectionManager<PgConnection>>;

pub fn init_pool() -> Result<Pool> {
    dotenvy::dotenv().ok();
    let database_url = env::var("DATABASE_URL").map_err(|_| Error::Internal)?;
    debug!("initializing postgres connection pool");
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    R2d2Pool::builder().build(manager).map_err(|_| Error::Internal)
}

pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        PgStore { pool }
    }

    pub fn from_env() -> Result<Self> {
        Ok(PgStore::new(init_pool()?))
    }

    fn conn(&self) -> Result<PooledPg> {
        self.pool.get().map_err(|_| Error::Internal)
    }

    fn assemble(&self, conn: &mut PooledPg, rows: Vec<Article>) -> Result<Vec<ArticleRecord>> {
        let mut records = Vec::with_capacity(rows.len());
        for article in rows {
            let author = users::table.find(article.author_id).first::<User>(conn)?;
            let tags = tag_names_of(conn, article.id)?;
            records.push(ArticleRecord {
                article,
                author,
                tags,
            });
        }
        Ok(records)
    }
}

fn tag_names_of(conn: &mut PooledPg, article_id: i32) -> Result<Vec<String>> {
    // article_tags row id preserves the order tags were attached in.
    let names = article_tags::table
        .inner_join(tags::table)
        .filter(article_tags::article_id.eq(article_id))
        .order(article_tags::id.asc())
        .select(tags::name)
        .load::<String>(conn)?;
    Ok(names)
}

/// Applies the listing criteria to a boxed articles query. A macro rather
/// than a function so the exact same predicate feeds both the page query and
/// the count query, whatever their select clause.
macro_rules! article_filters {
    ($query:expr, $criteria:expr) => {{
        let criteria = $criteria;
        let mut query = $query;
        if let Some(tag) = criteria.tag.as_deref() {
            let tag_ids = tags::table.filter(tags::name.eq(tag)).select(tags::id);
            let tagged = article_tags::table
                .filter(article_tags::tag_id.eq_any(tag_ids))
                .select(article_tags::article_id);
            query = query.filter(articles::id.eq_any(tagged));
        }
        if let Some(author) = criteria.author.as_deref() {
            let author_ids = users::table
                .filter(users::username.eq(author))
                .select(users::id);
            query = query.filter(articles::author_id.eq_any(author_ids));
        }
        if let Some(username) = criteria.favorited_by.as_deref() {
            // An unknown username resolves to an empty id set and therefore an
            // empty page, not an error.
            let fan_ids = users::table
                .filter(users::username.eq(username))
                .select(users::id);
            let favorited = favorites::table
                .filter(favorites::user_id.eq_any(fan_ids))
                .select(favorites::article_id);
            query = query.filter(articles::id.eq_any(favorited));
        }
        query
    }};
}

impl Store for PgStore {
    fn create_user(&self, user: NewUser) -> Result<User> {
        let mut conn = self.conn()?;
        let user = insert_into(users::table)
            .values(&user)
            .get_result::<User>(&mut conn)?;
        Ok(user)
    }

    fn user_by_id(&self, id: i32) -> Result<User> {
        let mut conn = self.conn()?;
        Ok(users::table.find(id).first::<User>(&mut conn)?)
    }

    fn user_by_email(&self, email: &str) -> Result<User> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::email.eq(email))
            .first::<User>(&mut conn)?)
    }

    fn user_by_username(&self, username: &str) -> Result<User> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::username.eq(username))
            .first::<User>(&mut conn)?)
    }

    fn email_taken(&self, email: &str, exclude: Option<i32>) -> Result<bool> {
        let mut conn = self.conn()?;
        let taken = match exclude {
            Some(id) => select(exists(
                users::table
                    .filter(users::email.eq(email))
                    .filter(users::id.ne(id)),
            ))
            .get_result::<bool>(&mut conn)?,
            None => select(exists(users::table.filter(users::email.eq(email))))
                .get_result::<bool>(&mut conn)?,
        };
        Ok(taken)
    }

    fn username_taken(&self, username: &str, exclude: Option<i32>) -> Result<bool> {
        let mut conn = self.conn()?;
        let taken = match exclude {
            Some(id) => select(exists(
                users::table
                    .filter(users::username.eq(username))
                    .filter(users::id.ne(id)),
            ))
            .get_result::<bool>(&mut conn)?,
            None => select(exists(users::table.filter(users::username.eq(username))))
                .get_result::<bool>(&mut conn)?,
        };
        Ok(taken)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let mut conn = self.conn()?;
        update(users::table.find(user.id))
            .set((
                users::username.eq(&user.username),
                users::email.eq(&user.email),
                users::password.eq(&user.password),
                users::bio.eq(user.bio.as_deref()),
                users::image.eq(user.image.as_deref()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn is_following(&self, follower_id: i32, followed_id: i32) -> Result<bool> {
        let mut conn = self.conn()?;
        let following = select(exists(
            follows::table
                .filter(follows::follower_id.eq(follower_id))
                .filter(follows::followed_id.eq(followed_id)),
        ))
        .get_result::<bool>(&mut conn)?;
        Ok(following)
    }

    fn add_follow(&self, follower_id: i32, followed_id: i32) -> Result<bool> {
        let mut conn = self.conn()?;
        let created = insert_into(follows::table)
            .values((
                follows::follower_id.eq(follower_id),
                follows::followed_id.eq(followed_id),
            ))
            .on_conflict((follows::follower_id, follows::followed_id))
            .do_nothing()
            .execute(&mut conn)?;
        Ok(created > 0)
    }

    fn remove_follow(&self, follower_id: i32, followed_id: i32) -> Result<bool> {
        let mut conn = self.conn()?;
        let deleted = delete(
            follows::table
                .filter(follows::follower_id.eq(follower_id))
                .filter(follows::followed_id.eq(followed_id)),
        )
        .execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn following_ids(&self, follower_id: i32) -> Result<Vec<i32>> {
        let mut conn = self.conn()?;
        let ids = follows::table
            .filter(follows::follower_id.eq(follower_id))
            .select(follows::followed_id)
            .load::<i32>(&mut conn)?;
        Ok(ids)
    }

    fn create_article(&self, article: NewArticle) -> Result<Article> {
        let mut conn = self.conn()?;
        let article = insert_into(articles::table)
            .values(&article)
            .get_result::<Article>(&mut conn)?;
        Ok(article)
    }

    fn article_by_slug(&self, slug: &str) -> Result<Article> {
        let mut conn = self.conn()?;
        Ok(articles::table
            .filter(articles::slug.eq(slug))
            .first::<Article>(&mut conn)?)
    }

    fn article_record_by_slug(&self, slug: &str) -> Result<ArticleRecord> {
        let mut conn = self.conn()?;
        let article = articles::table
            .filter(articles::slug.eq(slug))
            .first::<Article>(&mut conn)?;
        let author = users::table
            .find(article.author_id)
            .first::<User>(&mut conn)?;
        let tags = tag_names_of(&mut conn, article.id)?;
        Ok(ArticleRecord {
            article,
            author,
            tags,
        })
    }

    fn update_article(&self, article: &Article) -> Result<()> {
        let mut conn = self.conn()?;
        update(articles::table.find(article.id))
            .set((
                articles::title.eq(&article.title),
                articles::description.eq(&article.description),
                articles::body.eq(&article.body),
                articles::updated_at.eq(article.updated_at),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn delete_article(&self, article_id: i32) -> Result<()> {
        let mut conn = self.conn()?;
        conn.transaction::<_, DieselError, _>(|conn| {
            delete(favorites::table.filter(favorites::article_id.eq(article_id)))
                .execute(conn)?;
            delete(article_tags::table.filter(article_tags::article_id.eq(article_id)))
                .execute(conn)?;
            delete(comments::table.filter(comments::article_id.eq(article_id))).execute(conn)?;
            delete(articles::table.find(article_id)).execute(conn)?;
            Ok(())
        })?;
        Ok(())
    }

    fn list_articles(&self, query: &ArticleQuery) -> Result<ArticlePage> {
        let mut conn = self.conn()?;
        let total: i64 =
            article_filters!(articles::table.select(count_star()).into_boxed(), query)
                .get_result(&mut conn)?;
        let rows = article_filters!(articles::table.into_boxed(), query)
            .order((articles::created_at.desc(), articles::id.desc()))
            .limit(query.limit())
            .offset(query.offset())
            .load::<Article>(&mut conn)?;
        let articles = self.assemble(&mut conn, rows)?;
        Ok(ArticlePage { articles, total })
    }

    fn feed_articles(&self, author_ids: &[i32], limit: i64, offset: i64) -> Result<ArticlePage> {
        let mut conn = self.conn()?;
        let total: i64 = articles::table
            .filter(articles::author_id.eq_any(author_ids))
            .count()
            .get_result(&mut conn)?;
        let rows = articles::table
            .filter(articles::author_id.eq_any(author_ids))
            .order((articles::created_at.desc(), articles::id.desc()))
            .limit(limit.max(0))
            .offset(offset.max(0))
            .load::<Article>(&mut conn)?;
        let articles = self.assemble(&mut conn, rows)?;
        Ok(ArticlePage { articles, total })
    }

    fn is_favorited(&self, user_id: i32, article_id: i32) -> Result<bool> {
        let mut conn = self.conn()?;
        let favorited = select(exists(
            favorites::table
                .filter(favorites::user_id.eq(user_id))
                .filter(favorites::article_id.eq(article_id)),
        ))
        .get_result::<bool>(&mut conn)?;
        Ok(favorited)
    }

    fn add_favorite(&self, user_id: i32, article_id: i32) -> Result<bool> {
        let mut conn = self.conn()?;
        let created = insert_into(favorites::table)
            .values((
                favorites::user_id.eq(user_id),
                favorites::article_id.eq(article_id),
            ))
            .on_conflict((favorites::user_id, favorites::article_id))
            .do_nothing()
            .execute(&mut conn)?;
        Ok(created > 0)
    }

    fn remove_favorite(&self, user_id: i32, article_id: i32) -> Result<bool> {
        let mut conn = self.conn()?;
        let deleted = delete(
            favorites::table
                .filter(favorites::user_id.eq(user_id))
                .filter(favorites::article_id.eq(article_id)),
        )
        .execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn refresh_favorites_count(&self, article_id: i32) -> Result<i64> {
        let mut conn = self.conn()?;
        // Recompute from the favorite rows in one statement; the counter is a
        // cache and must never be incremented in place.
        let count = conn.transaction::<i64, DieselError, _>(|conn| {
            sql_query(
                "UPDATE articles \
                 SET favorites_count = (SELECT count(*) FROM favorites WHERE article_id = $1) \
                 WHERE id = $1",
            )
            .bind::<Integer, _>(article_id)
            .execute(conn)?;
            articles::table
                .find(article_id)
                .select(articles::favorites_count)
                .get_result(conn)
        })?;
        Ok(count)
    }

    fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
        let mut conn = self.conn()?;
        if let Some(tag) = tags::table
            .filter(tags::name.eq(name))
            .first::<Tag>(&mut conn)
            .optional()?
        {
            return Ok(tag);
        }
        match insert_into(tags::table)
            .values(tags::name.eq(name))
            .get_result::<Tag>(&mut conn)
        {
            Ok(tag) => Ok(tag),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                warn!(tag = name, "lost tag creation race, fetching existing row");
                Ok(tags::table
                    .filter(tags::name.eq(name))
                    .first::<Tag>(&mut conn)?)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn tag_article(&self, article_id: i32, tag_id: i32) -> Result<()> {
        let mut conn = self.conn()?;
        insert_into(article_tags::table)
            .values((
                article_tags::article_id.eq(article_id),
                article_tags::tag_id.eq(tag_id),
            ))
            .on_conflict((article_tags::article_id, article_tags::tag_id))
            .do_nothing()
            .execute(&mut conn)?;
        Ok(())
    }

    fn list_tags(&self) -> Result<Vec<String>> {
        let mut conn = self.conn()?;
        let names = tags::table
            .order(tags::id.asc())
            .select(tags::name)
            .load::<String>(&mut conn)?;
        Ok(names)
    }

    fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        let mut conn = self.conn()?;
        let comment = insert_into(comments::table)
            .values(&comment)
            .get_result::<Comment>(&mut conn)?;
        Ok(comment)
    }

    fn comment_by_id(&self, id: i32) -> Result<Comment> {
        let mut conn = self.conn()?;
        Ok(comments::table.find(id).first::<Comment>(&mut conn)?)
    }

    fn comments_for_article(&self, article_id: i32) -> Result<Vec<(Comment, User)>> {
        let mut conn = self.conn()?;
        let rows = comments::table
            .inner_join(users::table)
            .filter(comments::article_id.eq(article_id))
            .order(comments::id.asc())
            .load::<(Comment, User)>(&mut conn)?;
        Ok(rows)
    }

    fn delete_comment(&self, id: i32) -> Result<()> {
        let mut conn = self.conn()?;
        delete(comments::table.find(id)).execute(&mut conn)?;
        Ok(())
    }
}
