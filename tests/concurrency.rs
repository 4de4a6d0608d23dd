//! Races the favorite counter and lazy tag creation across threads. The
//! counter is recomputed from the favorite rows rather than incremented, so
//! interleaved toggles must always converge on the true row count.

use std::sync::Arc;
use std::thread;

use conduit_core::article::{self, ArticleDraft};
use conduit_core::store::mem::MemStore;
use conduit_core::store::Store;
use conduit_core::users::models::NewUser;
use conduit_core::ViewerContext;

fn user(store: &MemStore, name: &str) -> ViewerContext {
    let user = store
        .create_user(NewUser {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password: String::new(),
        })
        .unwrap();
    ViewerContext::authenticated(user.id, name)
}

#[test]
fn concurrent_favorites_converge_on_row_count() {
    let store = Arc::new(MemStore::new());
    let anna = user(&store, "anna");
    let view = article::create(
        &*store,
        &anna,
        ArticleDraft {
            title: "Contended".to_string(),
            description: "d".to_string(),
            body: "b".to_string(),
            tag_list: vec![],
        },
    )
    .unwrap();
    let article_id = store.article_by_slug(&view.slug).unwrap().id;

    let readers: Vec<i32> = (0..8)
        .map(|i| {
            user(&store, &format!("reader{}", i))
                .user_id()
                .unwrap()
        })
        .collect();

    // Every reader favorites twice and unfavorites once, racing the others.
    let handles: Vec<_> = readers
        .iter()
        .map(|&user_id| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                article::favorite(&*store, article_id, user_id).unwrap();
                article::favorite(&*store, article_id, user_id).unwrap();
                article::unfavorite(&*store, article_id, user_id).unwrap();
                article::favorite(&*store, article_id, user_id).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stored = store.article_by_slug(&view.slug).unwrap();
    assert_eq!(stored.favorites_count, readers.len() as i64);
    for &user_id in &readers {
        assert!(store.is_favorited(user_id, article_id).unwrap());
    }
}

#[test]
fn concurrent_tagging_yields_a_single_tag_row() {
    let store = Arc::new(MemStore::new());
    let anna = user(&store, "anna");
    let bob = user(&store, "bob");

    let publish = |viewer: ViewerContext, title: &str| {
        let store = Arc::clone(&store);
        let title = title.to_string();
        thread::spawn(move || {
            article::create(
                &*store,
                &viewer,
                ArticleDraft {
                    title,
                    description: "d".to_string(),
                    body: "b".to_string(),
                    tag_list: vec!["shared".to_string()],
                },
            )
            .unwrap()
        })
    };

    // Two authors publish with the same fresh tag at the same time; exactly
    // one tag row may exist afterwards, referenced by both articles.
    let first = publish(anna, "First Take");
    let second = publish(bob, "Second Take");
    let first = first.join().unwrap();
    let second = second.join().unwrap();

    assert_eq!(conduit_core::tag::list(&*store).unwrap(), vec!["shared"]);
    assert_eq!(first.tag_list, vec!["shared"]);
    assert_eq!(second.tag_list, vec!["shared"]);
}
