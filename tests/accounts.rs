//! Account lifecycle wired through the token resolver: the token handed out
//! at registration must resolve back to a viewer that the rest of the API
//! accepts.

use conduit_core::auth::{AuthConfig, AuthResolver};
use conduit_core::store::mem::MemStore;
use conduit_core::users::{self, Registration, UserUpdate};
use conduit_core::{profile, Error, ViewerContext};

fn resolver() -> AuthResolver {
    AuthResolver::new(AuthConfig::new("integration-signing-key", 3600))
}

fn registration(name: &str) -> Registration {
    Registration {
        username: name.to_string(),
        email: format!("{}@example.com", name),
        password: "correct horse battery".to_string(),
    }
}

#[test]
fn issued_token_resolves_to_a_working_viewer() {
    let store = MemStore::new();
    let resolver = resolver();
    let session = users::register(&store, &resolver, registration("anna")).unwrap();

    let header = format!("Token {}", session.token);
    let viewer = resolver.resolve_required(Some(&header)).unwrap();
    assert_eq!(viewer.user_id(), Some(session.user.id));

    let me = users::current(&store, &viewer).unwrap();
    assert_eq!(me.username, "anna");
    assert_eq!(me.email, "anna@example.com");
}

#[test]
fn update_reissues_a_token_for_the_new_identity() {
    let store = MemStore::new();
    let resolver = resolver();
    let session = users::register(&store, &resolver, registration("anna")).unwrap();
    let viewer = ViewerContext::authenticated(session.user.id, "anna");

    let session = users::update(
        &store,
        &resolver,
        &viewer,
        UserUpdate {
            username: Some("annika".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(session.user.username, "annika");

    let header = format!("Token {}", session.token);
    let viewer = resolver.resolve_required(Some(&header)).unwrap();
    let me = users::current(&store, &viewer).unwrap();
    assert_eq!(me.username, "annika");
}

#[test]
fn follow_state_is_per_viewer_and_idempotent() {
    let store = MemStore::new();
    let resolver = resolver();
    let anna = users::register(&store, &resolver, registration("anna")).unwrap();
    let bob = users::register(&store, &resolver, registration("bob")).unwrap();
    let anna = ViewerContext::authenticated(anna.user.id, "anna");
    let bob = ViewerContext::authenticated(bob.user.id, "bob");

    profile::follow(&store, &anna, "bob").unwrap();
    profile::follow(&store, &anna, "bob").unwrap();
    assert!(profile::get(&store, &anna, "bob").unwrap().following);
    assert!(!profile::get(&store, &bob, "anna").unwrap().following);
    assert!(!profile::get(&store, &ViewerContext::Anonymous, "bob")
        .unwrap()
        .following);

    profile::unfollow(&store, &anna, "bob").unwrap();
    assert!(!profile::get(&store, &anna, "bob").unwrap().following);

    assert!(matches!(
        profile::get(&store, &anna, "ghost"),
        Err(Error::NotFound)
    ));
}
