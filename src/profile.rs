use serde::Serialize;
use std::borrow::Cow;

use crate::error::{Result, ValidationError};
use crate::store::Store;
use crate::viewer::ViewerContext;

/// Public face of a user, relative to the viewer: `following` is always
/// viewer-specific and false for anonymous requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile<'a> {
    pub username: Cow<'a, str>,
    pub bio: Option<Cow<'a, str>>,
    pub image: Option<Cow<'a, str>>,
    pub following: bool,
}

pub fn get<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    username: &str,
) -> Result<Profile<'static>> {
    let user = store.user_by_username(username)?;
    let following = match viewer.user_id() {
        Some(viewer_id) => store.is_following(viewer_id, user.id)?,
        None => false,
    };
    Ok(user.into_profile(following))
}

/// Idempotent: following an already-followed user changes nothing.
pub fn follow<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    username: &str,
) -> Result<Profile<'static>> {
    let auth = viewer.require()?;
    let target = store.user_by_username(username)?;
    if target.id == auth.user_id {
        return Err(ValidationError::from("follow", "cannot follow yourself").into());
    }
    store.add_follow(auth.user_id, target.id)?;
    Ok(target.into_profile(true))
}

pub fn unfollow<S: Store + ?Sized>(
    store: &S,
    viewer: &ViewerContext,
    username: &str,
) -> Result<Profile<'static>> {
    let auth = viewer.require()?;
    let target = store.user_by_username(username)?;
    store.remove_follow(auth.user_id, target.id)?;
    Ok(target.into_profile(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::mem::MemStore;
    use crate::users::models::NewUser;

    fn user(store: &MemStore, name: &str) -> i32 {
        store
            .create_user(NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password: String::new(),
            })
            .unwrap()
            .id
    }

    #[test]
    fn follow_is_idempotent_and_viewer_relative() {
        let store = MemStore::new();
        let anna = user(&store, "anna");
        let bob = user(&store, "bob");
        let viewer = ViewerContext::authenticated(anna, "anna");

        let profile = follow(&store, &viewer, "bob").unwrap();
        assert!(profile.following);
        // Second follow changes nothing.
        follow(&store, &viewer, "bob").unwrap();
        assert_eq!(store.following_ids(anna).unwrap(), vec![bob]);

        // Bob himself does not see Anna as followed.
        let bobs_view = ViewerContext::authenticated(bob, "bob");
        let profile = get(&store, &bobs_view, "anna").unwrap();
        assert!(!profile.following);

        // Anonymous viewers never see a follow edge.
        let profile = get(&store, &ViewerContext::Anonymous, "bob").unwrap();
        assert!(!profile.following);
    }

    #[test]
    fn self_follow_is_rejected() {
        let store = MemStore::new();
        user(&store, "anna");
        let viewer = ViewerContext::authenticated(1, "anna");
        let err = follow(&store, &viewer, "anna").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn unfollow_unknown_user_is_not_found() {
        let store = MemStore::new();
        user(&store, "anna");
        let viewer = ViewerContext::authenticated(1, "anna");
        assert!(matches!(
            unfollow(&store, &viewer, "ghost"),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn follow_requires_authentication() {
        let store = MemStore::new();
        user(&store, "anna");
        assert!(matches!(
            follow(&store, &ViewerContext::Anonymous, "anna"),
            Err(Error::Unauthorized)
        ));
    }
}
