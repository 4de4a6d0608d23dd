pub mod models;
mod utils;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::auth::AuthResolver;
use crate::error::{Result, ValidationError};
use crate::store::Store;
use crate::viewer::ViewerContext;
use models::{NewUser, User};

#[derive(Debug)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// A user plus the freshly signed token, as handed back by registration,
/// login and self-update.
#[derive(Debug)]
pub struct UserSession {
    pub user: User,
    pub token: String,
}

impl Serialize for UserSession {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("User", 5)?;
        s.serialize_field("email", &self.user.email)?;
        s.serialize_field("token", &self.token)?;
        s.serialize_field("username", &self.user.username)?;
        s.serialize_field("bio", &self.user.bio)?;
        s.serialize_field("image", &self.user.image)?;
        s.end()
    }
}

pub fn register<S: Store + ?Sized>(
    store: &S,
    resolver: &AuthResolver,
    registration: Registration,
) -> Result<UserSession> {
    let mut errors = ValidationError::default();
    if let Err(e) = utils::validate_email(&registration.email) {
        errors.merge(e);
    }
    if let Err(e) = utils::validate_username(&registration.username) {
        errors.merge(e);
    }
    if let Err(e) = utils::validate_password(&registration.password) {
        errors.merge(e);
    }
    if store.email_taken(&registration.email, None)? {
        errors.add_error("email", "email already exists");
    }
    if store.username_taken(&registration.username, None)? {
        errors.add_error("username", "username already exists");
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let user = store.create_user(NewUser {
        username: registration.username,
        email: registration.email,
        password: User::make_password(&registration.password)?,
    })?;
    let token = resolver.issue_token(&user)?;
    Ok(UserSession { user, token })
}

pub fn login<S: Store + ?Sized>(
    store: &S,
    resolver: &AuthResolver,
    email: &str,
    password: &str,
) -> Result<UserSession> {
    let user = store.user_by_email(email)?;
    if !user.verify_password(password)? {
        return Err(ValidationError::from("password", "invalid password").into());
    }
    let token = resolver.issue_token(&user)?;
    Ok(UserSession { user, token })
}

/// The authenticated user's own record.
pub fn current<S: Store + ?Sized>(store: &S, viewer: &ViewerContext) -> Result<User> {
    let auth = viewer.require()?;
    store.user_by_id(auth.user_id)
}

/// Self-service profile update; absent fields are left unchanged.
#[derive(Debug, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

pub fn update<S: Store + ?Sized>(
    store: &S,
    resolver: &AuthResolver,
    viewer: &ViewerContext,
    update: UserUpdate,
) -> Result<UserSession> {
    let auth = viewer.require()?;
    let mut user = store.user_by_id(auth.user_id)?;
    let mut errors = ValidationError::default();

    if let Some(bio) = update.bio {
        user.bio = Some(bio);
    }
    if let Some(image) = update.image {
        user.image = Some(image);
    }

    if let Some(new_email) = update.email {
        match utils::validate_email(&new_email) {
            Err(e) => errors.merge(e),
            Ok(()) => user.email = new_email,
        }
        if store.email_taken(&user.email, Some(user.id))? {
            errors.add_error("email", format!("email already taken: {}", user.email));
        }
    }

    if let Some(new_username) = update.username {
        match utils::validate_username(&new_username) {
            Err(e) => errors.merge(e),
            Ok(()) => user.username = new_username,
        }
        if store.username_taken(&user.username, Some(user.id))? {
            errors.add_error(
                "username",
                format!("username already taken: {}", user.username),
            );
        }
    }

    if let Some(new_password) = update.password {
        match utils::validate_password(&new_password) {
            Err(e) => errors.merge(e),
            Ok(()) => user.set_password(&new_password)?,
        }
    }

    if !errors.is_empty() {
        return Err(errors.into());
    }
    store.update_user(&user)?;
    let token = resolver.issue_token(&user)?;
    Ok(UserSession { user, token })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::error::Error;
    use crate::store::mem::MemStore;

    fn resolver() -> AuthResolver {
        AuthResolver::new(AuthConfig::new("users-test-key", 3600))
    }

    fn registration(name: &str) -> Registration {
        Registration {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password: "sufficiently-long".to_string(),
        }
    }

    #[test]
    fn register_then_login() {
        let store = MemStore::new();
        let resolver = resolver();
        let session = register(&store, &resolver, registration("anna")).unwrap();
        assert_eq!(session.user.username, "anna");
        assert!(!session.token.is_empty());

        let session = login(
            &store,
            &resolver,
            "anna@example.com",
            "sufficiently-long",
        )
        .unwrap();
        assert_eq!(session.user.username, "anna");

        let err = login(&store, &resolver, "anna@example.com", "wrong").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn register_aggregates_validation_errors() {
        let store = MemStore::new();
        let err = register(
            &store,
            &resolver(),
            Registration {
                username: "ab".to_string(),
                email: "nope".to_string(),
                password: "x".to_string(),
            },
        )
        .unwrap_err();
        match err {
            Error::Validation(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn register_rejects_taken_identity() {
        let store = MemStore::new();
        let resolver = resolver();
        register(&store, &resolver, registration("anna")).unwrap();
        let err = register(&store, &resolver, registration("anna")).unwrap_err();
        match err {
            Error::Validation(errors) => {
                assert!(errors.messages("email").is_some());
                assert!(errors.messages("username").is_some());
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn update_keeps_untouched_fields() {
        let store = MemStore::new();
        let resolver = resolver();
        let session = register(&store, &resolver, registration("anna")).unwrap();
        let viewer = ViewerContext::authenticated(session.user.id, "anna");

        let session = update(
            &store,
            &resolver,
            &viewer,
            UserUpdate {
                bio: Some("rustacean".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(session.user.bio.as_deref(), Some("rustacean"));
        assert_eq!(session.user.email, "anna@example.com");
    }

    #[test]
    fn update_rejects_username_taken_by_other() {
        let store = MemStore::new();
        let resolver = resolver();
        register(&store, &resolver, registration("anna")).unwrap();
        let bob = register(&store, &resolver, registration("bobby")).unwrap();
        let viewer = ViewerContext::authenticated(bob.user.id, "bobby");

        let err = update(
            &store,
            &resolver,
            &viewer,
            UserUpdate {
                username: Some("anna".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
