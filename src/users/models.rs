use diesel::prelude::*;
use pbkdf2::password_hash::rand_core::OsRng;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use serde::Serialize;
use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::store::schema::users;

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i32,
    pub username: String,
    pub email: String,
    /// pbkdf2 hash, never the plaintext.
    #[serde(skip_serializing)]
    pub password: String,
    pub bio: Option<String>,
    pub image: Option<String>,
}

impl User {
    pub fn make_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Pbkdf2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_| Error::Internal)?;
        Ok(hash.to_string())
    }

    pub fn set_password(&mut self, password: &str) -> Result<()> {
        self.password = User::make_password(password)?;
        Ok(())
    }

    pub fn verify_password(&self, candidate: &str) -> Result<bool> {
        let stored = PasswordHash::new(&self.password).map_err(|_| Error::Internal)?;
        Ok(Pbkdf2
            .verify_password(candidate.as_bytes(), &stored)
            .is_ok())
    }

    pub fn profile(&self, following: bool) -> Profile<'_> {
        Profile {
            username: Cow::Borrowed(&self.username),
            bio: self.bio.as_deref().map(Cow::Borrowed),
            image: self.image.as_deref().map(Cow::Borrowed),
            following,
        }
    }

    pub fn into_profile(self, following: bool) -> Profile<'static> {
        Profile {
            username: Cow::Owned(self.username),
            bio: self.bio.map(Cow::Owned),
            image: self.image.map(Cow::Owned),
            following,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = User::make_password("correct horse").unwrap();
        assert_ne!(hash, "correct horse");
        let user = User {
            id: 1,
            username: "anna".to_string(),
            email: "anna@example.com".to_string(),
            password: hash,
            bio: None,
            image: None,
        };
        assert!(user.verify_password("correct horse").unwrap());
        assert!(!user.verify_password("wrong horse").unwrap());
    }

    #[test]
    fn serialization_hides_id_and_password() {
        let user = User {
            id: 9,
            username: "anna".to_string(),
            email: "anna@example.com".to_string(),
            password: "hash".to_string(),
            bio: Some("bio".to_string()),
            image: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("password").is_none());
        assert_eq!(json["username"], "anna");
    }
}
