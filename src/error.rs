use diesel::result::Error as DieselError;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Error surface of the core. Variants map one-to-one onto the status codes the
/// request layer is expected to answer with: `NotFound` -> 404, `Unauthorized` /
/// the two credential variants -> 401, `Forbidden` -> 403, `Validation` -> 422.
#[derive(Debug, Error)]
pub enum Error {
    #[error("entity not found")]
    NotFound,

    #[error("authentication required")]
    Unauthorized,

    #[error("operation restricted to the owning author")]
    Forbidden,

    /// Credential present but not even shaped like a `Token <jwt>` header.
    #[error("malformed credential")]
    MalformedCredential,

    /// Credential well-formed but signature verification or expiry failed.
    #[error("invalid credential")]
    InvalidCredential,

    #[error("validation failed")]
    Validation(ValidationError),

    #[error("store error: {0}")]
    Store(DieselError),

    #[error("internal error")]
    Internal,
}

impl From<DieselError> for Error {
    fn from(err: DieselError) -> Error {
        // Absence is data, not a fault.
        match err {
            DieselError::NotFound => Error::NotFound,
            other => Error::Store(other),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Error {
        Error::Validation(err)
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;

/// Field name -> list of complaints, serialized under `errors` by the caller.
#[derive(Debug, Serialize, Default)]
pub struct ValidationError(HashMap<String, Vec<String>>);

impl ValidationError {
    pub fn add_error<K: Into<String>, V: Into<String>>(&mut self, key: K, val: V) {
        let entry = self.0.entry(key.into()).or_default();
        entry.push(val.into());
    }

    pub fn from<K: Into<String>, V: Into<String>>(key: K, val: V) -> Self {
        let mut error = ValidationError::default();
        error.add_error(key, val);
        error
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (key, errors) in other.0.into_iter() {
            let entry = self.0.entry(key).or_default();
            entry.extend(errors);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn messages(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(|v| v.as_slice())
    }
}
