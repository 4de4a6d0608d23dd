use diesel::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::store::schema::tags;
use crate::store::Store;

/// Tags exist only by being attached to articles; they are created lazily via
/// [`Store::get_or_create_tag`] and never duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Serialize)]
#[diesel(table_name = tags)]
pub struct Tag {
    pub id: i32,
    pub name: String,
}

/// All known tag names, oldest first.
pub fn list<S: Store + ?Sized>(store: &S) -> Result<Vec<String>> {
    store.list_tags()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem::MemStore;

    #[test]
    fn get_or_create_returns_one_handle_per_name() {
        let store = MemStore::new();
        let first = store.get_or_create_tag("rust").unwrap();
        let again = store.get_or_create_tag("rust").unwrap();
        let other = store.get_or_create_tag("diesel").unwrap();
        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        assert_eq!(list(&store).unwrap(), vec!["rust", "diesel"]);
    }
}
