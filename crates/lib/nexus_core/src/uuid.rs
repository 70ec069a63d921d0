// Identifier generation for users and applications.
//
// Ids are UUIDv7 rendered as text, so rows sort by creation time when
// ordered by primary key.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Generate a new record id as a string.
pub fn new_id() -> String {
    uuidv7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuidv7_is_valid() {
        let id = uuidv7();
        assert_eq!(id.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn new_id_parses_back() {
        let id = new_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
