//! Identity generation
//!
//! Produces the stable identifiers and display names the relay assigns to
//! clients that handshake without one. Identifiers are UUIDv4; display names
//! are adjective-color-animal triples.

use rand::Rng;
use uuid::Uuid;

const ADJECTIVES: &[&str] = &[
    "able", "brave", "calm", "daring", "eager", "fancy", "gentle", "happy", "icy", "jolly",
    "keen", "lively", "merry", "nimble", "odd", "proud", "quiet", "rapid", "sly", "tidy",
    "upbeat", "vivid", "witty", "zesty",
];

const COLORS: &[&str] = &[
    "amber", "azure", "beige", "coral", "crimson", "emerald", "golden", "indigo", "ivory",
    "jade", "lilac", "maroon", "olive", "pearl", "scarlet", "violet",
];

const ANIMALS: &[&str] = &[
    "badger", "bison", "crane", "dolphin", "falcon", "ferret", "gecko", "heron", "ibis",
    "jackal", "koala", "lemur", "lynx", "marmot", "newt", "otter", "panda", "quail", "raven",
    "stoat", "tapir", "viper", "walrus", "yak",
];

/// Generate a fresh identifier, unique across all assigned identities
pub fn unique_client_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a random human-readable display name
pub fn display_name() -> String {
    let mut rng = rand::rng();
    format!(
        "{}-{}-{}",
        ADJECTIVES[rng.random_range(0..ADJECTIVES.len())],
        COLORS[rng.random_range(0..COLORS.len())],
        ANIMALS[rng.random_range(0..ANIMALS.len())],
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_client_ids_are_unique() {
        let ids: HashSet<String> = (0..100).map(|_| unique_client_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_client_id_is_nonempty() {
        assert!(!unique_client_id().is_empty());
    }

    #[test]
    fn test_display_name_has_three_parts() {
        let name = display_name();
        let parts: Vec<&str> = name.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|part| !part.is_empty()));
    }
}
