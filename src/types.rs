/// Opaque ID types for type safety
pub type PlayerId = String;
pub type RoomCode = String;

/// Normalize free text for comparison: surrounding whitespace is dropped and
/// letters are uppercased, so "  apple " and "APPLE" are the same answer.
pub fn clean_text(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Length in characters (not bytes) of already-normalized text.
pub fn text_len(s: &str) -> usize {
    s.chars().count()
}

/// Fresh participant identity
pub fn new_player_id() -> PlayerId {
    ulid::Ulid::new().to_string()
}
