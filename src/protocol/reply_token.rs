use uuid::Uuid;

/// Fresh reply token for outbound requests and events.
///
/// Random v4 UUID in its 36 character hyphenated form. Collisions are not
/// checked.
pub fn new_reply_token() -> String {
    Uuid::new_v4().to_string()
}
