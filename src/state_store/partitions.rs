/// Key layout for the state store's single partition.
///
/// - `transaction:state:{id}` -> envelope { state, expires_at } (JSON)

pub fn encode_state_key(id: &str) -> Vec<u8> {
    format!("transaction:state:{}", id).into_bytes()
}

pub fn decode_state_key(key: &[u8]) -> Option<String> {
    std::str::from_utf8(key)
        .ok()?
        .strip_prefix("transaction:state:")
        .map(String::from)
}
