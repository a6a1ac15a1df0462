/// Key layout for the work queue's single partition.
///
/// - `queue:job:{id}` -> job record (JSON)

pub fn encode_job_key(id: &str) -> Vec<u8> {
    format!("queue:job:{}", id).into_bytes()
}

pub fn decode_job_key(key: &[u8]) -> Option<String> {
    std::str::from_utf8(key)
        .ok()?
        .strip_prefix("queue:job:")
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_id() {
        let key = encode_job_key("tx-123");
        assert_eq!(key, b"queue:job:tx-123");
        assert_eq!(decode_job_key(&key).unwrap(), "tx-123");
    }
}
