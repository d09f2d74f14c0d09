//! Small shared helpers.

use time::OffsetDateTime;

/// Milliseconds since the unix epoch, for client-facing timestamps.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Room codes are user-facing and case-insensitive; everything server
/// side works on the normalized form.
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_codes_are_uppercased_and_trimmed() {
        assert_eq!(normalize_room_code(" abCd "), "ABCD");
        assert_eq!(normalize_room_code("KYRO"), "KYRO");
    }
}
