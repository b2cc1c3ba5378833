/// Parsing of raw operator-entered header text.
///
/// Tasks carry headers as newline-delimited `Key: Value` lines. Each line is
/// split at the first colon only, so values containing colons survive intact.
/// Malformed lines (no colon, or a colon in position 0) are skipped, and the
/// first occurrence of a key wins.
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

pub fn parse_headers(raw: &str) -> HeaderMap {
    let mut map = HeaderMap::new();
    for line in raw.lines() {
        let Some(idx) = line.find(':') else {
            if !line.trim().is_empty() {
                debug!(line, "skipping header line without colon");
            }
            continue;
        };
        if idx == 0 {
            continue;
        }
        let key = line[..idx].trim();
        let value = line[idx + 1..].trim();
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(n) => n,
            Err(_) => {
                debug!(key, "skipping invalid header name");
                continue;
            }
        };
        let value = match HeaderValue::from_str(value) {
            Ok(v) => v,
            Err(_) => {
                debug!(key, "skipping invalid header value");
                continue;
            }
        };
        if !map.contains_key(&name) {
            map.insert(name, value);
        }
    }
    map
}
