// ── Delimited list codec ──
//
// Ordered string lists flattened to a single delimited string, used for
// topic lists and other multi-valued settings stored as text.

/// Default member separator.
pub const DEFAULT_DELIMITER: char = ',';

/// Join `items` with `delimiter`. Members are written verbatim.
pub fn encode<I, S>(items: I, delimiter: char) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        out.push_str(item.as_ref());
    }
    out
}

/// Split `raw` on `delimiter`, preserving order and members verbatim.
///
/// An empty string is the empty list. A list holding a single empty
/// member therefore does not survive a round trip.
pub fn decode(raw: &str, delimiter: char) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(delimiter).map(str::to_owned).collect()
}
