/// Split a reply into ordered segments of at most `max_len` characters.
///
/// Greedy fixed-size windows from the front; the final segment may be
/// shorter; a text that already fits yields exactly one segment, including
/// `[""]` for the empty string. Counting is per `char`, so a segment
/// boundary can never land inside a UTF-8 sequence, but it will land inside
/// a word. Concatenating the segments reproduces the input exactly.
pub fn chunk(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return vec![text.to_string()];
    }
    chars
        .chunks(max_len)
        .map(|window| window.iter().collect())
        .collect()
}
