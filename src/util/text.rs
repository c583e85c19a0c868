use std::borrow::Cow;

/// Ellipsis appended to truncated text
const ELLIPSIS: &str = "...";

/// Truncates a string to at most `max_chars` characters.
///
/// Counts Unicode scalar values, not bytes, so multi-byte text is never cut
/// mid-codepoint. When truncation happens the first `max_chars` characters
/// are kept and `"..."` is appended, so the result is `max_chars + 3`
/// characters long.
///
/// Returns `Cow::Borrowed` when the string already fits.
///
/// # Examples
///
/// ```
/// use opds_explorer::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 5), "Hello...");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS)),
        None => Cow::Borrowed(s),
    }
}

/// Strip terminal control characters and ANSI escape sequences from text.
///
/// Catalog titles and summaries are untrusted; this keeps them from
/// manipulating the terminal when printed.
///
/// Strips:
/// - ASCII control chars: 0x00-0x08, 0x0B-0x0C, 0x0E-0x1F, 0x7F
/// - ANSI CSI sequences: `\x1b[` ... (terminal byte 0x40-0x7E)
/// - ANSI OSC sequences: `\x1b]` ... (until BEL 0x07 or ST `\x1b\\`)
/// - Bare ESC (0x1b)
///
/// Preserves tab, newline and carriage return.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_stripped(c) {
                out.push(c);
            }
            continue;
        }

        match chars.peek() {
            Some('[') => {
                chars.next();
                // CSI: parameters until the final byte
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                // OSC: until BEL or ST
                while let Some(c) = chars.next() {
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}

fn is_stripped(c: char) -> bool {
    c == '\x1b' || c == '\x7f' || (c < '\x20' && c != '\t' && c != '\n' && c != '\r')
}
