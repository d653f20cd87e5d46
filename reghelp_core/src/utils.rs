use std::collections::HashSet;

lazy_static! {
    /// Characters that may not appear in a file or directory name.
    static ref EXCLUDED_CHARS: HashSet<char> = {
        let mut set: HashSet<char> = (0u8..32).chain(33..40).map(char::from).collect();
        set.extend([
            '*', '>', '<', '"', ':', '?', '\\', '/', '|',
            '^', '=', '@', '}', '{', ';', '[', ']', '+',
        ]);
        set
    };
}

pub fn is_excluded(c: char) -> bool {
    EXCLUDED_CHARS.contains(&c)
}

/// Decodes one byte as a stand-alone character.
///
/// Bytes above 0x7f belong to multi-byte encodings (registry strings are often
/// UTF-16 or code-page text) and have no single-unit representation, so they
/// decode to `None`.
fn decode_byte(byte: u8) -> Option<char> {
    let c = char::from(byte);
    if c.len_utf8() == 1 {
        Some(c)
    } else {
        None
    }
}

/// Builds a string that is safe to use as a file or directory name from raw
/// registry bytes. Undecodable and excluded characters are dropped.
pub fn sanitize(buffer: &[u8]) -> String {
    let mut buf = String::with_capacity(buffer.len());
    for c in buffer.iter().filter_map(|&b| decode_byte(b)) {
        if !is_excluded(c) {
            buf.push(c);
        }
    }
    buf
}

#[test]
fn sanitize_empty() {
    assert_eq!(sanitize(&[]), "");
}

#[test]
fn sanitize_plain_ascii() {
    assert_eq!(sanitize(&[65, 66, 67]), "ABC");
    assert_eq!(sanitize(b"report final.docx"), "report final.docx");
}

#[test]
fn sanitize_drops_reserved_punctuation() {
    assert_eq!(sanitize(&[42]), "");
    assert_eq!(sanitize(b"a*b?c:d|e<f>g\"h/i\\j"), "abcdefghij");
    assert_eq!(sanitize(b"{x}[y]^z=1+2@;"), "xyz12");
    assert_eq!(sanitize(b"!#$%&'()"), "()");
}

#[test]
fn sanitize_drops_control_and_high_bytes() {
    assert_eq!(sanitize(&[0x00, b'o', 0x0a, b'k', 0x1f]), "ok");
    // UTF-16LE "Hi" followed by a Latin-1 e-acute
    assert_eq!(sanitize(&[b'H', 0x00, b'i', 0x00, 0xe9]), "Hi");
    assert_eq!(sanitize(&[0x80, 0xff]), "");
}

#[test]
fn sanitize_keeps_space_and_delete() {
    assert_eq!(sanitize(&[b'a', 32, b'b', 127]), "a b\u{7f}");
}

#[test]
fn sanitize_never_grows_and_never_emits_excluded() {
    let buffer: Vec<u8> = (0..=255).collect();
    let sanitized = sanitize(&buffer);
    assert!(sanitized.len() <= buffer.len());
    assert!(sanitized.chars().all(|c| !is_excluded(c)));
    assert!(sanitized.is_ascii());
}
