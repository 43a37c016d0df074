use memchr::memchr;

/// Remove escape markers from `src`, writing at most `dest.len()` bytes.
///
/// Escape bytes are never copied. Each one toggles a pending flag, and the
/// first ordinary byte seen while the flag is set is dropped as well. Output
/// stops silently once `dest` is full. Returns the number of bytes written.
///
/// # Examples
/// ```
/// use slot_codegen::text::unescape;
///
/// let mut out = [0u8; 8];
/// let len = unescape(b"a\\Nb", &mut out, b'\\');
/// assert_eq!(&out[..len], b"ab");
/// ```
pub fn unescape(src: &[u8], dest: &mut [u8], escape_char: u8) -> usize {
    if memchr(escape_char, src).is_none() {
        let len = src.len().min(dest.len());
        dest[..len].copy_from_slice(&src[..len]);
        return len;
    }

    let mut written = 0;
    let mut pending = false;
    for &byte in src {
        if written == dest.len() {
            break;
        }
        if byte == escape_char {
            pending = !pending;
        } else if pending {
            pending = false;
        } else {
            dest[written] = byte;
            written += 1;
        }
    }
    written
}

/// In-place form of [`unescape`]; the write cursor never passes the read
/// cursor, so the field can be normalized inside the scanner's buffer.
///
/// `max_len` caps the output; `None` means the field length.
pub fn unescape_in_place(buf: &mut [u8], max_len: Option<usize>, escape_char: u8) -> usize {
    let capacity = max_len.map_or(buf.len(), |max| max.min(buf.len()));
    let Some(first) = memchr(escape_char, buf) else {
        return capacity;
    };
    if first >= capacity {
        return capacity;
    }

    let mut written = first;
    let mut pending = false;
    for read in first..buf.len() {
        if written == capacity {
            break;
        }
        let byte = buf[read];
        if byte == escape_char {
            pending = !pending;
        } else if pending {
            pending = false;
        } else {
            buf[written] = byte;
            written += 1;
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn run(input: &[u8], capacity: usize) -> Vec<u8> {
        let mut out = vec![0u8; capacity];
        let len = unescape(input, &mut out, b'\\');
        out.truncate(len);
        out
    }

    #[rstest]
    #[case(b"", b"")]
    #[case(b"plain text", b"plain text")]
    #[case(b"a\\Nb", b"ab")]
    #[case(b"\\\\b", b"b")]
    #[case(b"\\\\\\b", b"")]
    #[case(b"a\\,b", b"ab")]
    #[case(b"abc\\", b"abc")]
    #[case(b"\\", b"")]
    #[case(b"x\\\\", b"x")]
    fn test_toggle_rule(#[case] input: &[u8], #[case] expected: &[u8]) {
        assert_eq!(run(input, input.len()), expected);
    }

    #[rstest]
    fn test_unescaped_input_is_unchanged() {
        let input = b"no escapes, just|bytes\t\x00\xff";
        assert_eq!(run(input, input.len()), input);
    }

    #[rstest]
    fn test_capacity_truncates_silently() {
        assert_eq!(run(b"abcdef", 3), b"abc");
        assert_eq!(run(b"a\\Xbcdef", 3), b"abc");
        assert_eq!(run(b"abc", 0), b"");
    }

    #[rstest]
    fn test_in_place_matches_copying_form() {
        for input in [&b"a\\Nb"[..], b"\\\\b", b"ab\\\\\\cd\\", b"nothing"] {
            let mut buf = input.to_vec();
            let len = unescape_in_place(&mut buf, None, b'\\');
            assert_eq!(&buf[..len], run(input, input.len()).as_slice());
        }
    }

    #[rstest]
    fn test_in_place_max_len() {
        let mut buf = b"ab\\Xcdef".to_vec();
        let len = unescape_in_place(&mut buf, Some(3), b'\\');
        assert_eq!(&buf[..len], b"abc");

        let mut buf = b"abcdef\\".to_vec();
        let len = unescape_in_place(&mut buf, Some(4), b'\\');
        assert_eq!(&buf[..len], b"abcd");

        let mut buf = b"abc".to_vec();
        assert_eq!(unescape_in_place(&mut buf, Some(10), b'\\'), 3);
    }
}
