//! The application carried over LRCP: reverse every line.
//!
//! [`reverse_lines`] is handed the part of a session's input that has not
//! been scanned yet.  It reverses each complete (newline-terminated) line and
//! reports how many input bytes it consumed; a trailing fragment without a
//! newline is left for the next call, once more bytes have arrived.

/// Reverse every complete line in `unscanned`.
///
/// Returns `(output, consumed)`: the reversed lines, each followed by `\n`,
/// and the number of input bytes they account for.  `output.len() == consumed`.
pub fn reverse_lines(unscanned: &[u8]) -> (Vec<u8>, usize) {
    let consumed = match unscanned.iter().rposition(|&b| b == b'\n') {
        Some(last_newline) => last_newline + 1,
        None => return (Vec::new(), 0),
    };

    let mut output = Vec::with_capacity(consumed);
    for line in unscanned[..consumed - 1].split(|&b| b == b'\n') {
        reverse_line_into(line, &mut output);
        output.push(b'\n');
    }
    (output, consumed)
}

/// Characters are reversed when the line is valid UTF-8; anything else is
/// reversed byte by byte.  Either way the length is unchanged.
fn reverse_line_into(line: &[u8], out: &mut Vec<u8>) {
    match std::str::from_utf8(line) {
        Ok(text) => {
            let mut utf8 = [0u8; 4];
            for c in text.chars().rev() {
                out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            }
        }
        Err(_) => out.extend(line.iter().rev()),
    }
}
