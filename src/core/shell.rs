//! POSIX shell quoting for rendered command lines

/// Characters that never need quoting in a POSIX shell word
fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
}

/// Quote a single word so `sh` reads it back unchanged
pub fn quote(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_safe) {
        return word.to_string();
    }

    quote_always(word)
}

fn quote_always(word: &str) -> String {
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for c in word.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Quote the command word of a simple command
///
/// An unquoted `=` would make `sh` read the word as a variable assignment.
pub fn quote_command(word: &str) -> String {
    if word.contains('=') {
        quote_always(word)
    } else {
        quote(word)
    }
}

/// Join words into one shell-safe line
pub fn join<I, S>(words: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
