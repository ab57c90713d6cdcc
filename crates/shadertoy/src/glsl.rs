/// Identifiers that are legal in shader documents but reserved by GLSL 4.50.
const RESERVED_WORDS: &[(&str, &str)] = &[("char", "glchar")];

/// Renames reserved identifiers, matching whole words only.
pub fn rename_reserved_words(code: &str) -> String {
    let mut out = code.to_string();
    for (word, replacement) in RESERVED_WORDS {
        out = replace_word(&out, word, replacement);
    }
    out
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn replace_word(code: &str, word: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut rest = code;
    let mut previous: Option<char> = None;

    while let Some(index) = rest.find(word) {
        let before = rest[..index].chars().next_back().or(previous);
        let after = rest[index + word.len()..].chars().next();
        out.push_str(&rest[..index]);
        if before.is_some_and(is_word_char) || after.is_some_and(is_word_char) {
            out.push_str(word);
        } else {
            out.push_str(replacement);
        }
        previous = word.chars().next_back();
        rest = &rest[index + word.len()..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renames_whole_words_only() {
        assert_eq!(
            rename_reserved_words("float char(int c) { return chars + char(1) + mychar; }"),
            "float glchar(int c) { return chars + glchar(1) + mychar; }"
        );
        assert_eq!(rename_reserved_words("char"), "glchar");
        assert_eq!(rename_reserved_words("charchar char_"), "charchar char_");
    }
}
