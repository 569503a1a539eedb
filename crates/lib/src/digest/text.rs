//! Text helpers: tag stripping, markup cleanup and reply normalisation.

/// Remove markup tags, keeping their text. A `<` not followed by a tag-like character is literal.
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '<' {
            out.push(c);
            continue;
        }
        let tag_like = matches!(chars.peek(), Some(&n) if n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?'));
        if !tag_like {
            out.push(c);
            continue;
        }
        let mut quote: Option<char> = None;
        for t in chars.by_ref() {
            match quote {
                Some(q) if t == q => quote = None,
                Some(_) => {}
                None if t == '"' || t == '\'' => quote = Some(t),
                None if t == '>' => break,
                None => {}
            }
        }
    }
    out
}

/// Re-escape `&`, `<` and `>` in already-decoded text so a later [`clean_html`] pass
/// reads it as literal text.
pub fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

/// Markup to Messenger text: `<br>` variants become newlines, tags are stripped,
/// tabs and doubled newlines are removed.
pub fn clean_html(message: &str) -> String {
    let text = message
        .replace("<br/>", "\n")
        .replace("<br>", "\n")
        .replace("<br />", "\n");
    let text = strip_tags(&text).replace('\t', "").replace("\n\n", "");
    decode_entities(&text)
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn fold_accent(c: char) -> Option<char> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'ď' | 'đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'ĥ' | 'ħ' => 'h',
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => 'i',
        'ĵ' => 'j',
        'ķ' => 'k',
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => 'l',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ŕ' | 'ŗ' | 'ř' => 'r',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'ţ' | 'ť' | 'ŧ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'ŵ' => 'w',
        'ý' | 'ÿ' | 'ŷ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        _ => return None,
    };
    Some(folded)
}

/// Lowercase and strip common Latin diacritics, for comparing a typed reply with a button label.
pub fn remove_accents_to_lower(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| fold_accent(c).unwrap_or(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_keeps_text() {
        assert_eq!(strip_tags("<p>Hello <b>World</b></p>"), "Hello World");
        assert_eq!(strip_tags("1 < 2 and <a href=\"x>y\">link</a>"), "1 < 2 and link");
        assert_eq!(strip_tags("<!-- note -->done"), "done");
        assert_eq!(strip_tags("plain"), "plain");
    }

    #[test]
    fn clean_html_converts_breaks() {
        assert_eq!(clean_html("Hello<br>World"), "Hello\nWorld");
        assert_eq!(clean_html("a<br/>b<br />c"), "a\nb\nc");
        assert_eq!(clean_html("a<br><br>b"), "ab");
        assert_eq!(clean_html("<p>\tTab</p>"), "Tab");
        assert_eq!(clean_html("Fish &amp; chips"), "Fish & chips");
    }

    #[test]
    fn escaped_text_survives_one_cleanup() {
        assert_eq!(clean_html(&escape_markup("Type <name> here")), "Type <name> here");
        assert_eq!(clean_html(&escape_markup("Write &lt;b&gt; literally")), "Write &lt;b&gt; literally");
        assert_eq!(clean_html(&escape_markup("Fish & chips")), "Fish & chips");
    }

    #[test]
    fn accent_folding() {
        assert_eq!(remove_accents_to_lower("Sí"), "si");
        assert_eq!(remove_accents_to_lower("YES"), "yes");
        assert_eq!(remove_accents_to_lower("Ñandú Çà"), "nandu ca");
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
