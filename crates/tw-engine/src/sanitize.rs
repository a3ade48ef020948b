use tw_core::MAX_NAME_LEN;

/// HTML-entity-encode `& < > " '` while preserving every other Unicode
/// codepoint (emoji, non-Latin letters, etc.), then cap length.
///
/// Length is capped in chars, after encoding, matching the 50-char display
/// budget clients actually render rather than the expanded entity form.
pub fn sanitize_name(raw: &str) -> String {
    let encoded: String = raw
        .chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            other => other.to_string(),
        })
        .collect();
    encoded.chars().take(MAX_NAME_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reserved_characters() {
        let out = sanitize_name(r#"<b>&"'"#);
        assert_eq!(out, "&lt;b&gt;&amp;&quot;&#39;");
    }

    #[test]
    fn preserves_emoji_and_non_ascii() {
        let out = sanitize_name("Ängström 🔥 日本語");
        assert_eq!(out, "Ängström 🔥 日本語");
    }

    #[test]
    fn caps_length_at_50_chars() {
        let raw: String = std::iter::repeat('x').take(80).collect();
        let out = sanitize_name(&raw);
        assert_eq!(out.chars().count(), MAX_NAME_LEN);
    }
}
