// src/utils/html.rs

/// Sanitizes author-supplied quiz text (questions, options).
///
/// Whitelist-based: harmless formatting such as <b> or <sub> survives, while
/// <script>, <iframe> and event-handler attributes are stripped. Everything a
/// quiz author types is rendered to every student, so this runs before the
/// quiz is stored.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Strips all markup and keeps the text as typed, for names and labels.
///
/// Ammonia entity-escapes the text it emits; those escapes are undone so that
/// "Tom & Jerry" stays "Tom & Jerry". The result is plain text for JSON, not
/// HTML, and must be escaped by whatever renders it.
pub fn plain_text(input: &str) -> String {
    let cleaned = ammonia::Builder::empty().clean(input).to_string();
    cleaned
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}
