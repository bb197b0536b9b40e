use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const EXCERPT_CHARS: usize = 160;

fn code_block_regex() -> &'static Regex {
    static CODE_BLOCK: OnceLock<Regex> = OnceLock::new();
    CODE_BLOCK.get_or_init(|| Regex::new(r"(?s)```[\s\S]*?```").expect("code block pattern is valid"))
}

/// Sanitizes Markdown content by escaping all HTML tags outside code blocks,
/// while preserving fenced code blocks (```) untouched.
/// Prevents double-escaping by normalizing entities first.
pub fn sanitize_markdown_content(markdown_input: &str) -> String {
    let mut code_blocks: Vec<String> = Vec::new();

    let with_placeholders = code_block_regex().replace_all(markdown_input, |caps: &regex::Captures| {
        code_blocks.push(caps[0].to_string());
        format!("__CODE_BLOCK_PLACEHOLDER_{}__", code_blocks.len() - 1)
    });

    let decoded = html_escape::decode_html_entities(&with_placeholders);
    let escaped = html_escape::encode_text(&decoded).to_string();

    let mut final_output = escaped;
    for (i, block) in code_blocks.iter().enumerate() {
        let placeholder = format!("__CODE_BLOCK_PLACEHOLDER_{}__", i);
        final_output = final_output.replacen(&placeholder, block, 1);
    }

    final_output
}

/// Strips all HTML tags from input (for titles/excerpts)
pub fn strip_all_html(input: &str) -> String {
    ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string()
}

/// Plain-text excerpt taken from the start of the content, used when an
/// author publishes without writing one.
pub fn excerpt_from_content(content: &str) -> String {
    let plain = strip_all_html(content);
    let collapsed = plain.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= EXCERPT_CHARS {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(EXCERPT_CHARS).collect();
    format!("{}…", cut.trim_end())
}

/// Renders stored (already sanitized) Markdown to HTML for readers.
pub fn render_markdown(markdown_input: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown_input, options);
    let mut rendered = String::new();
    html::push_html(&mut rendered, parser);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_outside_code_blocks_is_escaped() {
        let input = "<script>alert(1)</script>\n```\n<b>kept</b>\n```";
        let output = sanitize_markdown_content(input);
        assert!(output.starts_with("&lt;script&gt;"));
        assert!(output.contains("<b>kept</b>"));
    }

    #[test]
    fn existing_entities_are_not_double_escaped() {
        assert_eq!(sanitize_markdown_content("a &amp; b"), "a &amp; b");
    }

    #[test]
    fn strip_all_html_keeps_text() {
        assert_eq!(strip_all_html("<em>Hello</em> world"), "Hello world");
    }

    #[test]
    fn short_content_becomes_the_whole_excerpt() {
        assert_eq!(excerpt_from_content("one\n\n two"), "one two");
    }

    #[test]
    fn long_content_is_cut_with_an_ellipsis() {
        let content = "word ".repeat(100);
        let excerpt = excerpt_from_content(&content);
        assert!(excerpt.ends_with('…'));
        assert!(excerpt.chars().count() <= EXCERPT_CHARS + 1);
    }

    #[test]
    fn markdown_renders_headings() {
        assert_eq!(render_markdown("# Title").trim(), "<h1>Title</h1>");
    }
}
