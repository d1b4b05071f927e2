use pulldown_cmark::{html, Event, Options, Parser};

const EXCERPT_WORDS: usize = 45;

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Render post content to HTML that is safe to embed unescaped.
pub fn render(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, options());
    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);
    ammonia::clean(&html_output)
}

/// Plain-text teaser for list pages: the first words of the rendered text.
pub fn excerpt(markdown: &str) -> String {
    let mut text = String::new();
    for event in Parser::new_ext(markdown, options()) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak | Event::End(_) => text.push(' '),
            _ => {}
        }
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > EXCERPT_WORDS {
        format!("{} …", words[..EXCERPT_WORDS].join(" "))
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_basic_markdown() {
        let html = render("# Title\n\nSome *emphasis*.");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>emphasis</em>"));
    }

    #[test]
    fn strips_script_tags() {
        let html = render("hello <script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("hello"));
    }

    #[test]
    fn excerpt_is_plain_text() {
        assert_eq!(excerpt("# Head\n\nBody **bold** `code`"), "Head Body bold code");
    }

    #[test]
    fn excerpt_truncates_long_content() {
        let long = "word ".repeat(100);
        let short = excerpt(&long);
        assert!(short.ends_with('…'));
        assert_eq!(short.split_whitespace().count(), EXCERPT_WORDS + 1);
    }
}
