//! reStructuredText rendering for post bodies.
//!
//! Top-level `.. sourcecode:: <language>` (or `code-block`) directives are
//! cut out of the document and highlighted separately; everything between
//! them goes through the reStructuredText renderer as an HTML fragment.
//! Highlighted blocks come out as `<div class="highlight"><pre>...</pre></div>`
//! with one CSS class per scope, so any stylesheet for those classes applies.

use once_cell::sync::Lazy;
use regex::Regex;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::error::{QuillError, QuillResult};

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static SOURCECODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.\.\s+(?:sourcecode|code-block)::\s*(\S*)\s*$").unwrap());

#[derive(Debug, PartialEq)]
enum Segment {
    Text(String),
    Code { language: String, source: String },
}

/// Render a reStructuredText document to an HTML fragment.
pub fn rst_to_html(source: &str) -> QuillResult<String> {
    let mut html = String::new();
    for segment in split(source) {
        match segment {
            Segment::Text(text) if text.trim().is_empty() => {}
            Segment::Text(text) => html.push_str(&render_rst(&text)?),
            Segment::Code { language, source } => html.push_str(&highlight(&source, &language)?),
        }
    }
    Ok(html)
}

fn render_rst(text: &str) -> QuillResult<String> {
    let document = rst_parser::parse(text)
        .map_err(|e| QuillError::parse(format!("reStructuredText: {}", e)))?;
    let mut out = Vec::new();
    rst_renderer::render_html(&document, &mut out, false)
        .map_err(|e| QuillError::parse(format!("reStructuredText: {}", e)))?;
    String::from_utf8(out).map_err(|e| QuillError::parse(e.to_string()))
}

/// Highlight `code`, falling back to plain text for unknown languages.
fn highlight(code: &str, language: &str) -> QuillResult<String> {
    let syntax = SYNTAXES
        .find_syntax_by_token(language)
        .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());
    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAXES, ClassStyle::Spaced);
    for line in LinesWithEndings::from(code) {
        generator
            .parse_html_for_line_which_includes_newline(line)
            .map_err(|e| QuillError::parse(format!("highlighting {}: {}", language, e)))?;
    }
    Ok(format!(
        "<div class=\"highlight\"><pre>{}</pre></div>\n",
        generator.finalize()
    ))
}

fn split(source: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut lines = source.lines().peekable();

    while let Some(line) = lines.next() {
        let Some(caps) = SOURCECODE.captures(line) else {
            text.push_str(line);
            text.push('\n');
            continue;
        };

        let mut block = Vec::new();
        while let Some(next) = lines.peek() {
            if !next.trim().is_empty() && !next.starts_with(char::is_whitespace) {
                break;
            }
            block.push(*next);
            lines.next();
        }
        let options = block
            .iter()
            .take_while(|l| l.trim_start().starts_with(':'))
            .count();

        if !text.is_empty() {
            segments.push(Segment::Text(std::mem::take(&mut text)));
        }
        segments.push(Segment::Code {
            language: caps[1].to_string(),
            source: dedent(&block[options..]),
        });
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    segments
}

/// Strip common indentation and surrounding blank lines.
fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let stripped: Vec<&str> = lines
        .iter()
        .map(|l| if l.trim().is_empty() { "" } else { &l[indent..] })
        .collect();

    let start = stripped.iter().position(|l| !l.is_empty()).unwrap_or(stripped.len());
    let end = stripped.iter().rposition(|l| !l.is_empty()).map_or(start, |i| i + 1);
    let mut code = stripped[start..end].join("\n");
    code.push('\n');
    code
}
