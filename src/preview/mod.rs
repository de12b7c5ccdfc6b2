//! Preview composition.
//!
//! [`compose`] merges the markup, style and script files of a project into one
//! self-contained document and injects the console bridge the sandbox host
//! listens to. It is a pure function of the files it is given.

use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::wire::{SourceFile, SourceKind};

/// Rendered when a project has no markup file yet.
pub const PLACEHOLDER_DOCUMENT: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Preview</title>
<style>body { font-family: system-ui, sans-serif; display: grid; place-items: center; min-height: 100vh; margin: 0; color: #64748b; }</style>
</head>
<body>
<p>Nothing to preview yet. Add an HTML file to see your site here.</p>
</body>
</html>
"#;

/// Redefines the console methods so every call is also posted to the parent
/// frame as `{ type: "console", level, payload }`. Uncaught errors are
/// forwarded as `error` entries.
pub const CONSOLE_BRIDGE: &str = r#"<script data-sitegen="console-bridge">
(function () {
  function fmt(v) {
    if (typeof v === "string") return v;
    if (v instanceof Error) return v.name + ": " + v.message;
    try { var s = JSON.stringify(v); return s === undefined ? String(v) : s; } catch (e) { return String(v); }
  }
  function post(level, args) {
    try { window.parent.postMessage({ type: "console", level: level, payload: args.map(fmt).join(" ") }, "*"); } catch (e) {}
  }
  ["log", "info", "warn", "error", "debug"].forEach(function (level) {
    var original = console[level];
    console[level] = function () {
      var args = Array.prototype.slice.call(arguments);
      post(level, args);
      if (original) original.apply(console, args);
    };
  });
  window.addEventListener("error", function (ev) {
    post("error", [ev.message + (ev.lineno ? " (line " + ev.lineno + ")" : "")]);
  });
})();
</script>
"#;

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<link\b[^>]*>\s*").expect("valid link regex"))
}

fn external_script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<script\b[^>]*\bsrc\s*=[^>]*>\s*</script\s*>\s*").expect("valid script regex"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)\b(?:href|src)\s*=\s*["']([^"']*)["']"#).expect("valid attribute regex"))
}

fn head_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<head\b[^>]*>").expect("valid head regex"))
}

fn html_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<html\b[^>]*>").expect("valid html regex"))
}

/// Target of the tag's `href`/`src`, normalized the way file names are.
fn tag_target(tag: &str) -> Option<String> {
    let raw = attr_re().captures(tag)?.get(1)?.as_str().trim();
    let raw = raw.split(['?', '#']).next().unwrap_or(raw);
    Some(raw.trim_start_matches("./").to_string())
}

/// Drop `<link>`/`<script src>` tags that point at files being inlined.
fn strip_inlined_references(doc: &str, inlined: &HashSet<&str>) -> String {
    let doc = drop_matching_tags(link_re(), doc, inlined);
    drop_matching_tags(external_script_re(), &doc, inlined)
}

fn drop_matching_tags(re: &Regex, doc: &str, inlined: &HashSet<&str>) -> String {
    re.replace_all(doc, |caps: &Captures| {
        let tag = &caps[0];
        match tag_target(tag) {
            Some(t) if inlined.contains(t.as_str()) => String::new(),
            _ => tag.to_string(),
        }
    })
    .into_owned()
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

fn rfind_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().rfind(needle)
}

fn pick_markup(files: &[SourceFile]) -> Option<&SourceFile> {
    files
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case("index.html"))
        .or_else(|| files.iter().find(|f| f.kind() == Some(SourceKind::Markup)))
}

/// Compose a project into one executable document.
///
/// Style files are inlined before `</head>`, script files before `</body>`,
/// each in file order, and the console bridge runs before any of the
/// document's own scripts. Without a markup file the placeholder document
/// is returned.
pub fn compose(files: &[SourceFile]) -> String {
    let Some(markup) = pick_markup(files) else {
        return PLACEHOLDER_DOCUMENT.to_string();
    };
    let styles: Vec<&SourceFile> = files.iter().filter(|f| f.kind() == Some(SourceKind::Style)).collect();
    let scripts: Vec<&SourceFile> = files.iter().filter(|f| f.kind() == Some(SourceKind::Script)).collect();
    let inlined: HashSet<&str> = styles.iter().chain(scripts.iter()).map(|f| f.name.as_str()).collect();

    let mut doc = strip_inlined_references(&markup.content, &inlined);

    // Console bridge first, so it wraps console before page scripts run.
    let bridge_at = head_open_re()
        .find(&doc)
        .or_else(|| html_open_re().find(&doc))
        .map(|m| m.end())
        .unwrap_or(0);
    doc.insert_str(bridge_at, CONSOLE_BRIDGE);

    if !styles.is_empty() {
        let block: String = styles
            .iter()
            .map(|f| format!("<style data-source=\"{}\">\n{}\n</style>\n", escape_html(&f.name), f.content))
            .collect();
        let at = find_ci(&doc, "</head>")
            .or_else(|| find_ci(&doc, "<body"))
            .unwrap_or(bridge_at + CONSOLE_BRIDGE.len());
        doc.insert_str(at, &block);
    }

    if !scripts.is_empty() {
        let block: String = scripts
            .iter()
            .map(|f| format!("<script data-source=\"{}\">\n{}\n</script>\n", escape_html(&f.name), f.content))
            .collect();
        match rfind_ci(&doc, "</body>").or_else(|| rfind_ci(&doc, "</html>")) {
            Some(at) => doc.insert_str(at, &block),
            None => doc.push_str(&block),
        }
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn three(html: &str) -> Vec<SourceFile> {
        vec![
            SourceFile::new("index.html", html),
            SourceFile::new("style.css", "h1 { color: teal; }"),
            SourceFile::new("script.js", "console.log('ready');"),
        ]
    }

    const PAGE: &str = "<!DOCTYPE html><html><head><title>T</title></head><body><h1>Hi</h1></body></html>";

    #[test]
    fn no_markup_gives_placeholder() {
        assert_eq!(compose(&[]), PLACEHOLDER_DOCUMENT);
        assert_eq!(
            compose(&[SourceFile::new("style.css", "p{}"), SourceFile::new("a.js", "")]),
            PLACEHOLDER_DOCUMENT
        );
    }

    #[test]
    fn style_lands_before_head_close_and_script_before_body_close() {
        let doc = compose(&three(PAGE));
        let style = doc.find("h1 { color: teal; }").unwrap();
        let head_close = doc.find("</head>").unwrap();
        let script = doc.find("console.log('ready');").unwrap();
        let body_close = doc.find("</body>").unwrap();
        assert!(style < head_close);
        assert!(head_close < script && script < body_close);
        assert_eq!(doc.matches("h1 { color: teal; }").count(), 1);
        assert_eq!(doc.matches("console.log('ready');").count(), 1);
    }

    #[test]
    fn bridge_runs_before_page_scripts() {
        let html = "<html><head><script>console.log('early')</script></head><body></body></html>";
        let doc = compose(&three(html));
        assert!(doc.find("console-bridge").unwrap() < doc.find("console.log('early')").unwrap());
        assert_eq!(doc.matches("console-bridge").count(), 1);
    }

    #[test]
    fn compose_is_idempotent() {
        let files = three(PAGE);
        assert_eq!(compose(&files), compose(&files));
    }

    #[test]
    fn local_references_to_inlined_files_are_removed() {
        let html = r#"<html><head><link rel="stylesheet" href="./style.css"><link rel="icon" href="favicon.ico"></head><body><script src="script.js"></script><script src="https://cdn.example.com/lib.js"></script></body></html>"#;
        let doc = compose(&three(html));
        assert!(!doc.contains(r#"href="./style.css""#));
        assert!(!doc.contains(r#"src="script.js""#));
        assert!(doc.contains("favicon.ico"));
        assert!(doc.contains("https://cdn.example.com/lib.js"));
    }

    #[test]
    fn fragment_without_head_or_body_still_composes() {
        let doc = compose(&three("<h1>Bare</h1>"));
        assert!(doc.starts_with(CONSOLE_BRIDGE));
        assert!(doc.contains("<style data-source=\"style.css\">"));
        assert!(doc.trim_end().ends_with("</script>"));
    }

    #[test]
    fn index_html_is_preferred_markup() {
        let files = vec![
            SourceFile::new("about.html", "<p>about</p>"),
            SourceFile::new("index.html", "<p>home</p>"),
        ];
        let doc = compose(&files);
        assert!(doc.contains("<p>home</p>"));
        assert!(!doc.contains("<p>about</p>"));
    }

    #[test]
    fn escape_html_covers_attribute_characters() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
