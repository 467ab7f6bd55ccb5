// src/project/preview.rs
use super::{find_file, GeneratedFile, ENTRY_PAGE_PATH, GLOBAL_STYLESHEET_PATH};
use serde::{Deserialize, Serialize};

pub const REACT_SCRIPT_URL: &str = "https://unpkg.com/react@18/umd/react.development.js";
pub const REACT_DOM_SCRIPT_URL: &str = "https://unpkg.com/react-dom@18/umd/react-dom.development.js";
pub const BABEL_SCRIPT_URL: &str = "https://unpkg.com/@babel/standalone/babel.min.js";

/// `sandbox` attribute of the preview iframe: scripts run, same-origin is denied.
pub const SANDBOX_PERMISSIONS: &str = "allow-scripts";
/// CSP header applied when the preview document is served on its own.
pub const SANDBOX_CSP: &str = "sandbox allow-scripts";

/// Message type posted to the embedding page when generated code throws.
pub const PREVIEW_ERROR_MESSAGE: &str = "preview-error";

/// The three inputs of the single-document preview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSlots {
    pub html: String,
    pub css: String,
    pub js: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewSlot {
    Css,
    Js,
}

impl PreviewSlot {
    /// Which slot a file path feeds, if any.
    pub fn for_path(path: &str) -> Option<Self> {
        match path {
            ENTRY_PAGE_PATH => Some(PreviewSlot::Js),
            GLOBAL_STYLESHEET_PATH => Some(PreviewSlot::Css),
            _ => None,
        }
    }
}

impl PreviewSlots {
    /// Mirrors an edit into the slot fed by `path`. Returns the slot touched.
    pub fn apply_edit(&mut self, path: &str, content: &str) -> Option<PreviewSlot> {
        let slot = PreviewSlot::for_path(path)?;
        match slot {
            PreviewSlot::Js => self.js = content.to_string(),
            PreviewSlot::Css => self.css = content.to_string(),
        }
        Some(slot)
    }
}

/// Picks the entry page and global stylesheet out of a file set.
pub fn project_preview(files: &[GeneratedFile]) -> PreviewSlots {
    let content_of = |path: &str| {
        find_file(files, path)
            .map(|file| file.content.clone())
            .unwrap_or_default()
    };

    PreviewSlots {
        html: String::new(),
        css: content_of(GLOBAL_STYLESHEET_PATH),
        js: content_of(ENTRY_PAGE_PATH),
    }
}

/// Wraps the slots into one self-contained HTML document for the sandbox.
///
/// The script slot runs through the in-browser transpiler inside a
/// `try`/`catch`; a thrown error is rendered in the document, written to the
/// console and posted to the embedding page.
pub fn render_sandbox_document(slots: &PreviewSlots) -> String {
    let mut doc = String::with_capacity(slots.css.len() + slots.html.len() + slots.js.len() + 1024);

    doc.push_str("<!DOCTYPE html>\n<html>\n  <head>\n    <meta charset=\"UTF-8\">\n    <style>");
    doc.push_str(&escape_closing_tag(&slots.css, "style"));
    doc.push_str("</style>\n  </head>\n  <body>\n");
    doc.push_str(&slots.html);
    doc.push('\n');
    for src in [REACT_SCRIPT_URL, REACT_DOM_SCRIPT_URL, BABEL_SCRIPT_URL] {
        doc.push_str("    <script src=\"");
        doc.push_str(src);
        doc.push_str("\"></script>\n");
    }
    doc.push_str("    <script type=\"text/babel\">\n      try {\n");
    doc.push_str(&escape_closing_tag(&slots.js, "script"));
    doc.push_str(";\n      } catch (error) {\n");
    doc.push_str(
        r#"        const errorContainer = document.createElement('div');
        errorContainer.style.color = 'red';
        errorContainer.style.fontFamily = 'monospace';
        const title = document.createElement('h3');
        title.textContent = 'Error in generated code:';
        const details = document.createElement('pre');
        details.textContent = String(error);
        errorContainer.appendChild(title);
        errorContainer.appendChild(details);
        document.body.appendChild(errorContainer);
        console.error(error);
"#,
    );
    doc.push_str("        window.parent.postMessage({ type: '");
    doc.push_str(PREVIEW_ERROR_MESSAGE);
    doc.push_str("', message: String(error) }, '*');\n");
    doc.push_str("      }\n    </script>\n  </body>\n</html>\n");

    doc
}

/// The `<iframe>` that hosts a preview document.
pub fn render_preview_frame(slots: &PreviewSlots) -> String {
    format!(
        r#"<iframe title="preview" sandbox="{}" srcdoc="{}" style="width: 100%; height: 100%; border: none;"></iframe>"#,
        SANDBOX_PERMISSIONS,
        escape_attribute(&render_sandbox_document(slots))
    )
}

// Inline code must not be able to close its own element early.
fn escape_closing_tag(source: &str, tag: &str) -> String {
    let needle = format!("</{}", tag);
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(index) = find_ascii_case_insensitive(rest, &needle) {
        out.push_str(&rest[..index]);
        out.push_str("<\\/");
        out.push_str(&rest[index + 2..index + needle.len()]);
        rest = &rest[index + needle.len()..];
    }
    out.push_str(rest);
    out
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_entry_page_and_stylesheet() {
        let files = vec![
            GeneratedFile::new("package.json", "{}"),
            GeneratedFile::new(ENTRY_PAGE_PATH, "function App() {}"),
            GeneratedFile::new(GLOBAL_STYLESHEET_PATH, "body { margin: 0; }"),
        ];
        let slots = project_preview(&files);
        assert_eq!(slots.html, "");
        assert_eq!(slots.js, "function App() {}");
        assert_eq!(slots.css, "body { margin: 0; }");
    }

    #[test]
    fn missing_files_project_to_empty_slots() {
        let slots = project_preview(&[GeneratedFile::new("README.md", "hi")]);
        assert_eq!(slots, PreviewSlots::default());
    }

    #[test]
    fn edit_only_touches_designated_paths() {
        let mut slots = PreviewSlots::default();
        assert_eq!(slots.apply_edit(ENTRY_PAGE_PATH, "js"), Some(PreviewSlot::Js));
        assert_eq!(slots.apply_edit(GLOBAL_STYLESHEET_PATH, "css"), Some(PreviewSlot::Css));
        assert_eq!(slots.apply_edit("app/layout.tsx", "ignored"), None);
        assert_eq!(
            slots,
            PreviewSlots {
                html: String::new(),
                css: "css".to_string(),
                js: "js".to_string(),
            }
        );
    }

    #[test]
    fn document_orders_style_runtime_and_guarded_script() {
        let slots = PreviewSlots {
            html: String::new(),
            css: "h1 { color: red; }".to_string(),
            js: "ReactDOM.render(<h1>Hi</h1>, document.body)".to_string(),
        };
        let doc = render_sandbox_document(&slots);

        let style = doc.find("<style>h1 { color: red; }</style>").unwrap();
        let react = doc.find(REACT_SCRIPT_URL).unwrap();
        let react_dom = doc.find(REACT_DOM_SCRIPT_URL).unwrap();
        let babel = doc.find(BABEL_SCRIPT_URL).unwrap();
        let inline = doc.find("<script type=\"text/babel\">").unwrap();
        let code = doc.find("ReactDOM.render(<h1>Hi</h1>, document.body);").unwrap();
        let catch = doc.find("} catch (error) {").unwrap();

        assert!(style < react && react < react_dom && react_dom < babel);
        assert!(babel < inline && inline < code && code < catch);
        assert!(doc.contains("console.error(error);"));
        assert!(doc.contains(PREVIEW_ERROR_MESSAGE));
    }

    #[test]
    fn inline_code_cannot_close_its_element() {
        let slots = PreviewSlots {
            html: String::new(),
            css: "</STYLE><script>alert(1)</script>".to_string(),
            js: "const s = '</script><b>';".to_string(),
        };
        let doc = render_sandbox_document(&slots);
        assert!(doc.contains("<\\/STYLE>"));
        assert!(doc.contains("const s = '<\\/script><b>';"));
        // Three runtime scripts, the inline script, and the harmless one inside <style>.
        assert_eq!(doc.matches("</script>").count(), 5);
        assert_eq!(doc.matches("</style>").count(), 1);
    }

    #[test]
    fn frame_is_sandboxed_without_same_origin() {
        let frame = render_preview_frame(&PreviewSlots::default());
        assert!(frame.starts_with("<iframe"));
        assert!(frame.contains(r#"sandbox="allow-scripts""#));
        assert!(!frame.contains("allow-same-origin"));
        assert!(frame.contains("srcdoc=\"&lt;!DOCTYPE html&gt;"));
    }
}
