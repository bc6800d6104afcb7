//! Script handling after injection.
//!
//! Markup assigned as content does not run its `<script>` elements. When scripts are allowed,
//! each one is rebuilt from scratch (allowlisted attributes plus inline text) and handed to the
//! host to execute. When they are not, every `<script>` is removed outright.

use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str, text};
use std::cell::{Cell, RefCell};

/// Attributes copied onto a re-created script element.
pub const MATERIALIZED_SCRIPT_ATTRIBUTES: &[&str] =
    &["src", "async", "defer", "type", "charset", "id"];

/// A freshly built script element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    pub attributes: Vec<(String, String)>,
    pub text: String,
}

impl Script {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn src(&self) -> Option<&str> {
        self.attribute("src")
    }

    pub fn is_inline(&self) -> bool {
        self.src().is_none()
    }

    pub fn to_markup(&self) -> String {
        let mut out = String::from("<script");
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            if !value.is_empty() {
                out.push_str("=\"");
                out.push_str(&htmlize::escape_attribute(value));
                out.push('"');
            }
        }
        out.push('>');
        out.push_str(&self.text);
        out.push_str("</script>");
        out
    }
}

fn collect_scripts(html: &str) -> Result<Vec<Script>, lol_html::errors::RewritingError> {
    let scripts = RefCell::new(Vec::<Script>::new());
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("script", |el| {
                    let attributes = el
                        .attributes()
                        .iter()
                        .filter_map(|a| {
                            let name = a.name().to_ascii_lowercase();
                            MATERIALIZED_SCRIPT_ATTRIBUTES
                                .contains(&name.as_str())
                                .then(|| (name, htmlize::unescape(a.value()).into_owned()))
                        })
                        .collect();
                    scripts.borrow_mut().push(Script {
                        attributes,
                        text: String::new(),
                    });
                    Ok(())
                }),
                text!("script", |chunk| {
                    if let Some(last) = scripts.borrow_mut().last_mut() {
                        last.text.push_str(chunk.as_str());
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )?;
    Ok(scripts.into_inner())
}

/// Replaces every `<script>` with a re-created one and returns them in document order.
pub fn materialize(html: &str) -> Result<(String, Vec<Script>), lol_html::errors::RewritingError> {
    let scripts = collect_scripts(html)?;
    if scripts.is_empty() {
        return Ok((html.to_string(), scripts));
    }

    let index = Cell::new(0usize);
    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("script", |el| {
                let i = index.get();
                index.set(i + 1);
                if let Some(script) = scripts.get(i) {
                    el.replace(&script.to_markup(), ContentType::Html);
                } else {
                    el.remove();
                }
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    )?;
    Ok((rewritten, scripts))
}

/// Removes every `<script>` element together with its content.
pub fn remove_scripts(html: &str) -> Result<String, lol_html::errors::RewritingError> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("script", |el| {
                el.remove();
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_copies_only_allowlisted_attributes() {
        let html = r#"<p>x</p><script src="https://cdn.example/a.js" async nonce="n" data-x="1"></script><script type="module">init({ a: 1 < 2 });</script>"#;
        let (out, scripts) = materialize(html).unwrap();
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].src(), Some("https://cdn.example/a.js"));
        assert_eq!(
            scripts[0].attributes,
            vec![
                ("src".to_string(), "https://cdn.example/a.js".to_string()),
                ("async".to_string(), String::new()),
            ]
        );
        assert!(scripts[1].is_inline());
        assert_eq!(scripts[1].text, "init({ a: 1 < 2 });");
        assert_eq!(
            out,
            r#"<p>x</p><script src="https://cdn.example/a.js" async></script><script type="module">init({ a: 1 < 2 });</script>"#
        );
    }

    #[test]
    fn no_scripts_means_no_rewrite() {
        let (out, scripts) = materialize("<p>plain</p>").unwrap();
        assert_eq!(out, "<p>plain</p>");
        assert!(scripts.is_empty());
    }

    #[test]
    fn remove_scripts_drops_elements_and_content() {
        assert_eq!(
            remove_scripts("<p>a</p><script>alert(1)</script><SCRIPT src=x></SCRIPT><p>b</p>")
                .unwrap(),
            "<p>a</p><p>b</p>"
        );
    }
}
