//! HTML fragment codec
//!
//! Block content arrives as rendered HTML5 fragments. They are tokenized with
//! quick-xml in a lenient configuration (no end-name checks, HTML attribute
//! rules, void elements closed implicitly) and materialized into the arena.
//! Serialization writes the arena back out as HTML.

use crate::dom::{Dom, NodeId, NodeKind};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HtmlError {
    #[error("Malformed markup at byte {position}: {message}")]
    Malformed { position: u64, message: String },
}

pub type HtmlResult<T> = Result<T, HtmlError>;

/// Elements that never have content or an end tag
pub fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}

/// Escape plain text for inclusion in markup
pub fn escape_text(text: &str) -> String {
    quick_xml::escape::partial_escape(text).into_owned()
}

fn is_raw_text_element(tag: &str) -> bool {
    matches!(tag, "script" | "style")
}

/// Parse `markup` and append the resulting nodes under `parent`.
///
/// On a tokenizer error the nodes built so far stay in place and the error is
/// returned; callers treat that as a degraded but usable fragment.
pub fn parse_fragment(dom: &mut Dom, parent: NodeId, markup: &str) -> HtmlResult<usize> {
    let mut reader = Reader::from_str(markup);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.expand_empty_elements = false;
    }

    let mut stack: Vec<NodeId> = vec![parent];
    let mut appended = 0usize;

    loop {
        let current = *stack.last().unwrap_or(&parent);
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                let element = dom.create_element(tag.clone());
                for (name, value) in collect_attributes(&e) {
                    dom.set_attr(element, &name, value);
                }
                dom.append_child(current, element);
                appended += 1;
                if !is_void_element(&tag) {
                    stack.push(element);
                }
            }
            Ok(Event::Empty(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                let element = dom.create_element(tag);
                for (name, value) in collect_attributes(&e) {
                    dom.set_attr(element, &name, value);
                }
                dom.append_child(current, element);
                appended += 1;
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if is_void_element(&tag) {
                    continue;
                }
                // Close up to the nearest matching open element; stray end
                // tags are dropped.
                if let Some(depth) = stack
                    .iter()
                    .skip(1)
                    .rposition(|&open| dom.tag(open) == Some(tag.as_str()))
                {
                    stack.truncate(depth + 1);
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.decode().map_err(|err| HtmlError::Malformed {
                    position: reader.buffer_position() as u64,
                    message: format!("Decode error: {:?}", err),
                })?;
                appended += push_text(dom, current, text.as_ref());
            }
            Ok(Event::GeneralRef(e)) => {
                let name = e.decode().map_err(|err| HtmlError::Malformed {
                    position: reader.buffer_position() as u64,
                    message: format!("Decode error: {:?}", err),
                })?;
                let resolved = resolve_entity(name.as_ref());
                appended += push_text(dom, current, resolved.as_ref());
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                appended += push_text(dom, current, &text);
            }
            Ok(Event::Comment(e)) => {
                let comment = dom.create_comment(String::from_utf8_lossy(&e).into_owned());
                dom.append_child(current, comment);
                appended += 1;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(HtmlError::Malformed {
                    position: reader.buffer_position() as u64,
                    message: err.to_string(),
                });
            }
        }
    }

    Ok(appended)
}

/// Append text under `parent`, merging with a trailing text node so that
/// entity boundaries do not split text runs
fn push_text(dom: &mut Dom, parent: NodeId, text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    if let Some(last) = dom.last_child(parent) {
        if dom.append_to_text(last, text) {
            return 0;
        }
    }
    let node = dom.create_text(text);
    dom.append_child(parent, node);
    1
}

fn collect_attributes(e: &quick_xml::events::BytesStart<'_>) -> Vec<(String, String)> {
    e.html_attributes()
        .flatten()
        .map(|attr| {
            let name = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            let raw = String::from_utf8_lossy(attr.value.as_ref()).into_owned();
            let value = match quick_xml::escape::unescape(&raw) {
                Ok(unescaped) => unescaped.into_owned(),
                Err(_) => raw,
            };
            (name, value)
        })
        .collect()
}

/// Resolve an entity reference by name. XML and numeric references go
/// through quick-xml; the handful of HTML named entities renderers commonly
/// emit are mapped here. Anything else is kept verbatim.
fn resolve_entity(name: &str) -> Cow<'static, str> {
    let html = match name {
        "nbsp" => Some("\u{a0}"),
        "ndash" => Some("\u{2013}"),
        "mdash" => Some("\u{2014}"),
        "hellip" => Some("\u{2026}"),
        "lsquo" => Some("\u{2018}"),
        "rsquo" => Some("\u{2019}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        "copy" => Some("\u{a9}"),
        "shy" => Some("\u{ad}"),
        _ => None,
    };
    if let Some(text) = html {
        return Cow::Borrowed(text);
    }
    let entity = format!("&{};", name);
    match quick_xml::escape::unescape(&entity) {
        Ok(resolved) => Cow::Owned(resolved.into_owned()),
        Err(_) => Cow::Owned(entity),
    }
}

impl Dom {
    /// Replace the children of `id` with the parsed `markup`
    pub fn set_inner_html(&mut self, id: NodeId, markup: &str) -> HtmlResult<usize> {
        self.clear_children(id);
        parse_fragment(self, id, markup)
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        let raw = self.tag(id).map(is_raw_text_element).unwrap_or(false);
        for &child in self.children(id) {
            write_node(self, child, raw, &mut out);
        }
        out
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        write_node(self, id, false, &mut out);
        out
    }
}

fn write_node(dom: &Dom, id: NodeId, raw_text: bool, out: &mut String) {
    match dom.kind(id) {
        Some(NodeKind::Element { tag, attributes }) => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attributes {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&quick_xml::escape::escape(value.as_str()));
                out.push('"');
            }
            if is_void_element(tag) {
                out.push_str(" />");
                return;
            }
            out.push('>');
            let raw = is_raw_text_element(tag);
            for &child in dom.children(id) {
                write_node(dom, child, raw, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        Some(NodeKind::Text { content }) => {
            if raw_text {
                out.push_str(content);
            } else {
                out.push_str(&quick_xml::escape::partial_escape(content.as_str()));
            }
        }
        Some(NodeKind::Comment { content }) => {
            out.push_str("<!--");
            out.push_str(content);
            out.push_str("-->");
        }
        None => {}
    }
}
