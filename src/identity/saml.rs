//! SAML token helpers.
//!
//! Only the envelope matters here: is a value a base64 SAML document, and
//! what is its assertion. Signatures are the identity provider's business.

use base64::{engine::general_purpose::STANDARD, Engine as _};

pub trait SamlDecoder: Send + Sync {
    /// True when `encoded` is base64 of a SAML `Response` or `Assertion`.
    fn is_saml_token(&self, encoded: &str) -> bool;

    /// Base64 (no line breaks) of the assertion inside `encoded`.
    fn extract_assertion(&self, encoded: &str) -> Option<String>;
}

/// Textual decoder working on the raw XML.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlSamlDecoder;

impl SamlDecoder for XmlSamlDecoder {
    fn is_saml_token(&self, encoded: &str) -> bool {
        decode_xml(encoded)
            .and_then(|xml| root_element(&xml).map(|root| root.local))
            .is_some_and(|local| local == "Response" || local == "Assertion")
    }

    fn extract_assertion(&self, encoded: &str) -> Option<String> {
        let xml = decode_xml(encoded)?;
        let root = root_element(&xml)?;
        let assertion = match root.local.as_str() {
            "Assertion" => element_at(&xml, root.start, &root.qualified)?,
            "Response" => {
                let (start, qualified) = find_element(&xml, root.end, "Assertion")?;
                element_at(&xml, start, &qualified)?
            }
            _ => return None,
        };
        Some(STANDARD.encode(assertion.as_bytes()))
    }
}

fn decode_xml(encoded: &str) -> Option<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact).ok()?;
    String::from_utf8(bytes).ok()
}

struct Element {
    start: usize,
    end: usize,
    qualified: String,
    local: String,
}

/// First element of the document, skipping prolog, comments and doctype.
fn root_element(xml: &str) -> Option<Element> {
    let mut pos = 0;
    while let Some(offset) = xml[pos..].find('<') {
        let start = pos + offset;
        let rest = &xml[start..];
        if rest.starts_with("<?") {
            pos = start + rest.find("?>")? + 2;
        } else if rest.starts_with("<!--") {
            pos = start + rest.find("-->")? + 3;
        } else if rest.starts_with("<!") {
            pos = start + rest.find('>')? + 1;
        } else {
            let qualified = tag_name(&rest[1..])?;
            let end = tag_end(xml, start)? + 1;
            let local = local_name(&qualified).to_string();
            return Some(Element {
                start,
                end,
                qualified,
                local,
            });
        }
    }
    None
}

/// First element with local name `local` at or after `from`.
fn find_element(xml: &str, from: usize, local: &str) -> Option<(usize, String)> {
    let mut pos = from;
    while let Some(offset) = xml[pos..].find('<') {
        let start = pos + offset;
        if let Some(name) = tag_name(&xml[start + 1..]) {
            if local_name(&name) == local {
                return Some((start, name));
            }
        }
        pos = start + 1;
    }
    None
}

/// Slice from the open tag at `start` through its matching close tag.
///
/// Nested elements of the same name are balanced.
fn element_at<'a>(xml: &'a str, start: usize, qualified: &str) -> Option<&'a str> {
    let open_end = tag_end(xml, start)?;
    if xml[start..open_end].trim_end().ends_with('/') {
        return Some(&xml[start..=open_end]);
    }

    let mut depth = 1usize;
    let mut pos = open_end + 1;
    while let Some(offset) = xml[pos..].find('<') {
        let at = pos + offset;
        let end = tag_end(xml, at)?;
        let tag = &xml[at + 1..end];
        if let Some(closing) = tag.strip_prefix('/') {
            if closing.trim_end() == qualified {
                depth -= 1;
                if depth == 0 {
                    return Some(&xml[start..=end]);
                }
            }
        } else if tag_name(tag).as_deref() == Some(qualified) && !tag.trim_end().ends_with('/') {
            depth += 1;
        }
        pos = end + 1;
    }
    None
}

/// Index of the `>` closing the tag opened at `start`, skipping quoted
/// attribute values.
fn tag_end(xml: &str, start: usize) -> Option<usize> {
    let mut quote = None;
    for (i, c) in xml[start..].char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            (None, '>') => return Some(start + i),
            _ => {}
        }
    }
    None
}

fn tag_name(after_lt: &str) -> Option<String> {
    let name: String = after_lt
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '>' && *c != '/')
        .collect();
    if name.is_empty() || name.starts_with(['!', '?', '/']) {
        None
    } else {
        Some(name)
    }
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}
