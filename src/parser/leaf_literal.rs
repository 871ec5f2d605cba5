//! Leaf-literal wrapping pass.
//!
//! Generated answers are not guaranteed to be well-formed markup: a leaf such as
//! `<reasoning>rent < $900 & late</reasoning>` would break a strict parser. Before
//! strict parsing, the body of every immediate child element is wrapped in CDATA so
//! it is read back as opaque text.
//!
//! A leaf runs from its opening tag to the first closing tag with the same name.
//! Nesting same-named elements is not supported: anything between the two tags is
//! literal text of the leaf. Fragments that do not form a closed leaf are copied
//! through untouched and left for the strict parser to reject.

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

struct LeafSpan<'a> {
    open_tag: &'a str,
    name: &'a str,
    body: &'a str,
    consumed: usize,
}

/// Rewrite `content` so each closed leaf element's body is CDATA.
pub fn wrap_leaf_literals(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + 64);
    let mut rest = content;

    while let Some(open_at) = rest.find('<') {
        out.push_str(&rest[..open_at]);
        let candidate = &rest[open_at..];
        match leaf_span(candidate) {
            Some(leaf) => {
                out.push_str(leaf.open_tag);
                push_cdata(&mut out, leaf.body);
                out.push_str("</");
                out.push_str(leaf.name);
                out.push('>');
                rest = &candidate[leaf.consumed..];
            }
            None => {
                out.push('<');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn leaf_span(candidate: &str) -> Option<LeafSpan<'_>> {
    let gt = candidate.find('>')?;
    let inner = &candidate[1..gt];
    if inner.starts_with(['/', '!', '?']) || inner.ends_with('/') {
        return None;
    }

    let name = inner
        .split(|c: char| c.is_whitespace())
        .next()
        .filter(|name| is_tag_name(name))?;

    let body_start = gt + 1;
    let close_tag = format!("</{}>", name);
    let close_at = candidate[body_start..].find(&close_tag)?;

    Some(LeafSpan {
        open_tag: &candidate[..body_start],
        name,
        body: &candidate[body_start..body_start + close_at],
        consumed: body_start + close_at + close_tag.len(),
    })
}

fn is_tag_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

fn push_cdata(out: &mut String, body: &str) {
    out.push_str(CDATA_OPEN);
    // `]]>` cannot appear inside a CDATA section; split it across two sections.
    out.push_str(&body.replace(CDATA_CLOSE, "]]]]><![CDATA[>"));
    out.push_str(CDATA_CLOSE);
}
