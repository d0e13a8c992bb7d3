//! Stable identifiers derived from request content
//!
//! Resources without a natural remote key are identified by the CRC-32 of a
//! canonical rendering of their create request, so re-applying identical
//! configuration always derives the same identifier.

use std::fmt::Write;

/// CRC-32 (IEEE) of `s`
pub fn string_hashcode(s: &str) -> u32 {
    crc32fast::hash(s.as_bytes())
}

/// Decimal identifier for a canonical request string
pub fn identifier_for(canonical: &str) -> String {
    string_hashcode(canonical).to_string()
}

/// Node of a canonical request rendering
///
/// Struct fields keep their declaration order and unset fields are left out,
/// so two requests render identically exactly when they carry the same data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalNode {
    String(String),
    List(Vec<CanonicalNode>),
    Struct(Vec<(&'static str, CanonicalNode)>),
}

impl CanonicalNode {
    pub fn string(s: impl Into<String>) -> Self {
        CanonicalNode::String(s.into())
    }

    /// Struct builder that skips `None` fields
    pub fn fields() -> StructBuilder {
        StructBuilder { fields: Vec::new() }
    }

    /// Multi-line rendering used as hash input
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        match self {
            CanonicalNode::String(s) => {
                let _ = write!(out, "{:?}", s);
            }
            CanonicalNode::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.render_into(out, depth);
                }
                out.push(']');
            }
            CanonicalNode::Struct(fields) => {
                out.push_str("{\n");
                for (i, (name, value)) in fields.iter().enumerate() {
                    indent(out, depth + 1);
                    let _ = write!(out, "{}: ", name);
                    value.render_into(out, depth + 1);
                    if i + 1 < fields.len() {
                        out.push(',');
                    }
                    out.push('\n');
                }
                indent(out, depth);
                out.push('}');
            }
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

/// Collects the set fields of a struct node
pub struct StructBuilder {
    fields: Vec<(&'static str, CanonicalNode)>,
}

impl StructBuilder {
    pub fn field(mut self, name: &'static str, value: Option<CanonicalNode>) -> Self {
        if let Some(value) = value {
            self.fields.push((name, value));
        }
        self
    }

    pub fn string(self, name: &'static str, value: Option<&str>) -> Self {
        self.field(name, value.map(CanonicalNode::string))
    }

    pub fn build(self) -> CanonicalNode {
        CanonicalNode::Struct(self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashcode_matches_crc32_ieee() {
        assert_eq!(string_hashcode("hello"), 0x3610_a686);
        assert_eq!(identifier_for("hello"), "907060870");
        assert_eq!(string_hashcode(""), 0);
    }

    #[test]
    fn render_skips_unset_fields() {
        let node = CanonicalNode::fields()
            .field(
                "TableData",
                Some(
                    CanonicalNode::fields()
                        .string("DatabaseName", Some("db"))
                        .string("RowFilter", None)
                        .field(
                            "Columns",
                            Some(CanonicalNode::List(vec![
                                CanonicalNode::string("a"),
                                CanonicalNode::string("b"),
                            ])),
                        )
                        .build(),
                ),
            )
            .build();

        assert_eq!(
            node.render(),
            "{\n  TableData: {\n    DatabaseName: \"db\",\n    Columns: [\"a\",\"b\"]\n  }\n}"
        );
    }

    #[test]
    fn empty_struct_renders_braces() {
        assert_eq!(CanonicalNode::fields().build().render(), "{\n}");
    }
}
