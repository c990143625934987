// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Placeholder substitution and XPath-value normalization, standing in
//! for dynamic dispatch / duck typing over extracted values.

use std::collections::BTreeMap;

use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value};
use thiserror::Error;

/// The XPath engine returns heterogeneous values (nodeset, string, number,
/// boolean). This collapses that into the normalized `string | [string]`
/// shape the Parser actually consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Scalar(String),
    List(Vec<String>),
}

impl Extracted {
    pub fn into_scalar(self) -> String {
        match self {
            Extracted::Scalar(s) => s,
            Extracted::List(items) => items.join(""),
        }
    }

    pub fn into_list(self) -> Vec<String> {
        match self {
            Extracted::Scalar(s) if s.is_empty() => Vec::new(),
            Extracted::Scalar(s) => vec![s],
            Extracted::List(items) => items,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid xpath expression {expr:?}")]
    InvalidExpression { expr: String, source: sxd_xpath::ParserError },
    #[error("xpath expression {expr:?} did not parse to a usable path")]
    EmptyExpression { expr: String },
    #[error("xpath evaluation failed for {expr:?}")]
    Evaluation { expr: String, source: sxd_xpath::ExecutionError },
}

/// Evaluate `expr` against `node`, collapsing the result per [`Extracted`].
///
/// A node-set result is mapped to the string-value of each node. If every
/// resulting string has length 1 (e.g. `string(...)` applied per node
/// over a sequence of single characters) they are joined without a
/// separator into a scalar, matching the documented edge case; otherwise
/// they are kept as a list. An empty result yields an empty scalar string.
pub fn evaluate<'d>(node: Node<'d>, expr: &str, factory: &Factory) -> Result<Extracted, Error> {
    if expr.trim().is_empty() {
        return Ok(Extracted::Scalar(String::new()));
    }

    let xpath = factory
        .build(expr)
        .map_err(|source| Error::InvalidExpression { expr: expr.to_owned(), source })?
        .ok_or_else(|| Error::EmptyExpression { expr: expr.to_owned() })?;

    let context = Context::new();
    let value = xpath
        .evaluate(&context, node)
        .map_err(|source| Error::Evaluation { expr: expr.to_owned(), source })?;

    Ok(match value {
        Value::Nodeset(nodes) => {
            let strings: Vec<String> = nodes.document_order().into_iter().map(|n| n.string_value()).collect();
            if strings.is_empty() {
                Extracted::Scalar(String::new())
            } else if strings.iter().all(|s| s.chars().count() == 1) {
                Extracted::Scalar(strings.concat())
            } else {
                Extracted::List(strings)
            }
        }
        Value::String(s) => Extracted::Scalar(s),
        Value::Number(n) => Extracted::Scalar(n.to_string()),
        Value::Boolean(b) => Extracted::Scalar(b.to_string()),
    })
}

/// Replace `{k}` tokens with previously extracted scalar values, and
/// `{xpath_index}` with the 1-based, zero-padded-to-4-digits, XPath
/// string-literal-quoted enumeration index.
pub fn substitute(expr: &str, context: &BTreeMap<String, String>, xpath_index: usize) -> String {
    let mut out = expr.replace("{xpath_index}", &format!("'{xpath_index:04}'"));

    for (key, value) in context {
        let token = format!("{{{key}}}", key = key);
        if out.contains(&token) {
            out = out.replace(&token, &escape(value));
        }
    }

    out
}

/// Entity-escape apostrophes and double quotes so a substituted value
/// can't prematurely terminate an XPath string literal.
fn escape(value: &str) -> String {
    value.replace('\'', "&apos;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_replaces_known_keys() {
        let mut ctx = BTreeMap::new();
        ctx.insert("name".to_owned(), "gcc".to_owned());
        let out = substitute("//pkg[@name='{name}']", &ctx, 3);
        assert_eq!(out, "//pkg[@name='gcc']");
    }

    #[test]
    fn substitute_pads_and_quotes_xpath_index() {
        let ctx = BTreeMap::new();
        let out = substitute("//chapter[{xpath_index}]", &ctx, 7);
        assert_eq!(out, "//chapter['0007']");
    }

    #[test]
    fn escape_handles_apostrophes_and_quotes() {
        let mut ctx = BTreeMap::new();
        ctx.insert("title".to_owned(), "O'Reilly \"Books\"".to_owned());
        let out = substitute("{title}", &ctx, 1);
        assert_eq!(out, "O&apos;Reilly &quot;Books&quot;");
    }

    #[test]
    fn extracted_into_scalar_joins_list() {
        let list = Extracted::List(vec!["a".into(), "b".into()]);
        assert_eq!(list.into_scalar(), "ab");
    }

    #[test]
    fn evaluate_blank_expression_is_empty_scalar() {
        let package = sxd_document::Package::new();
        let doc = package.as_document();
        let factory = Factory::new();
        let root = Node::Root(doc.root());
        let result = evaluate(root, "", &factory).unwrap();
        assert_eq!(result, Extracted::Scalar(String::new()));
    }
}
