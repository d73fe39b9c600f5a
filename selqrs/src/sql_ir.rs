//! SQL intermediate representation.
//!
//! Clause and join builders assemble a [`Frag`] tree instead of strings so
//! parameter numbering can be deferred to a single finalization pass. Static
//! text and parameters stay separate until [`finalize`] walks the tree
//! depth-first, replacing every `Param` with the next `$k` placeholder and
//! collecting the value.

use std::borrow::Cow;

use serde_json::Value;

#[derive(Debug, Clone)]
pub enum Frag {
    Static(Cow<'static, str>),
    Param(Value),
    Seq(Vec<Frag>),
    /// A common table expression carried inline until the with-clause is
    /// assembled. The body keeps its own params in place; extraction preserves
    /// their traversal order.
    Cte {
        name: String,
        body: Box<Frag>,
        recursive: bool,
    },
}

impl Frag {
    pub fn sql(text: impl Into<Cow<'static, str>>) -> Frag {
        Frag::Static(text.into())
    }

    pub fn param(value: impl Into<Value>) -> Frag {
        Frag::Param(value.into())
    }

    pub fn seq(frags: Vec<Frag>) -> Frag {
        Frag::Seq(frags)
    }

    pub fn empty() -> Frag {
        Frag::Seq(Vec::new())
    }

    /// Interleave `items` with a static separator.
    pub fn join(items: Vec<Frag>, separator: &'static str) -> Frag {
        let mut out = Vec::with_capacity(items.len() * 2);
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                out.push(Frag::sql(separator));
            }
            out.push(item);
        }
        Frag::Seq(out)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Frag::Static(s) => s.is_empty(),
            Frag::Param(_) | Frag::Cte { .. } => false,
            Frag::Seq(items) => items.iter().all(Frag::is_empty),
        }
    }
}

/// A standalone CTE extracted from the tree, finalized with local numbering
/// starting at `$1`.
#[derive(Debug, Clone)]
pub struct CteSql {
    pub name: String,
    pub sql: String,
    pub params: Vec<Value>,
    pub recursive: bool,
}

/// Combined finalization output.
#[derive(Debug, Clone)]
pub struct Finalized {
    pub sql: String,
    pub params: Vec<Value>,
    pub ctes: Vec<CteSql>,
}

/// Walk the tree left to right, numbering placeholders `$1..$N` and collecting
/// parameters in traversal order. CTE nodes finalize their bodies in place.
pub fn finalize(frag: &Frag) -> (String, Vec<Value>) {
    let mut sql = String::new();
    let mut params = Vec::new();
    fold(frag, &mut sql, &mut params);
    (sql, params)
}

/// Like [`finalize`], additionally reporting every CTE as a standalone
/// statement with its own `$1`-based numbering. The combined form still
/// contains the CTE bodies with global numbering.
pub fn finalize_with_ctes(frag: &Frag) -> Finalized {
    let mut ctes = Vec::new();
    collect_ctes(frag, &mut ctes);
    let (sql, params) = finalize(frag);
    Finalized { sql, params, ctes }
}

/// Remove CTE markers from the tree, returning the stripped tree and the
/// markers in traversal order. Used by the with-clause assembler to hoist
/// hierarchy CTEs emitted inside join fragments.
pub fn extract_ctes(frag: Frag) -> (Frag, Vec<(String, Frag, bool)>) {
    let mut out = Vec::new();
    let stripped = strip(frag, &mut out);
    (stripped, out)
}

fn fold(frag: &Frag, sql: &mut String, params: &mut Vec<Value>) {
    match frag {
        Frag::Static(text) => sql.push_str(text),
        Frag::Param(value) => {
            params.push(value.clone());
            sql.push('$');
            sql.push_str(&params.len().to_string());
        }
        Frag::Seq(items) => {
            for item in items {
                fold(item, sql, params);
            }
        }
        Frag::Cte { body, .. } => fold(body, sql, params),
    }
}

fn collect_ctes(frag: &Frag, out: &mut Vec<CteSql>) {
    match frag {
        Frag::Static(_) | Frag::Param(_) => {}
        Frag::Seq(items) => {
            for item in items {
                collect_ctes(item, out);
            }
        }
        Frag::Cte {
            name,
            body,
            recursive,
        } => {
            collect_ctes(body, out);
            let (sql, params) = finalize(body);
            out.push(CteSql {
                name: name.clone(),
                sql,
                params,
                recursive: *recursive,
            });
        }
    }
}

fn strip(frag: Frag, out: &mut Vec<(String, Frag, bool)>) -> Frag {
    match frag {
        Frag::Seq(items) => Frag::Seq(items.into_iter().map(|f| strip(f, out)).collect()),
        Frag::Cte {
            name,
            body,
            recursive,
        } => {
            let body = strip(*body, out);
            out.push((name, body, recursive));
            Frag::empty()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_tree_yields_empty_output() {
        let (sql, params) = finalize(&Frag::empty());
        assert_eq!(sql, "");
        assert!(params.is_empty());
    }

    #[test]
    fn numbers_params_in_traversal_order() {
        let frag = Frag::seq(vec![
            Frag::sql("SELECT * FROM t WHERE a = "),
            Frag::param(json!(1)),
            Frag::sql(" AND b = "),
            Frag::param(json!("x")),
        ]);
        let (sql, params) = finalize(&frag);
        assert_eq!(sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
        assert_eq!(params, vec![json!(1), json!("x")]);
    }

    #[test]
    fn repeated_values_are_not_deduplicated() {
        let frag = Frag::seq(vec![
            Frag::param(json!(7)),
            Frag::sql(" "),
            Frag::param(json!(7)),
        ]);
        let (sql, params) = finalize(&frag);
        assert_eq!(sql, "$1 $2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn cte_params_precede_main_params_in_combined_form() {
        let cte = Frag::Cte {
            name: "h".to_string(),
            body: Box::new(Frag::seq(vec![
                Frag::sql("SELECT 1 WHERE depth < "),
                Frag::param(json!(5)),
            ])),
            recursive: true,
        };
        let frag = Frag::seq(vec![
            Frag::sql("WITH RECURSIVE h AS ("),
            cte,
            Frag::sql(") SELECT * FROM h WHERE level <= "),
            Frag::param(json!(3)),
        ]);
        let out = finalize_with_ctes(&frag);
        assert_eq!(out.params, vec![json!(5), json!(3)]);
        assert!(out.sql.contains("$1"));
        assert!(out.sql.contains("$2"));
        assert_eq!(out.ctes.len(), 1);
        assert_eq!(out.ctes[0].params, vec![json!(5)]);
        assert!(out.ctes[0].sql.ends_with("$1"));
        assert!(out.ctes[0].recursive);
    }

    #[test]
    fn extract_ctes_strips_markers() {
        let frag = Frag::seq(vec![
            Frag::Cte {
                name: "tree".to_string(),
                body: Box::new(Frag::sql("SELECT 1")),
                recursive: false,
            },
            Frag::sql("SELECT * FROM tree"),
        ]);
        let (stripped, ctes) = extract_ctes(frag);
        let (sql, _) = finalize(&stripped);
        assert_eq!(sql, "SELECT * FROM tree");
        assert_eq!(ctes.len(), 1);
        assert_eq!(ctes[0].0, "tree");
    }
}
