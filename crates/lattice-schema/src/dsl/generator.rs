//! Re-serialisation of stored namespace definitions to schema source text.
//!
//! Generation is deterministic: declarations are emitted in stored order, so
//! compiling the generated text yields definitions structurally equal to the
//! originals.

use lattice_types::{AllowedSubject, NamespaceDefinition, RelationDef, UsersetRewrite};

/// Generate the source text of a single definition.
pub fn generate(definition: &NamespaceDefinition) -> String {
    let mut out = String::new();
    out.push_str("definition ");
    out.push_str(&definition.name);
    out.push_str(" {\n");

    for relation in &definition.relations {
        out.push('\t');
        out.push_str(&render_relation(relation));
        out.push('\n');
    }

    out.push('}');
    out
}

/// Generate the source text of a whole schema.
pub fn generate_schema(definitions: &[NamespaceDefinition]) -> String {
    definitions
        .iter()
        .map(generate)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_relation(relation: &RelationDef) -> String {
    match &relation.rewrite {
        Some(rewrite) => format!("permission {} = {}", relation.name, render_expr(rewrite)),
        None => {
            let subjects = relation
                .allowed_subjects
                .iter()
                .map(render_subject)
                .collect::<Vec<_>>()
                .join(" | ");
            format!("relation {}: {}", relation.name, subjects)
        }
    }
}

fn render_subject(subject: &AllowedSubject) -> String {
    match &subject.relation {
        Some(relation) => format!("{}#{}", subject.namespace, relation),
        None => subject.namespace.clone(),
    }
}

/// Operator binding strength, loosest first. A child at or below its
/// parent's level needs parentheses to survive a round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Union,
    Intersection,
    Exclusion,
    Leaf,
}

fn precedence_of(expr: &UsersetRewrite) -> Precedence {
    match expr {
        UsersetRewrite::Union(_) => Precedence::Union,
        UsersetRewrite::Intersection(_) => Precedence::Intersection,
        UsersetRewrite::Exclusion { .. } => Precedence::Exclusion,
        UsersetRewrite::ComputedUserset { .. } | UsersetRewrite::TupleToUserset { .. } => {
            Precedence::Leaf
        }
    }
}

fn render_child(expr: &UsersetRewrite, parent: Precedence) -> String {
    if precedence_of(expr) <= parent {
        format!("({})", render_expr(expr))
    } else {
        render_expr(expr)
    }
}

fn render_expr(expr: &UsersetRewrite) -> String {
    match expr {
        UsersetRewrite::ComputedUserset { relation } => relation.clone(),
        UsersetRewrite::TupleToUserset { tupleset, computed } => {
            format!("{}->{}", tupleset, computed)
        }
        UsersetRewrite::Union(children) => children
            .iter()
            .map(|child| render_child(child, Precedence::Union))
            .collect::<Vec<_>>()
            .join(" + "),
        UsersetRewrite::Intersection(children) => children
            .iter()
            .map(|child| render_child(child, Precedence::Intersection))
            .collect::<Vec<_>>()
            .join(" & "),
        UsersetRewrite::Exclusion { base, subtract } => format!(
            "{} - {}",
            render_child(base, Precedence::Exclusion),
            render_child(subtract, Precedence::Exclusion)
        ),
    }
}
