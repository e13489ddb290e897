//! Schema language parser implementation using pest.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use super::ast::*;
use super::CompileError;

#[derive(Parser)]
#[grammar = "dsl/schema.pest"]
pub struct SchemaParser;

fn position_of(pair: &Pair<Rule>) -> SourcePosition {
    let (line, column) = pair.as_span().start_pos().line_col();
    SourcePosition::new(line, column)
}

fn parse_error(position: SourcePosition, message: impl Into<String>) -> CompileError {
    CompileError::Parse {
        line: position.line,
        column: position.column,
        message: message.into(),
    }
}

impl From<pest::error::Error<Rule>> for CompileError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, column) = match err.line_col {
            pest::error::LineColLocation::Pos((line, column)) => (line, column),
            pest::error::LineColLocation::Span((line, column), _) => (line, column),
        };
        CompileError::Parse {
            line,
            column,
            message: err.variant.message().into_owned(),
        }
    }
}

/// Parse schema source text into its syntax tree.
pub fn parse_schema(source: &str) -> Result<ParsedSchema, CompileError> {
    let pairs = SchemaParser::parse(Rule::schema, source)?;

    let mut definitions = Vec::new();

    for pair in pairs {
        if pair.as_rule() == Rule::schema {
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::definition => definitions.push(parse_definition(inner)?),
                    Rule::EOI => {}
                    rule => unreachable!("unexpected rule in schema: {:?}", rule),
                }
            }
        }
    }

    Ok(ParsedSchema { definitions })
}

fn parse_definition(pair: Pair<Rule>) -> Result<ParsedDefinition, CompileError> {
    let position = position_of(&pair);
    let mut inner = pair.into_inner();

    let name = inner
        .next()
        .ok_or_else(|| parse_error(position, "expected definition name"))?
        .as_str()
        .to_string();

    let mut declarations = Vec::new();
    for declaration in inner {
        match declaration.as_rule() {
            Rule::relation_decl => {
                declarations.push(ParsedDeclaration::Relation(parse_relation_decl(
                    declaration,
                )?));
            }
            Rule::permission_decl => {
                declarations.push(ParsedDeclaration::Permission(parse_permission_decl(
                    declaration,
                )?));
            }
            rule => unreachable!("unexpected rule in definition: {:?}", rule),
        }
    }

    Ok(ParsedDefinition {
        name,
        position,
        declarations,
    })
}

fn parse_relation_decl(pair: Pair<Rule>) -> Result<ParsedRelation, CompileError> {
    let position = position_of(&pair);
    let mut inner = pair.into_inner();

    let name = inner
        .next()
        .ok_or_else(|| parse_error(position, "expected relation name"))?
        .as_str()
        .to_string();

    let allowed_pair = inner
        .next()
        .ok_or_else(|| parse_error(position, "expected allowed subject types"))?;

    let mut allowed = Vec::new();
    for subject in allowed_pair.into_inner() {
        allowed.push(parse_subject_type(subject)?);
    }

    Ok(ParsedRelation {
        name,
        position,
        allowed,
    })
}

fn parse_subject_type(pair: Pair<Rule>) -> Result<ParsedSubjectType, CompileError> {
    let position = position_of(&pair);
    let mut inner = pair.into_inner();

    let namespace = inner
        .next()
        .ok_or_else(|| parse_error(position, "expected subject type name"))?
        .as_str()
        .to_string();

    let relation = inner.next().map(|p| p.as_str().to_string());

    Ok(ParsedSubjectType {
        namespace,
        relation,
    })
}

fn parse_permission_decl(pair: Pair<Rule>) -> Result<ParsedPermission, CompileError> {
    let position = position_of(&pair);
    let mut inner = pair.into_inner();

    let name = inner
        .next()
        .ok_or_else(|| parse_error(position, "expected permission name"))?
        .as_str()
        .to_string();

    let expr_pair = inner
        .next()
        .ok_or_else(|| parse_error(position, "expected permission expression"))?;

    Ok(ParsedPermission {
        name,
        position,
        expr: parse_expr(expr_pair)?,
    })
}

fn parse_expr(pair: Pair<Rule>) -> Result<ParsedExpr, CompileError> {
    let position = position_of(&pair);
    match pair.as_rule() {
        Rule::expr => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| parse_error(position, "expected expression"))?;
            parse_expr(inner)
        }
        Rule::union_expr => parse_nary(pair, ParsedExpr::Union),
        Rule::intersection_expr => parse_nary(pair, ParsedExpr::Intersection),
        Rule::exclusion_expr => parse_exclusion(pair),
        Rule::primary_expr => parse_primary(pair),
        rule => Err(parse_error(
            position,
            format!("unexpected expression rule: {:?}", rule),
        )),
    }
}

fn parse_nary(
    pair: Pair<Rule>,
    build: fn(Vec<ParsedExpr>) -> ParsedExpr,
) -> Result<ParsedExpr, CompileError> {
    let mut children = Vec::new();
    for inner in pair.into_inner() {
        children.push(parse_expr(inner)?);
    }

    if children.len() == 1 {
        Ok(children.into_iter().next().unwrap())
    } else {
        Ok(build(children))
    }
}

fn parse_exclusion(pair: Pair<Rule>) -> Result<ParsedExpr, CompileError> {
    let position = position_of(&pair);
    let mut inner = pair.into_inner();

    let base = parse_expr(
        inner
            .next()
            .ok_or_else(|| parse_error(position, "expected base expression"))?,
    )?;

    match inner.next() {
        Some(subtract_pair) => Ok(ParsedExpr::Exclusion {
            base: Box::new(base),
            subtract: Box::new(parse_expr(subtract_pair)?),
        }),
        None => Ok(base),
    }
}

fn parse_primary(pair: Pair<Rule>) -> Result<ParsedExpr, CompileError> {
    let position = position_of(&pair);
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| parse_error(position, "expected primary expression"))?;

    match inner.as_rule() {
        Rule::relation_ref => Ok(ParsedExpr::RelationRef(inner.as_str().to_string())),
        Rule::arrow_expr => {
            let arrow_position = position_of(&inner);
            let mut parts = inner.into_inner();
            let tupleset = parts
                .next()
                .ok_or_else(|| parse_error(arrow_position, "expected tupleset name"))?
                .as_str()
                .to_string();
            let computed = parts
                .next()
                .ok_or_else(|| parse_error(arrow_position, "expected computed relation name"))?
                .as_str()
                .to_string();
            Ok(ParsedExpr::Arrow { tupleset, computed })
        }
        Rule::paren_expr => {
            let paren_position = position_of(&inner);
            let expr = inner
                .into_inner()
                .next()
                .ok_or_else(|| parse_error(paren_position, "expected parenthesized expression"))?;
            parse_expr(expr)
        }
        rule => Err(parse_error(
            position,
            format!("unexpected primary expression: {:?}", rule),
        )),
    }
}
