//! C3 — Document Analyzer. Caches per-document structural info: deduped
//! selections, type conditions, variable defaults, `@defer`/optional/
//! required directive flags (`spec.md` §4.3). Parsing and validating the
//! GraphQL document itself is out of scope (§1) — this module receives an
//! already-parsed `apollo_compiler::ExecutableDocument`, the same way the
//! teacher crate receives an already-validated `Schema`/`ExecutableDocument`
//! pair rather than raw source text.

use std::collections::HashMap;
use std::sync::Arc;

use apollo_compiler::executable::{
    ExecutableDocument, Field, Fragment, InlineFragment, Operation, Selection, SelectionSet,
};
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::{Node, Schema};
use indexmap::IndexMap;

use crate::key::FieldKey;
use crate::value::{ObjectValue, Value};

/// `query` / `mutation` / `subscription`, mirrored from
/// `apollo_compiler::executable::OperationType` so the rest of the crate
/// doesn't need to depend on the AST crate directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    Query,
    Mutation,
    Subscription,
}

impl RootKind {
    pub fn root_typename(self) -> &'static str {
        match self {
            RootKind::Query => "Query",
            RootKind::Mutation => "Mutation",
            RootKind::Subscription => "Subscription",
        }
    }
}

/// One field of a deduped selection set, with its args already resolved
/// against variables and defaults, and its optional/required/defer flags
/// already folded in from ancestor context (§4.3).
#[derive(Debug, Clone)]
pub struct AnalyzedField {
    /// The key this field's value is read from / written to in the result
    /// object (the alias, if any, else the field name).
    pub response_key: String,
    pub field_name: String,
    pub args: ObjectValue,
    pub field_key: FieldKey,
    /// `true` if a missing value at this field should be tolerated
    /// (explicit `@_optional`, schema-declared nullability, or an ancestor
    /// optional fragment not overridden by `@_required` here).
    pub tolerate_missing: bool,
    pub defer: bool,
    /// The narrowest fragment type condition this field is nested inside,
    /// if any (`spec.md` §4.5: "If the selection has a type condition and
    /// the runtime `__typename` does not match, skip").
    pub type_condition: Option<String>,
    pub selection: Option<Arc<AnalyzedSelectionSet>>,
}

/// A deduped selection set: one entry per response key, fragments already
/// inlined and merged (the same normalization
/// `query_plan::operation::normalize_operation` performs, generalized to
/// also resolve arguments and directive flags instead of staying purely
/// structural).
#[derive(Debug, Clone, Default)]
pub struct AnalyzedSelectionSet {
    /// `None` for the root selection set of an operation.
    pub type_condition: Option<String>,
    pub fields: IndexMap<String, AnalyzedField>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub root_kind: RootKind,
    pub selection: Arc<AnalyzedSelectionSet>,
    pub has_defer: bool,
}

/// Caches [`DocumentInfo`] by document identity, per `spec.md` §4.3 ("the
/// analyzer MUST cache by document identity") and §9's note that identity
/// should be approximated by a pointer/hash rather than re-parsing text.
/// Identity here is the `Arc` pointer of the executable document plus the
/// target operation name plus the variable *set* (not values) bound to it —
/// two calls with the same document/operation but different optional
/// variables provided still share the same selection shape.
#[derive(Default)]
pub struct DocumentAnalyzer {
    cache: HashMap<(usize, Option<String>), Arc<DocumentInfo>>,
}

impl DocumentAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analyze(
        &mut self,
        document: &Arc<ExecutableDocument>,
        operation_name: Option<&str>,
        schema: Option<&Schema>,
        variables: &ObjectValue,
        schema_aware_nullability: bool,
    ) -> Result<Arc<DocumentInfo>, crate::error::CacheError> {
        let cache_key = (
            Arc::as_ptr(document) as usize,
            operation_name.map(str::to_owned),
        );
        if let Some(info) = self.cache.get(&cache_key) {
            return Ok(Arc::clone(info));
        }
        let operation = select_operation(document, operation_name)?;
        let root_kind = match operation.operation_type {
            apollo_compiler::executable::OperationType::Query => RootKind::Query,
            apollo_compiler::executable::OperationType::Mutation => RootKind::Mutation,
            apollo_compiler::executable::OperationType::Subscription => RootKind::Subscription,
        };
        let mut has_defer = false;
        let selection = analyze_selection_set(
            &operation.selection_set,
            document,
            schema,
            variables,
            /* ancestor_tolerates_missing */ false,
            &mut has_defer,
            schema_aware_nullability,
        );
        let info = Arc::new(DocumentInfo {
            root_kind,
            selection: Arc::new(selection),
            has_defer,
        });
        self.cache.insert(cache_key, Arc::clone(&info));
        Ok(info)
    }
}

fn select_operation<'doc>(
    document: &'doc ExecutableDocument,
    operation_name: Option<&str>,
) -> Result<&'doc Node<Operation>, crate::error::CacheError> {
    match operation_name {
        Some(name) => document
            .named_operations
            .iter()
            .find(|(op_name, _)| op_name.as_str() == name)
            .map(|(_, op)| op)
            .ok_or_else(|| {
                crate::error::CacheError::Document(format!("no operation named \"{name}\""))
            }),
        None => document
            .anonymous_operation
            .as_ref()
            .or_else(|| document.named_operations.values().next())
            .ok_or_else(|| crate::error::CacheError::Document("document has no operations".into())),
    }
}

#[allow(clippy::too_many_arguments)]
fn analyze_selection_set(
    selection_set: &SelectionSet,
    document: &ExecutableDocument,
    schema: Option<&Schema>,
    variables: &ObjectValue,
    ancestor_tolerates_missing: bool,
    has_defer: &mut bool,
    schema_aware_nullability: bool,
) -> AnalyzedSelectionSet {
    let mut fields = IndexMap::new();
    collect_fields(
        selection_set,
        document,
        schema,
        variables,
        ancestor_tolerates_missing,
        None,
        &mut fields,
        has_defer,
        schema_aware_nullability,
    );
    AnalyzedSelectionSet {
        type_condition: None,
        fields,
    }
}

#[allow(clippy::too_many_arguments)]
fn collect_fields(
    selection_set: &SelectionSet,
    document: &ExecutableDocument,
    schema: Option<&Schema>,
    variables: &ObjectValue,
    ancestor_tolerates_missing: bool,
    type_condition: Option<&str>,
    out: &mut IndexMap<String, AnalyzedField>,
    has_defer: &mut bool,
    schema_aware_nullability: bool,
) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                if field.name.starts_with("__") {
                    continue;
                }
                let response_key = field
                    .alias
                    .as_ref()
                    .map_or_else(|| field.name.as_str().to_owned(), |a| a.as_str().to_owned());
                let args = resolve_arguments(field, variables);
                let field_key = FieldKey::new(field.name.as_str(), &args);
                let defer = has_directive(&field.directives, "defer");
                *has_defer |= defer;
                let nullable = schema_aware_nullability
                    && schema_nullable(schema, selection_set, field.name.as_str());
                let tolerate_missing =
                    tolerates_missing(&field.directives, ancestor_tolerates_missing, nullable);
                let child_selection = if field.selection_set.selections.is_empty() {
                    None
                } else {
                    let mut child_defer = false;
                    let selection = analyze_selection_set(
                        &field.selection_set,
                        document,
                        schema,
                        variables,
                        tolerate_missing,
                        &mut child_defer,
                        schema_aware_nullability,
                    );
                    *has_defer |= child_defer;
                    Some(Arc::new(selection))
                };
                out.insert(
                    response_key.clone(),
                    AnalyzedField {
                        response_key,
                        field_name: field.name.as_str().to_owned(),
                        args,
                        field_key,
                        tolerate_missing,
                        defer,
                        type_condition: type_condition.map(str::to_owned),
                        selection: child_selection,
                    },
                );
            }
            Selection::InlineFragment(inline) => {
                let fragment_optional =
                    ancestor_tolerates_missing && !has_directive(&inline.directives, "_required");
                let cond = inline.type_condition.as_ref().map(|t| t.as_str());
                collect_fields(
                    &inline.selection_set,
                    document,
                    schema,
                    variables,
                    fragment_optional,
                    cond.or(type_condition),
                    out,
                    has_defer,
                    schema_aware_nullability,
                );
            }
            Selection::FragmentSpread(spread) => {
                if let Some(fragment) = document.fragments.get(&spread.fragment_name) {
                    let fragment_optional = ancestor_tolerates_missing
                        && !has_directive(&spread.directives, "_required");
                    collect_fields(
                        &fragment.selection_set,
                        document,
                        schema,
                        variables,
                        fragment_optional,
                        Some(fragment.type_condition().as_str()),
                        out,
                        has_defer,
                        schema_aware_nullability,
                    );
                }
            }
        }
    }
}

fn has_directive(directives: &apollo_compiler::ast::DirectiveList, name: &str) -> bool {
    directives.iter().any(|d| d.name.as_str() == name)
}

/// §4.3: `@_required` overrides an ancestor `@_optional`; in the absence of
/// either, a schema-declared nullable field (when a schema was supplied) is
/// still tolerated, but `@_required` narrows even that.
fn tolerates_missing(
    directives: &apollo_compiler::ast::DirectiveList,
    ancestor_tolerates_missing: bool,
    schema_nullable: bool,
) -> bool {
    if has_directive(directives, "_required") {
        return false;
    }
    has_directive(directives, "_optional") || ancestor_tolerates_missing || schema_nullable
}

fn schema_nullable(schema: Option<&Schema>, selection_set: &SelectionSet, field_name: &str) -> bool {
    let Some(schema) = schema else { return false };
    let Some(ExtendedType::Object(obj)) = schema.types.get(&selection_set.ty) else {
        return false;
    };
    obj.fields
        .get(field_name)
        .map(|f| !f.ty.is_non_null())
        .unwrap_or(false)
}

/// Binds a field's literal/variable arguments against `variables`, dropping
/// any entry whose resolved value equals the field's declared default
/// (`spec.md` §3, `FieldKey` canonicalization rule).
fn resolve_arguments(field: &Node<Field>, variables: &ObjectValue) -> ObjectValue {
    let mut resolved = ObjectValue::new();
    for argument in &field.arguments {
        let value = ast_value_to_json(&argument.value, variables);
        let default = field
            .definition
            .arguments
            .iter()
            .find(|def| def.name == argument.name)
            .and_then(|def| def.default_value.as_ref())
            .map(|d| ast_value_to_json(d, &ObjectValue::new()));
        if default.as_ref() == Some(&value) {
            continue;
        }
        resolved.insert(argument.name.as_str(), value);
    }
    resolved
}

fn ast_value_to_json(value: &apollo_compiler::ast::Value, variables: &ObjectValue) -> Value {
    use apollo_compiler::ast::Value as Ast;
    match value {
        Ast::Null => Value::Null,
        Ast::Boolean(b) => Value::Bool(*b),
        Ast::Int(i) => serde_json::Number::from(i.try_to_i32().unwrap_or_default())
            .into(),
        Ast::Float(f) => serde_json::Number::from_f64(f.try_to_f64().unwrap_or_default())
            .map(Into::into)
            .unwrap_or(Value::Null),
        Ast::String(s) => Value::String(s.as_str().into()),
        Ast::Enum(e) => Value::String(e.as_str().into()),
        Ast::Variable(name) => variables.get(name.as_str()).cloned().unwrap_or(Value::Null),
        Ast::List(items) => {
            Value::Array(items.iter().map(|v| ast_value_to_json(v, variables)).collect())
        }
        Ast::Object(entries) => {
            let mut map = ObjectValue::new();
            for (name, v) in entries {
                map.insert(name.as_str(), ast_value_to_json(v, variables));
            }
            Value::Object(map)
        }
    }
}
