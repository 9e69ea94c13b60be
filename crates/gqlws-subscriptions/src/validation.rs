//! Document validation against a [`StaticSchema`].
//!
//! Covers operation roots, field existence, leaf and composite selection
//! rules, fragment references and type conditions. Arguments and variables
//! are not checked.

use async_graphql_parser::types::{ExecutableDocument, Field, OperationType, Selection, SelectionSet};
use async_graphql_parser::{Pos, Positioned};

use crate::error::SubscriptionError;
use crate::schema::{Schema, StaticSchema};

impl Schema for StaticSchema {
    fn validate(&self, document: &ExecutableDocument) -> Vec<SubscriptionError> {
        let mut validator = Validator {
            schema: self,
            document,
            errors: Vec::new(),
            fragment_path: Vec::new(),
        };

        let mut operations: Vec<_> = document.operations.iter().map(|(_, op)| op).collect();
        operations.sort_by_key(|op| (op.pos.line, op.pos.column));

        for operation in operations {
            match self.root(operation.node.ty) {
                Some(root) => validator.visit_selection_set(&root.name, &operation.node.selection_set),
                None => validator.error(
                    format!("Schema is not configured for {}.", operation_plural(operation.node.ty)),
                    operation.pos,
                ),
            }
        }

        validator.errors
    }
}

fn operation_plural(ty: OperationType) -> &'static str {
    match ty {
        OperationType::Query => "queries",
        OperationType::Mutation => "mutations",
        OperationType::Subscription => "subscriptions",
    }
}

struct Validator<'a> {
    schema: &'a StaticSchema,
    document: &'a ExecutableDocument,
    errors: Vec<SubscriptionError>,
    fragment_path: Vec<&'a str>,
}

impl<'a> Validator<'a> {
    fn error(&mut self, message: String, pos: Pos) {
        self.errors
            .push(SubscriptionError::validation(message, pos.line, pos.column));
    }

    fn visit_selection_set(&mut self, parent: &str, set: &'a Positioned<SelectionSet>) {
        let document = self.document;
        for selection in &set.node.items {
            match &selection.node {
                Selection::Field(field) => self.visit_field(parent, field),
                Selection::FragmentSpread(spread) => {
                    let name = spread.node.fragment_name.node.as_str();
                    let Some(fragment) = document.fragments.get(&spread.node.fragment_name.node) else {
                        self.error(format!("Unknown fragment \"{name}\"."), spread.pos);
                        continue;
                    };
                    if self.fragment_path.contains(&name) {
                        self.error(format!("Cannot spread fragment \"{name}\" within itself."), spread.pos);
                        continue;
                    }
                    let condition = fragment.node.type_condition.node.on.node.as_str();
                    if self.check_type_condition(parent, condition, fragment.node.type_condition.pos) {
                        self.fragment_path.push(name);
                        self.visit_selection_set(condition, &fragment.node.selection_set);
                        self.fragment_path.pop();
                    }
                }
                Selection::InlineFragment(inline) => {
                    let target = match &inline.node.type_condition {
                        Some(condition) => {
                            let on = condition.node.on.node.as_str();
                            if !self.check_type_condition(parent, on, condition.pos) {
                                continue;
                            }
                            on
                        }
                        None => parent,
                    };
                    self.visit_selection_set(target, &inline.node.selection_set);
                }
            }
        }
    }

    /// Without interfaces or unions a fragment can only apply to its parent type.
    fn check_type_condition(&mut self, parent: &str, condition: &str, pos: Pos) -> bool {
        if self.schema.object(condition).is_none() {
            let message = if self.schema.is_scalar(condition) {
                format!("Fragment cannot condition on non composite type \"{condition}\".")
            } else {
                format!("Unknown type \"{condition}\".")
            };
            self.error(message, pos);
            return false;
        }
        if condition != parent {
            self.error(
                format!("Fragment cannot be spread here as objects of type \"{parent}\" can never be of type \"{condition}\"."),
                pos,
            );
            return false;
        }
        true
    }

    fn visit_field(&mut self, parent: &str, field: &'a Positioned<Field>) {
        let name = field.node.name.node.as_str();
        let has_selection = !field.node.selection_set.node.items.is_empty();

        if name == "__typename" {
            if has_selection {
                self.error(
                    format!("Field \"{name}\" must not have a selection since type \"String!\" has no subfields."),
                    field.pos,
                );
            }
            return;
        }

        let schema = self.schema;
        let Some(definition) = schema.object(parent).and_then(|object| object.field(name)) else {
            self.error(format!("Cannot query field \"{name}\" on type \"{parent}\"."), field.pos);
            return;
        };

        let target = definition.named_type();
        if schema.object(target).is_some() {
            if has_selection {
                self.visit_selection_set(target, &field.node.selection_set);
            } else {
                self.error(
                    format!(
                        "Field \"{name}\" of type \"{}\" must have a selection of subfields. Did you mean \"{name} {{ ... }}\"?",
                        definition.type_ref
                    ),
                    field.pos,
                );
            }
        } else if has_selection {
            self.error(
                format!(
                    "Field \"{name}\" must not have a selection since type \"{}\" has no subfields.",
                    definition.type_ref
                ),
                field.pos,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql_parser::parse_query;
    use gqlws_core::Location;

    fn schema() -> StaticSchema {
        StaticSchema::builder()
            .query("Query", [("hello", "String")])
            .subscription("Subscription", [("users", "[String]"), ("tick", "Tick!")])
            .object("Tick", [("count", "Int!"), ("at", "String")])
            .build()
            .unwrap()
    }

    fn validate(query: &str) -> Vec<SubscriptionError> {
        schema().validate(&parse_query(query).unwrap())
    }

    fn messages(query: &str) -> Vec<String> {
        validate(query).iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn valid_documents_pass() {
        assert!(validate("subscription { users }").is_empty());
        assert!(validate("subscription S { tick { count at __typename } }").is_empty());
        assert!(validate("{ hello }").is_empty());
        assert!(validate("subscription { tick { ...T } } fragment T on Tick { count }").is_empty());
        assert!(validate("subscription { tick { ... on Tick { at } } }").is_empty());
    }

    #[test]
    fn unknown_root_field() {
        let errors = validate("subscription { foo }");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "Cannot query field \"foo\" on type \"Subscription\".");
        let SubscriptionError::Validation { locations, .. } = &errors[0] else {
            panic!("expected validation error");
        };
        assert_eq!(locations, &vec![Location { line: 1, column: 16 }]);
    }

    #[test]
    fn all_violations_are_reported() {
        let errors = messages("subscription { tick { nope count { x } } }");
        assert_eq!(
            errors,
            vec![
                "Cannot query field \"nope\" on type \"Tick\".".to_string(),
                "Field \"count\" must not have a selection since type \"Int!\" has no subfields.".to_string(),
            ]
        );
    }

    #[test]
    fn composite_field_needs_selection() {
        let errors = messages("subscription { tick }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Field \"tick\" of type \"Tick!\" must have a selection"));
    }

    #[test]
    fn missing_root_type() {
        let errors = messages("mutation { touch }");
        assert_eq!(errors, vec!["Schema is not configured for mutations.".to_string()]);
    }

    #[test]
    fn missing_query_root_names_queries() {
        let schema = StaticSchema::builder()
            .subscription("Subscription", [("users", "[String]")])
            .build()
            .unwrap();
        let errors: Vec<String> = schema
            .validate(&parse_query("{ users }").unwrap())
            .iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(errors, vec!["Schema is not configured for queries.".to_string()]);
    }

    #[test]
    fn unknown_fragment_and_type_condition() {
        assert_eq!(
            messages("subscription { tick { ...Missing } }"),
            vec!["Unknown fragment \"Missing\".".to_string()]
        );
        assert_eq!(
            messages("subscription { tick { ... on Nope { count } } }"),
            vec!["Unknown type \"Nope\".".to_string()]
        );
        assert_eq!(
            messages("subscription { tick { ... on Subscription { users } } }").len(),
            1
        );
    }

    #[test]
    fn fragment_cycles_terminate() {
        let errors = messages(
            "subscription { tick { ...A } } fragment A on Tick { count ...B } fragment B on Tick { at ...A }",
        );
        assert_eq!(errors, vec!["Cannot spread fragment \"A\" within itself.".to_string()]);
    }
}
