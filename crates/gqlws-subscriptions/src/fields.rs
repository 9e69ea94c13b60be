//! Root field extraction for subscription operations.
//!
//! A subscription operation selects exactly one root field, so the name of the
//! first selection is taken as the field the subscription listens to. Root
//! fragment spreads and inline fragments are not resolved, and any further
//! root selections are ignored.

use async_graphql_parser::types::{ExecutableDocument, OperationType, Selection, SelectionSet};

/// Names (not aliases) of the root fields of all subscription operations in
/// `document`, in definition order.
pub fn subscription_field_names(document: &ExecutableDocument) -> Vec<String> {
    let mut operations: Vec<_> = document
        .operations
        .iter()
        .map(|(_, operation)| operation)
        .filter(|operation| operation.node.ty == OperationType::Subscription)
        .collect();
    operations.sort_by_key(|operation| (operation.pos.line, operation.pos.column));

    operations
        .into_iter()
        .filter_map(|operation| first_field_name(&operation.node.selection_set.node))
        .collect()
}

fn first_field_name(set: &SelectionSet) -> Option<String> {
    match &set.items.first()?.node {
        Selection::Field(field) => Some(field.node.name.node.to_string()),
        Selection::FragmentSpread(_) | Selection::InlineFragment(_) => None,
    }
}
