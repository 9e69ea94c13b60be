//! Schema capability used to validate subscription documents.

use std::collections::{HashMap, HashSet};

use async_graphql_parser::types::{ExecutableDocument, OperationType};

use crate::error::SubscriptionError;

/// Validates parsed documents. Query execution is not part of this trait.
pub trait Schema: Send + Sync {
    /// Every rule violation found in `document`; empty when it is valid.
    fn validate(&self, document: &ExecutableDocument) -> Vec<SubscriptionError>;
}

const BUILTIN_SCALARS: &[&str] = &["String", "Int", "Float", "Boolean", "ID"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("type {0} is defined twice")]
    DuplicateType(String),

    #[error("object type {0} has no fields")]
    EmptyObject(String),

    #[error("invalid type reference {type_ref:?} on {owner}.{field}")]
    InvalidTypeRef {
        owner: String,
        field: String,
        type_ref: String,
    },

    #[error("unknown type {type_name} referenced by {owner}.{field}")]
    UnknownType {
        owner: String,
        field: String,
        type_name: String,
    },

    #[error("{operation} root type {type_name} is not a defined object type")]
    UnknownRoot { operation: &'static str, type_name: String },
}

/// A field of an object type.
#[derive(Clone, Debug)]
pub struct FieldDefinition {
    pub name: String,
    /// Type reference as written, e.g. `[String!]!`.
    pub type_ref: String,
}

impl FieldDefinition {
    /// Named type with list and non-null wrappers removed.
    pub fn named_type(&self) -> &str {
        named_type(&self.type_ref)
    }
}

fn named_type(type_ref: &str) -> &str {
    type_ref.trim_matches(|c: char| c == '[' || c == ']' || c == '!' || c.is_whitespace())
}

fn is_valid_type_ref(type_ref: &str) -> bool {
    let name = named_type(type_ref);
    let opens = type_ref.matches('[').count();
    let closes = type_ref.matches(']').count();
    !name.is_empty()
        && opens == closes
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

#[derive(Clone, Debug)]
pub struct ObjectType {
    pub name: String,
    fields: HashMap<String, FieldDefinition>,
}

impl ObjectType {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }
}

/// Object/scalar schema declared up front, without resolvers.
///
/// ```
/// use gqlws_subscriptions::StaticSchema;
///
/// let schema = StaticSchema::builder()
///     .query("Query", [("hello", "String")])
///     .subscription("Subscription", [("users", "[String]")])
///     .build()
///     .unwrap();
/// assert!(schema.object("Subscription").is_some());
/// ```
#[derive(Clone, Debug)]
pub struct StaticSchema {
    objects: HashMap<String, ObjectType>,
    scalars: HashSet<String>,
    query_root: Option<String>,
    mutation_root: Option<String>,
    subscription_root: Option<String>,
}

impl StaticSchema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn object(&self, name: &str) -> Option<&ObjectType> {
        self.objects.get(name)
    }

    pub fn is_scalar(&self, name: &str) -> bool {
        self.scalars.contains(name)
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.is_scalar(name) || self.objects.contains_key(name)
    }

    pub fn root(&self, operation: OperationType) -> Option<&ObjectType> {
        let name = match operation {
            OperationType::Query => self.query_root.as_deref(),
            OperationType::Mutation => self.mutation_root.as_deref(),
            OperationType::Subscription => self.subscription_root.as_deref(),
        }?;
        self.objects.get(name)
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    objects: Vec<(String, Vec<(String, String)>)>,
    scalars: Vec<String>,
    query_root: Option<String>,
    mutation_root: Option<String>,
    subscription_root: Option<String>,
}

impl SchemaBuilder {
    /// Declare an object type with `(field, type reference)` pairs.
    pub fn object<I, N, T>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let fields = fields.into_iter().map(|(n, t)| (n.into(), t.into())).collect();
        self.objects.push((name.into(), fields));
        self
    }

    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.scalars.push(name.into());
        self
    }

    /// Declare an object type and make it the query root.
    pub fn query<I, N, T>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let name = name.into();
        self.query_root = Some(name.clone());
        self.object(name, fields)
    }

    /// Declare an object type and make it the mutation root.
    pub fn mutation<I, N, T>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let name = name.into();
        self.mutation_root = Some(name.clone());
        self.object(name, fields)
    }

    /// Declare an object type and make it the subscription root.
    pub fn subscription<I, N, T>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let name = name.into();
        self.subscription_root = Some(name.clone());
        self.object(name, fields)
    }

    pub fn build(self) -> Result<StaticSchema, SchemaError> {
        let mut scalars: HashSet<String> = BUILTIN_SCALARS.iter().map(|s| s.to_string()).collect();
        for scalar in self.scalars {
            if !scalars.insert(scalar.clone()) {
                return Err(SchemaError::DuplicateType(scalar));
            }
        }

        let mut objects = HashMap::new();
        for (name, fields) in self.objects {
            if scalars.contains(&name) || objects.contains_key(&name) {
                return Err(SchemaError::DuplicateType(name));
            }
            if fields.is_empty() {
                return Err(SchemaError::EmptyObject(name));
            }
            let fields = fields
                .into_iter()
                .map(|(field, type_ref)| {
                    (
                        field.clone(),
                        FieldDefinition {
                            name: field,
                            type_ref,
                        },
                    )
                })
                .collect();
            objects.insert(name.clone(), ObjectType { name, fields });
        }

        for object in objects.values() {
            for field in object.fields.values() {
                if !is_valid_type_ref(&field.type_ref) {
                    return Err(SchemaError::InvalidTypeRef {
                        owner: object.name.clone(),
                        field: field.name.clone(),
                        type_ref: field.type_ref.clone(),
                    });
                }
                let type_name = field.named_type();
                if !scalars.contains(type_name) && !objects.contains_key(type_name) {
                    return Err(SchemaError::UnknownType {
                        owner: object.name.clone(),
                        field: field.name.clone(),
                        type_name: type_name.to_string(),
                    });
                }
            }
        }

        for (operation, root) in [
            ("query", &self.query_root),
            ("mutation", &self.mutation_root),
            ("subscription", &self.subscription_root),
        ] {
            if let Some(type_name) = root {
                if !objects.contains_key(type_name) {
                    return Err(SchemaError::UnknownRoot {
                        operation,
                        type_name: type_name.clone(),
                    });
                }
            }
        }

        Ok(StaticSchema {
            objects,
            scalars,
            query_root: self.query_root,
            mutation_root: self.mutation_root,
            subscription_root: self.subscription_root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_type_strips_wrappers() {
        assert_eq!(named_type("[String!]!"), "String");
        assert_eq!(named_type("Int"), "Int");
    }

    #[test]
    fn builds_schema_with_roots() {
        let schema = StaticSchema::builder()
            .query("Query", [("hello", "String")])
            .subscription("Subscription", [("tick", "Tick!")])
            .object("Tick", [("count", "Int!"), ("at", "DateTime")])
            .scalar("DateTime")
            .build()
            .unwrap();

        assert_eq!(schema.root(OperationType::Query).unwrap().name, "Query");
        assert_eq!(schema.root(OperationType::Subscription).unwrap().name, "Subscription");
        assert!(schema.root(OperationType::Mutation).is_none());
        assert!(schema.is_scalar("DateTime"));
        assert_eq!(
            schema.object("Subscription").unwrap().field("tick").unwrap().named_type(),
            "Tick"
        );
    }

    #[test]
    fn rejects_unknown_field_type() {
        let err = StaticSchema::builder()
            .subscription("Subscription", [("tick", "Tick")])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType { ref type_name, .. } if type_name == "Tick"));
    }

    #[test]
    fn rejects_malformed_type_ref() {
        let err = StaticSchema::builder()
            .subscription("Subscription", [("users", "[String")])
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidTypeRef { .. }));
    }

    #[test]
    fn rejects_duplicate_types() {
        let err = StaticSchema::builder()
            .object("Thing", [("a", "Int")])
            .object("Thing", [("b", "Int")])
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateType("Thing".into()));

        let err = StaticSchema::builder().object("String", [("a", "Int")]).build().unwrap_err();
        assert_eq!(err, SchemaError::DuplicateType("String".into()));
    }

    #[test]
    fn rejects_empty_object() {
        let fields: [(&str, &str); 0] = [];
        let err = StaticSchema::builder().object("Empty", fields).build().unwrap_err();
        assert_eq!(err, SchemaError::EmptyObject("Empty".into()));
    }

    #[test]
    fn empty_schema_has_no_roots() {
        let schema = StaticSchema::builder().build().unwrap();
        assert!(schema.root(OperationType::Subscription).is_none());
    }
}
