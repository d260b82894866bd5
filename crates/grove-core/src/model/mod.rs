//! Object-graph model: schemas, values, identities, snapshots

pub mod object;
pub mod schema;
pub mod value;

pub use object::{ObjectId, ObjectSnapshot, PropertyValue};
pub use schema::{
    AttributeDescription, EntityDescription, ModelSchema, RelationshipDescription, SchemaError,
};
pub use value::{AttributeKind, Value};
