#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotations;
pub mod audit;
mod decision;
pub mod engine;
mod operation;

pub use self::{
    audit::Audit,
    decision::Decision,
    engine::{AllowedOperations, DecisionEngine, ObjectKey, ObjectSource, Request, ResolveObject},
    operation::{Operation, OperationSet, UnknownOperation},
};

/// The annotations of a single cluster object.
pub type Annotations = std::collections::BTreeMap<String, String>;
