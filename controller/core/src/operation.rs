use serde::Serialize;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// An admission operation that a policy may permit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown operation '{0}'")]
pub struct UnknownOperation(pub String);

/// The operations permitted by an object's policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationSet {
    /// No policy is set, so every operation is permitted.
    Unspecified,

    /// A policy is set with an empty value, so no operation is permitted.
    Empty,

    /// An explicit list of permitted operations. Duplicates are retained.
    List(Vec<Operation>),
}

// === impl Operation ===

impl Operation {
    pub const ALL: [Self; 4] = [Self::Create, Self::Update, Self::Delete, Self::Connect];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
        }
    }
}

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "CONNECT" => Ok(Self::Connect),
            s => Err(UnknownOperation(s.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl OperationSet ===

impl OperationSet {
    pub fn contains(&self, op: Operation) -> bool {
        match self {
            Self::Unspecified => true,
            Self::Empty => false,
            Self::List(ops) => ops.contains(&op),
        }
    }

    /// Lists the permitted operations in policy order.
    pub fn operations(&self) -> &[Operation] {
        match self {
            Self::Unspecified => &Operation::ALL,
            Self::Empty => &[],
            Self::List(ops) => ops,
        }
    }
}

/// Collects operations, dropping repeats while preserving the order in which
/// each operation was first seen.
pub(crate) fn dedup<'a>(ops: impl IntoIterator<Item = &'a Operation>) -> Vec<Operation> {
    let mut uniq = Vec::with_capacity(Operation::ALL.len());
    for op in ops {
        if !uniq.contains(op) {
            uniq.push(*op);
        }
    }
    uniq
}
