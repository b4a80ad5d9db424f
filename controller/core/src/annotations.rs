//! Parses the policy annotations of a cluster object.

use crate::{Annotations, Operation, OperationSet};
use thiserror::Error;

/// All annotations under this prefix are reserved for policy directives.
pub const PREFIX: &str = "rp.k14s.io/";

/// Lists the operations permitted on an object.
///
/// An absent annotation permits every operation; an empty value permits none.
pub const ALLOWED_OPERATIONS: &str = "rp.k14s.io/allowed-operations";

const KNOWN: &[&str] = &[ALLOWED_OPERATIONS];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("unknown annotation '{key}' with prefix '{prefix}'")]
    UnknownAnnotation { key: String, prefix: &'static str },

    #[error(
        "annotation '{key}' contains unknown allowed operation '{0}'",
        key = ALLOWED_OPERATIONS
    )]
    UnknownOperation(String),
}

/// Validates all reserved annotations and returns the permitted operations.
pub fn parse(annotations: &Annotations) -> Result<OperationSet, PolicyError> {
    check_unknown(annotations)?;
    allowed_operations(annotations)
}

/// Fails if any annotation under [`PREFIX`] is not a known policy directive.
///
/// Annotations are checked in key order, so the first offending key is always
/// the one reported.
pub fn check_unknown(annotations: &Annotations) -> Result<(), PolicyError> {
    match annotations
        .keys()
        .find(|key| key.starts_with(PREFIX) && !KNOWN.contains(&key.as_str()))
    {
        Some(key) => Err(PolicyError::UnknownAnnotation {
            key: key.clone(),
            prefix: PREFIX,
        }),
        None => Ok(()),
    }
}

/// Reads the [`ALLOWED_OPERATIONS`] annotation.
pub fn allowed_operations(annotations: &Annotations) -> Result<OperationSet, PolicyError> {
    let value = match annotations.get(ALLOWED_OPERATIONS) {
        None => return Ok(OperationSet::Unspecified),
        Some(v) if v.is_empty() => return Ok(OperationSet::Empty),
        Some(v) => v,
    };

    value
        .split(',')
        .map(|token| {
            token
                .parse::<Operation>()
                .map_err(|_| PolicyError::UnknownOperation(token.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(OperationSet::List)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn absent_is_unspecified() {
        let anns = btreemap! {
            "app.kubernetes.io/name".to_string() => "web".to_string(),
        };
        assert_eq!(parse(&anns), Ok(OperationSet::Unspecified));
        assert_eq!(parse(&Annotations::new()), Ok(OperationSet::Unspecified));
    }

    #[test]
    fn empty_is_deny_all() {
        let anns = btreemap! {
            ALLOWED_OPERATIONS.to_string() => "".to_string(),
        };
        assert_eq!(parse(&anns), Ok(OperationSet::Empty));
    }

    #[test]
    fn list_keeps_order_and_duplicates() {
        let anns = btreemap! {
            ALLOWED_OPERATIONS.to_string() => "DELETE,CREATE,DELETE".to_string(),
        };
        assert_eq!(
            parse(&anns),
            Ok(OperationSet::List(vec![
                Operation::Delete,
                Operation::Create,
                Operation::Delete,
            ]))
        );
    }

    #[test]
    fn unknown_token() {
        let anns = btreemap! {
            ALLOWED_OPERATIONS.to_string() => "CREATE,BOGUS,ALSO_BOGUS".to_string(),
        };
        let err = parse(&anns).unwrap_err();
        assert_eq!(err, PolicyError::UnknownOperation("BOGUS".to_string()));
        assert_eq!(
            err.to_string(),
            "annotation 'rp.k14s.io/allowed-operations' contains unknown allowed operation 'BOGUS'"
        );
    }

    #[test]
    fn tokens_are_not_trimmed() {
        let anns = btreemap! {
            ALLOWED_OPERATIONS.to_string() => "CREATE, DELETE".to_string(),
        };
        assert_eq!(
            parse(&anns),
            Err(PolicyError::UnknownOperation(" DELETE".to_string()))
        );

        let anns = btreemap! {
            ALLOWED_OPERATIONS.to_string() => "CREATE,".to_string(),
        };
        assert_eq!(
            parse(&anns),
            Err(PolicyError::UnknownOperation("".to_string()))
        );
    }

    #[test]
    fn unknown_annotation() {
        let anns = btreemap! {
            "rp.k14s.io/allowed-operation".to_string() => "CREATE".to_string(),
        };
        let err = parse(&anns).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown annotation 'rp.k14s.io/allowed-operation' with prefix 'rp.k14s.io/'"
        );
    }

    #[test]
    fn unknown_annotation_checked_before_policy() {
        let anns = btreemap! {
            ALLOWED_OPERATIONS.to_string() => "NOPE".to_string(),
            "rp.k14s.io/zzz".to_string() => "".to_string(),
        };
        assert!(matches!(
            parse(&anns),
            Err(PolicyError::UnknownAnnotation { key, .. }) if key == "rp.k14s.io/zzz"
        ));
    }

    #[test]
    fn reports_first_unknown_key() {
        let anns = btreemap! {
            "rp.k14s.io/b".to_string() => "".to_string(),
            "rp.k14s.io/a".to_string() => "".to_string(),
        };
        assert!(matches!(
            check_unknown(&anns),
            Err(PolicyError::UnknownAnnotation { key, .. }) if key == "rp.k14s.io/a"
        ));
    }

    #[test]
    fn other_prefixes_ignored() {
        let anns = btreemap! {
            "k14s.io/allowed-operations".to_string() => "BOGUS".to_string(),
            "xrp.k14s.io/foo".to_string() => "".to_string(),
        };
        assert_eq!(check_unknown(&anns), Ok(()));
    }
}
