//! Helpers for field-by-field deltas
//!
//! Concrete tasks compute their delta by running [`changed`] over each of
//! their `Option` fields, list the populated ones with [`populated`], and
//! validate them with [`immutable`] and [`required`].

use crate::error::{Error, Result};
use crate::task::TaskKey;

/// Delta value of a single field: `expected` when it is set and differs
/// from `actual`
pub fn changed<T: PartialEq + Clone>(actual: &Option<T>, expected: &Option<T>) -> Option<T> {
    match expected {
        Some(value) if actual.as_ref() != Some(value) => Some(value.clone()),
        _ => None,
    }
}

/// Names of the fields flagged as populated
pub fn populated<const N: usize>(fields: [(&'static str, bool); N]) -> Vec<&'static str> {
    fields
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
}

/// Reject a change to a field that is fixed once the resource exists
pub fn immutable<T>(
    task: &TaskKey,
    field: &'static str,
    actual_exists: bool,
    change: &Option<T>,
) -> Result<()> {
    if actual_exists && change.is_some() {
        return Err(Error::cannot_change(task, field));
    }
    Ok(())
}

/// Reject creation when a mandatory field has no expected value
pub fn required<T>(
    task: &TaskKey,
    field: &'static str,
    actual_exists: bool,
    expected: &Option<T>,
) -> Result<()> {
    if !actual_exists && expected.is_none() {
        return Err(Error::required(task, field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed() {
        let a = Some("10.0.0.0/16".to_string());
        let b = Some("10.1.0.0/16".to_string());

        assert_eq!(changed(&a, &b), b);
        assert_eq!(changed(&a, &a), None);
        // Unset expected values never produce a change
        assert_eq!(changed(&a, &None), None);
        assert_eq!(changed(&None, &a), a);
    }

    #[test]
    fn test_populated() {
        assert_eq!(
            populated([("cidr", true), ("tags", false), ("zone", true)]),
            vec!["cidr", "zone"]
        );
    }

    #[test]
    fn test_validation_helpers() {
        let key = TaskKey::new("Subnet", "sub1");

        assert!(immutable(&key, "cidr", false, &Some(1)).is_ok());
        assert!(matches!(
            immutable(&key, "cidr", true, &Some(1)),
            Err(Error::CannotChangeField { field: "cidr", .. })
        ));
        assert!(immutable::<u8>(&key, "cidr", true, &None).is_ok());

        assert!(required(&key, "cidr", true, &None::<u8>).is_ok());
        assert!(matches!(
            required(&key, "cidr", false, &None::<u8>),
            Err(Error::RequiredField { field: "cidr", .. })
        ));
    }
}
