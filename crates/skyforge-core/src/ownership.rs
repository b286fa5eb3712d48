//! Cluster ownership tags
//!
//! Resources created for a cluster carry a tag naming that cluster. Listers
//! use it to decide which live resources belong to the cluster being torn
//! down.

use std::collections::BTreeMap;

/// Tag key holding the owning cluster's name
pub const CLUSTER_TAG: &str = "KubernetesCluster";

/// Whether `tags` mark a resource as owned by `cluster`
pub fn is_owned_by_cluster<'a, I, K, V>(tags: I, cluster: &str) -> bool
where
    I: IntoIterator<Item = (&'a K, &'a V)>,
    K: AsRef<str> + ?Sized + 'a,
    V: AsRef<str> + ?Sized + 'a,
{
    tags.into_iter()
        .any(|(key, value)| key.as_ref() == CLUSTER_TAG && value.as_ref() == cluster)
}

/// Add the ownership tag for `cluster` to `tags`
pub fn tag_owned(tags: &mut BTreeMap<String, String>, cluster: &str) {
    tags.insert(CLUSTER_TAG.to_string(), cluster.to_string());
}

/// Remove the ownership tag, leaving the user-declared tags
pub fn strip_owned(tags: &mut BTreeMap<String, String>) {
    tags.remove(CLUSTER_TAG);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_owned_by_cluster() {
        let mut tags = BTreeMap::new();
        tags.insert("Name".to_string(), "vnet1".to_string());
        assert!(!is_owned_by_cluster(&tags, "dev.example.com"));

        tag_owned(&mut tags, "dev.example.com");
        assert!(is_owned_by_cluster(&tags, "dev.example.com"));
        assert!(!is_owned_by_cluster(&tags, "prod.example.com"));

        strip_owned(&mut tags);
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_works_with_borrowed_maps() {
        let tags: HashMap<&str, &str> = HashMap::from([(CLUSTER_TAG, "dev")]);
        assert!(is_owned_by_cluster(&tags, "dev"));
    }
}
