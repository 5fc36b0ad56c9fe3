//! Targets composed from named features, eg `"pSB1C3,lacZ:rev"`.

use crate::{error::AssemblyError, store::FeatureStore, target::reverse_complement};
use tracing::debug;

const REVERSE_SUFFIX: &str = ":rev";

/// One entry of a feature query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRef {
    pub name: String,
    pub reverse: bool,
}

/// Splits a comma-separated feature list. A `:rev` suffix, in any case, asks
/// for the reverse complement.
pub fn parse_query(query: &str) -> Result<Vec<FeatureRef>, AssemblyError> {
    let refs: Vec<FeatureRef> = query
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let lower = part.to_ascii_lowercase();
            match lower.ends_with(REVERSE_SUFFIX) {
                true => FeatureRef {
                    name: part[..part.len() - REVERSE_SUFFIX.len()].trim().to_string(),
                    reverse: true,
                },
                false => FeatureRef {
                    name: part.to_string(),
                    reverse: false,
                },
            }
        })
        .collect();
    if refs.is_empty() || refs.iter().any(|r| r.name.is_empty()) {
        return Err(AssemblyError::InvalidInput {
            message: format!("'{query}' does not name any features"),
        });
    }
    Ok(refs)
}

/// The concatenated sequence of the features named in `query`.
pub fn compose_target(query: &str, store: &FeatureStore) -> Result<String, AssemblyError> {
    let mut target = String::new();
    for feature in parse_query(query)? {
        let seq = store.get(&feature.name)?;
        match feature.reverse {
            true => target.push_str(&reverse_complement(seq)),
            false => target.push_str(seq),
        }
    }
    debug!(query, len = target.len(), "composed target from features");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SequenceStore;

    fn store() -> FeatureStore {
        let mut store = FeatureStore::new(SequenceStore::in_memory());
        store.set("ori", "AAACCC").unwrap();
        store.set("lacZ", "GGGTTA").unwrap();
        store
    }

    #[test]
    fn test_parse_query() {
        let refs = parse_query(" ori , lacZ:REV,").unwrap();
        assert_eq!(
            refs,
            vec![
                FeatureRef {
                    name: "ori".to_string(),
                    reverse: false
                },
                FeatureRef {
                    name: "lacZ".to_string(),
                    reverse: true
                },
            ]
        );
        assert!(parse_query(" , ").is_err());
        assert!(parse_query(":rev").is_err());
    }

    #[test]
    fn test_compose_target() {
        let store = store();
        assert_eq!(compose_target("ori,lacZ", &store).unwrap(), "AAACCCGGGTTA");
        assert_eq!(compose_target("ori,lacZ:rev", &store).unwrap(), "AAACCCTAACCC");
    }

    #[test]
    fn test_unknown_feature() {
        let err = compose_target("ori,gfp", &store()).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::NotFound { ref name, .. } if name == "gfp"
        ));
    }
}
