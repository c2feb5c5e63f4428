//! Reference resolver over a catalog of known agreements

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use daia_core::{ReferenceResolution, ReferenceResolver, ResolveError};

/// Maps a reference type to the pointer of an agreement of that type
#[derive(Default)]
pub struct CatalogReferenceResolver {
    entries: RwLock<HashMap<String, String>>,
}

impl CatalogReferenceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `pointer` as the agreement to use for `reference_type`
    ///
    /// Replaces any earlier entry for the same type.
    pub fn register(
        &self,
        reference_type: impl Into<String>,
        pointer: impl Into<String>,
    ) -> Result<(), ResolveError> {
        self.entries
            .write()
            .map_err(|e| ResolveError::Other(e.to_string()))?
            .insert(reference_type.into(), pointer.into());
        Ok(())
    }

    pub fn with_entry(
        mut self,
        reference_type: impl Into<String>,
        pointer: impl Into<String>,
    ) -> Self {
        // Owned, so no other holder can be mid-write
        self.entries
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reference_type.into(), pointer.into());
        self
    }
}

#[async_trait]
impl ReferenceResolver for CatalogReferenceResolver {
    async fn create_proof(
        &self,
        reference_type: &str,
    ) -> Result<Option<ReferenceResolution>, ResolveError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| ResolveError::Other(e.to_string()))?;

        Ok(entries.get(reference_type).map(|pointer| ReferenceResolution {
            pointer: pointer.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_known_and_unknown_types() {
        let catalog = CatalogReferenceResolver::new().with_entry("MEMBERSHIP", "tx-1");

        let found = catalog.create_proof("MEMBERSHIP").await.unwrap();
        assert_eq!(
            found,
            Some(ReferenceResolution {
                pointer: "tx-1".to_string()
            })
        );
        assert_eq!(catalog.create_proof("PERMIT").await.unwrap(), None);

        catalog.register("MEMBERSHIP", "tx-2").unwrap();
        assert_eq!(
            catalog.create_proof("MEMBERSHIP").await.unwrap().unwrap().pointer,
            "tx-2"
        );
    }

    #[test]
    fn test_with_entry_survives_poisoned_lock() {
        let catalog = Arc::new(CatalogReferenceResolver::new());
        let poisoner = catalog.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(catalog.entries.is_poisoned());

        let catalog = Arc::try_unwrap(catalog)
            .ok()
            .unwrap()
            .with_entry("MEMBERSHIP", "tx-1");
        let entries = catalog
            .entries
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        assert_eq!(entries.get("MEMBERSHIP").map(String::as_str), Some("tx-1"));
    }
}
