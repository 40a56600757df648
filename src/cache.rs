//! Memoization of numberings and transfer operators.
//!
//! Entries are keyed by the mesh revision and content descriptors rather than by object
//! identity, so a mutated mesh never hits a stale entry. Values are computed outside the lock;
//! when two threads race on the same key, the first value inserted wins.
use crate::error::Error;
use crate::filter::ElementSelector;
use crate::mesh::{Mesh, Revision};
use crate::numbering::DofNumbering;
use crate::quadrature::IntegrationRules;
use crate::space::Space;
use crate::transfer::{TransferMethod, TransferOperator};
use crate::Real;
use log::debug;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Scalar};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::sync::Arc;

fn get_or_compute<K, V, E>(
    entries: &Mutex<FxHashMap<K, Arc<V>>>,
    key: K,
    compute: impl FnOnce() -> Result<V, E>,
) -> Result<Arc<V>, E>
where
    K: Hash + Eq,
{
    if let Some(value) = entries.lock().get(&key) {
        return Ok(Arc::clone(value));
    }
    let value = Arc::new(compute()?);
    Ok(Arc::clone(entries.lock().entry(key).or_insert(value)))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NumberingKey {
    revision: Revision,
    space: String,
    filter: Option<ElementSelector>,
    discontinuous: bool,
    from_connectivity: bool,
}

/// Numberings by (mesh revision, space descriptor, filter, continuity).
#[derive(Debug, Default)]
pub struct NumberingCache {
    entries: Mutex<FxHashMap<NumberingKey, Arc<DofNumbering>>>,
}

impl NumberingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cached [`DofNumbering::general`].
    pub fn general<T, D>(
        &self,
        mesh: &Mesh<T, D>,
        space: &Space<T>,
        filter: Option<&ElementSelector>,
        discontinuous: bool,
    ) -> Result<Arc<DofNumbering>, Error>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let key = NumberingKey {
            revision: mesh.revision(),
            space: space.descriptor().to_string(),
            filter: filter.cloned(),
            discontinuous,
            from_connectivity: false,
        };
        get_or_compute(&self.entries, key, || {
            debug!("numbering cache miss for `{space}`");
            DofNumbering::general(mesh, space, filter, discontinuous)
        })
    }

    /// A cached [`DofNumbering::from_connectivity`].
    pub fn from_connectivity<T, D>(&self, mesh: &Mesh<T, D>, space: &Space<T>) -> Result<Arc<DofNumbering>, Error>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let key = NumberingKey {
            revision: mesh.revision(),
            space: space.descriptor().to_string(),
            filter: None,
            discontinuous: false,
            from_connectivity: true,
        };
        get_or_compute(&self.entries, key, || DofNumbering::from_connectivity(mesh, space))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OperatorKey {
    revision: Revision,
    space: String,
    numbering: u64,
    rules: String,
    derivative: Option<usize>,
    filter: Option<ElementSelector>,
}

/// Transfer operators by (mesh revision, space, numbering, rule set, derivative, filter).
///
/// The construction method is not part of the key: both methods give the same operator.
#[derive(Debug)]
pub struct TransferOperatorCache<T: Scalar> {
    entries: Mutex<FxHashMap<OperatorKey, Arc<TransferOperator<T>>>>,
}

impl<T: Scalar> Default for TransferOperatorCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<T: Real> TransferOperatorCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get_or_build<D>(
        &self,
        mesh: &Mesh<T, D>,
        space: &Space<T>,
        numbering: &DofNumbering,
        rules: &Arc<IntegrationRules<T>>,
        derivative: Option<usize>,
        filter: Option<&ElementSelector>,
        method: TransferMethod,
    ) -> Result<Arc<TransferOperator<T>>, Error>
    where
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let key = OperatorKey {
            revision: mesh.revision(),
            space: space.descriptor().to_string(),
            numbering: numbering.fingerprint(),
            rules: rules.key().to_string(),
            derivative,
            filter: filter.cloned(),
        };
        get_or_compute(&self.entries, key, || {
            debug!("operator cache miss for `{space}` on {}", rules.key());
            TransferOperator::build(mesh, space, numbering, Arc::clone(rules), derivative, filter, method)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
