//! Element and node filters, and their set combinations.
//!
//! A filter describes a subset of a mesh independently of any particular mesh. Applying it
//! to a mesh gives an [`ElementSelection`] (one bit set per block) or a sorted list of nodes.
use crate::element::ElementType;
use crate::mesh::Mesh;
use fixedbitset::FixedBitSet;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Scalar};
use std::collections::BTreeMap;

/// Selected elements of a mesh, per element type, by local index.
#[derive(Debug, Clone, Default)]
pub struct ElementSelection {
    sets: BTreeMap<ElementType, FixedBitSet>,
}

impl ElementSelection {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every element of the mesh.
    pub fn full<T, D>(mesh: &Mesh<T, D>) -> Self
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let sets = mesh
            .blocks()
            .map(|block| {
                let mut bits = FixedBitSet::with_capacity(block.len());
                bits.set_range(.., true);
                (block.element_type(), bits)
            })
            .collect();
        Self { sets }
    }

    /// Selects the given local indices of one element type.
    pub fn from_ids(element_type: ElementType, ids: impl IntoIterator<Item = usize>) -> Self {
        let mut sets = BTreeMap::new();
        sets.insert(element_type, ids.into_iter().collect());
        Self { sets }
    }

    pub fn contains(&self, element_type: ElementType, index: usize) -> bool {
        self.sets
            .get(&element_type)
            .map(|bits| bits.contains(index))
            .unwrap_or(false)
    }

    /// Sorted local indices of the selected elements of one type.
    pub fn ids(&self, element_type: ElementType) -> Vec<usize> {
        self.sets
            .get(&element_type)
            .map(|bits| bits.ones().collect())
            .unwrap_or_default()
    }

    /// Element types with at least one selected element, with their sorted local indices.
    pub fn iter(&self) -> impl Iterator<Item = (ElementType, Vec<usize>)> + '_ {
        self.sets
            .iter()
            .map(|(ty, bits)| (*ty, bits.ones().collect::<Vec<_>>()))
            .filter(|(_, ids)| !ids.is_empty())
    }

    pub fn element_types(&self) -> impl Iterator<Item = ElementType> + '_ {
        self.iter().map(|(ty, _)| ty)
    }

    pub fn count(&self) -> usize {
        self.sets.values().map(|bits| bits.count_ones(..)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// The largest dimension among the selected elements.
    pub fn dimensionality(&self) -> Option<usize> {
        self.element_types().map(|ty| ty.dimension()).max()
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let sets = self
            .sets
            .iter()
            .filter_map(|(ty, bits)| {
                other.sets.get(ty).map(|other_bits| {
                    let mut bits = bits.clone();
                    bits.intersect_with(other_bits);
                    (*ty, bits)
                })
            })
            .collect();
        Self { sets }
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut sets = self.sets.clone();
        for (ty, other_bits) in &other.sets {
            sets.entry(*ty)
                .or_insert_with(FixedBitSet::new)
                .union_with(other_bits);
        }
        Self { sets }
    }

    /// Elements of the mesh not in this selection.
    pub fn complement<T, D>(&self, mesh: &Mesh<T, D>) -> Self
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let mut full = Self::full(mesh);
        for (ty, bits) in full.sets.iter_mut() {
            if let Some(selected) = self.sets.get(ty) {
                bits.difference_with(selected);
            }
        }
        full
    }
}

impl PartialEq for ElementSelection {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

/// Criteria on elements. Every given criterion must hold.
///
/// The default filter accepts every element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ElementFilter {
    element_types: Option<Vec<ElementType>>,
    dimensionality: Option<usize>,
    tags: Vec<String>,
    global_ids: Option<Vec<usize>>,
}

impl ElementFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only elements of the given type. Can be repeated to allow several types.
    pub fn with_element_type(mut self, element_type: ElementType) -> Self {
        self.element_types
            .get_or_insert_with(Vec::new)
            .push(element_type);
        self
    }

    pub fn with_dimensionality(mut self, dimensionality: usize) -> Self {
        self.dimensionality = Some(dimensionality);
        self
    }

    /// Keeps elements carrying the tag. With several tags an element needs any one of them.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Keeps elements by global index.
    pub fn with_global_ids(mut self, ids: impl IntoIterator<Item = usize>) -> Self {
        self.global_ids
            .get_or_insert_with(Vec::new)
            .extend(ids);
        self
    }

    pub fn select<T, D>(&self, mesh: &Mesh<T, D>) -> ElementSelection
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let mut sets = BTreeMap::new();
        let mut offset = 0;
        for block in mesh.blocks() {
            let ty = block.element_type();
            let n = block.len();
            let mut bits = FixedBitSet::with_capacity(n);
            let type_ok = self
                .element_types
                .as_ref()
                .map(|types| types.contains(&ty))
                .unwrap_or(true);
            let dim_ok = self
                .dimensionality
                .map(|d| d == ty.dimension())
                .unwrap_or(true);
            if type_ok && dim_ok {
                if self.tags.is_empty() {
                    bits.set_range(.., true);
                } else {
                    for tag in &self.tags {
                        for &e in block.tags().get(tag).unwrap_or(&[]) {
                            bits.insert(e);
                        }
                    }
                }
                if let Some(ids) = &self.global_ids {
                    let mut by_id = FixedBitSet::with_capacity(n);
                    for &g in ids {
                        if g >= offset && g < offset + n {
                            by_id.insert(g - offset);
                        }
                    }
                    bits.intersect_with(&by_id);
                }
            }
            sets.insert(ty, bits);
            offset += n;
        }
        ElementSelection { sets }
    }
}

/// A filter or a set combination of filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementSelector {
    Filter(ElementFilter),
    Intersection(Vec<ElementSelector>),
    Union(Vec<ElementSelector>),
    Complement(Box<ElementSelector>),
}

impl ElementSelector {
    /// Selects every element.
    pub fn all() -> Self {
        Self::Filter(ElementFilter::default())
    }

    pub fn and(self, other: impl Into<ElementSelector>) -> Self {
        Self::Intersection(vec![self, other.into()])
    }

    pub fn or(self, other: impl Into<ElementSelector>) -> Self {
        Self::Union(vec![self, other.into()])
    }

    pub fn complement(self) -> Self {
        Self::Complement(Box::new(self))
    }

    pub fn select<T, D>(&self, mesh: &Mesh<T, D>) -> ElementSelection
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        match self {
            Self::Filter(filter) => filter.select(mesh),
            Self::Intersection(parts) => parts
                .iter()
                .map(|part| part.select(mesh))
                .reduce(|a, b| a.intersection(&b))
                .unwrap_or_else(|| ElementSelection::full(mesh)),
            Self::Union(parts) => parts
                .iter()
                .map(|part| part.select(mesh))
                .fold(ElementSelection::empty(), |a, b| a.union(&b)),
            Self::Complement(inner) => inner.select(mesh).complement(mesh),
        }
    }
}

impl From<ElementFilter> for ElementSelector {
    fn from(filter: ElementFilter) -> Self {
        Self::Filter(filter)
    }
}

/// Criteria on nodes. Every given criterion must hold; without criteria every node is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodeFilter {
    tags: Vec<String>,
    ids: Option<Vec<usize>>,
    elements: Option<ElementSelector>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps nodes carrying the tag. With several tags a node needs any one of them.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_ids(mut self, ids: impl IntoIterator<Item = usize>) -> Self {
        self.ids.get_or_insert_with(Vec::new).extend(ids);
        self
    }

    /// Keeps nodes used by the selected elements.
    pub fn of_elements(mut self, selector: impl Into<ElementSelector>) -> Self {
        self.elements = Some(selector.into());
        self
    }

    /// Sorted indices of the selected nodes.
    pub fn select<T, D>(&self, mesh: &Mesh<T, D>) -> Vec<usize>
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let n = mesh.num_nodes();
        let mut selected = FixedBitSet::with_capacity(n);
        selected.set_range(.., true);

        if !self.tags.is_empty() {
            let mut tagged = FixedBitSet::with_capacity(n);
            for tag in &self.tags {
                tagged.extend(mesh.node_tags().get(tag).unwrap_or(&[]).iter().copied());
            }
            selected.intersect_with(&tagged);
        }
        if let Some(ids) = &self.ids {
            let mut by_id = FixedBitSet::with_capacity(n);
            by_id.extend(ids.iter().copied().filter(|&i| i < n));
            selected.intersect_with(&by_id);
        }
        if let Some(selector) = &self.elements {
            let mut used = FixedBitSet::with_capacity(n);
            for (ty, ids) in selector.select(mesh).iter() {
                if let Some(block) = mesh.block(ty) {
                    for e in ids {
                        used.extend(block.element(e).iter().copied());
                    }
                }
            }
            selected.intersect_with(&used);
        }
        selected.ones().collect()
    }
}

/// What a field description entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Elements(ElementSelector),
    Nodes(NodeFilter),
}

impl From<ElementFilter> for Selector {
    fn from(filter: ElementFilter) -> Self {
        Self::Elements(filter.into())
    }
}

impl From<ElementSelector> for Selector {
    fn from(selector: ElementSelector) -> Self {
        Self::Elements(selector)
    }
}

impl From<NodeFilter> for Selector {
    fn from(filter: NodeFilter) -> Self {
        Self::Nodes(filter)
    }
}
