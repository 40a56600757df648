use crate::element::ElementType;
use crate::error::Error;
use crate::filter::ElementSelection;
use nalgebra::allocator::Allocator;
use nalgebra::{DMatrix, DefaultAllocator, DimName, OPoint, Scalar, U1, U2, U3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::slice::ChunksExact;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod procedural;

/// A process-unique stamp of the content state of a mesh.
///
/// A fresh revision is drawn at construction and by every mutating method. Clones share the
/// revision of their source until one of them is mutated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for Revision {
    fn default() -> Self {
        Self::next()
    }
}

/// Named, sorted and duplicate-free index sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(BTreeMap<String, Vec<usize>>);

impl Tags {
    pub fn get(&self, name: &str) -> Option<&[usize]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.0
            .iter()
            .map(|(name, ids)| (name.as_str(), ids.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds the indices to the tag, creating it if necessary.
    fn insert(&mut self, name: &str, ids: impl IntoIterator<Item = usize>) {
        let entry = self.0.entry(name.to_string()).or_default();
        entry.extend(ids);
        entry.sort_unstable();
        entry.dedup();
    }

    /// Keeps the indices present in `map` and renames them.
    fn remapped(&self, map: &BTreeMap<usize, usize>) -> Self {
        let mut result = Self::default();
        for (name, ids) in &self.0 {
            result.insert(name, ids.iter().filter_map(|i| map.get(i).copied()));
        }
        result
    }
}

/// All elements of a single type, with their tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementBlock {
    element_type: ElementType,
    connectivity: Vec<usize>,
    tags: Tags,
    original_ids: Option<Vec<usize>>,
}

impl ElementBlock {
    fn new(element_type: ElementType) -> Self {
        Self {
            element_type,
            connectivity: Vec::new(),
            tags: Tags::default(),
            original_ids: None,
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn len(&self) -> usize {
        self.connectivity.len() / self.element_type.num_nodes()
    }

    pub fn is_empty(&self) -> bool {
        self.connectivity.is_empty()
    }

    /// Flat connectivity, `num_nodes()` entries per element.
    pub fn connectivity(&self) -> &[usize] {
        &self.connectivity
    }

    /// Global node indices of local element `index`.
    ///
    /// Panics if the index is out of bounds.
    pub fn element(&self, index: usize) -> &[usize] {
        let n = self.element_type.num_nodes();
        &self.connectivity[n * index..n * (index + 1)]
    }

    pub fn elements(&self) -> ChunksExact<'_, usize> {
        self.connectivity
            .chunks_exact(self.element_type.num_nodes())
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// For each element, its local index in the block of the mesh this one was derived from.
    pub fn original_ids(&self) -> Option<&[usize]> {
        self.original_ids.as_deref()
    }
}

/// A mesh made of element blocks, one per element type.
///
/// Elements get a global index by concatenating the blocks in [`ElementType`] order.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Mesh<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    #[serde(bound(
        serialize = "<DefaultAllocator as Allocator<T, D>>::Buffer: Serialize",
        deserialize = "<DefaultAllocator as Allocator<T, D>>::Buffer: Deserialize<'de>"
    ))]
    vertices: Vec<OPoint<T, D>>,
    blocks: BTreeMap<ElementType, ElementBlock>,
    node_tags: Tags,
    original_node_ids: Option<Vec<usize>>,
    #[serde(skip)]
    revision: Revision,
}

pub type Mesh1d<T> = Mesh<T, U1>;
pub type Mesh2d<T> = Mesh<T, U2>;
pub type Mesh3d<T> = Mesh<T, U3>;

impl<T, D> Mesh<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// A mesh with the given nodes and no elements.
    pub fn from_vertices(vertices: Vec<OPoint<T, D>>) -> Self {
        Self {
            vertices,
            blocks: BTreeMap::new(),
            node_tags: Tags::default(),
            original_node_ids: None,
            revision: Revision::next(),
        }
    }

    /// Convenience builder around [`add_block`](Self::add_block).
    pub fn with_block(mut self, element_type: ElementType, connectivity: Vec<usize>) -> Result<Self, Error> {
        self.add_block(element_type, connectivity)?;
        Ok(self)
    }

    /// Appends elements of the given type, given as flat connectivity.
    pub fn add_block(&mut self, element_type: ElementType, connectivity: Vec<usize>) -> Result<(), Error> {
        let invalid = |reason: String| Error::InvalidConnectivity { element_type, reason };
        let arity = element_type.num_nodes();
        if connectivity.len() % arity != 0 {
            return Err(invalid(format!(
                "{} indices is not a multiple of the element arity {arity}",
                connectivity.len()
            )));
        }
        if let Some(&node) = connectivity
            .iter()
            .find(|&&node| node >= self.vertices.len())
        {
            return Err(invalid(format!(
                "node index {node} out of bounds for {} nodes",
                self.vertices.len()
            )));
        }
        let block = self
            .blocks
            .entry(element_type)
            .or_insert_with(|| ElementBlock::new(element_type));
        if block.original_ids.is_some() && !connectivity.is_empty() {
            return Err(invalid("cannot append to a block that carries original ids".to_string()));
        }
        block.connectivity.extend(connectivity);
        self.touch();
        Ok(())
    }

    /// Tags elements of a block, given by local index.
    pub fn add_element_tag(&mut self, element_type: ElementType, name: &str, ids: &[usize]) -> Result<(), Error> {
        let block = self
            .blocks
            .get_mut(&element_type)
            .ok_or_else(|| Error::InvalidConnectivity {
                element_type,
                reason: "the mesh has no block of this type".to_string(),
            })?;
        if let Some(&id) = ids.iter().find(|&&id| id >= block.len()) {
            return Err(Error::InvalidConnectivity {
                element_type,
                reason: format!("element index {id} out of bounds for tag `{name}`"),
            });
        }
        block.tags.insert(name, ids.iter().copied());
        self.touch();
        Ok(())
    }

    pub fn add_node_tag(&mut self, name: &str, ids: &[usize]) -> Result<(), Error> {
        if let Some(&id) = ids.iter().find(|&&id| id >= self.vertices.len()) {
            return Err(Error::DataSizeMismatch {
                expected: self.vertices.len(),
                actual: id + 1,
            });
        }
        self.node_tags.insert(name, ids.iter().copied());
        self.touch();
        Ok(())
    }

    pub fn set_original_node_ids(&mut self, ids: Vec<usize>) -> Result<(), Error> {
        if ids.len() != self.vertices.len() {
            return Err(Error::DataSizeMismatch {
                expected: self.vertices.len(),
                actual: ids.len(),
            });
        }
        self.original_node_ids = Some(ids);
        self.touch();
        Ok(())
    }

    pub fn set_original_element_ids(&mut self, element_type: ElementType, ids: Vec<usize>) -> Result<(), Error> {
        let block = self
            .blocks
            .get_mut(&element_type)
            .ok_or_else(|| Error::MissingOriginalIds {
                what: format!("{element_type} elements (no such block)"),
            })?;
        if ids.len() != block.len() {
            return Err(Error::DataSizeMismatch {
                expected: block.len(),
                actual: ids.len(),
            });
        }
        block.original_ids = Some(ids);
        self.touch();
        Ok(())
    }

    pub fn vertices(&self) -> &[OPoint<T, D>] {
        &self.vertices
    }

    /// Mutable access to the node positions. Draws a new revision.
    pub fn vertices_mut(&mut self) -> &mut [OPoint<T, D>] {
        self.touch();
        &mut self.vertices
    }

    pub fn num_nodes(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_elements(&self) -> usize {
        self.blocks.values().map(ElementBlock::len).sum()
    }

    /// Element blocks in [`ElementType`] order.
    pub fn blocks(&self) -> impl Iterator<Item = &ElementBlock> {
        self.blocks.values()
    }

    pub fn block(&self, element_type: ElementType) -> Option<&ElementBlock> {
        self.blocks.get(&element_type)
    }

    pub fn element_types(&self) -> impl Iterator<Item = ElementType> + '_ {
        self.blocks.keys().copied()
    }

    /// Global index of the first element of the given type.
    pub fn global_offset(&self, element_type: ElementType) -> usize {
        self.blocks
            .range(..element_type)
            .map(|(_, block)| block.len())
            .sum()
    }

    /// Maps a global element index back to its block and local index.
    pub fn locate_element(&self, global_index: usize) -> Option<(ElementType, usize)> {
        let mut offset = 0;
        for block in self.blocks.values() {
            if global_index < offset + block.len() {
                return Some((block.element_type, global_index - offset));
            }
            offset += block.len();
        }
        None
    }

    /// The largest dimension among the non-empty blocks, or `None` for a mesh without elements.
    pub fn dimensionality(&self) -> Option<usize> {
        self.blocks
            .values()
            .filter(|block| !block.is_empty())
            .map(|block| block.element_type.dimension())
            .max()
    }

    pub fn node_tags(&self) -> &Tags {
        &self.node_tags
    }

    /// For each node, its index in the mesh this one was derived from.
    pub fn original_node_ids(&self) -> Option<&[usize]> {
        self.original_node_ids.as_deref()
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = Revision::next();
    }

    /// Node coordinates of an element as rows of a `num_nodes x D` matrix.
    pub fn element_node_matrix(&self, block: &ElementBlock, index: usize) -> DMatrix<T> {
        let nodes = block.element(index);
        DMatrix::from_fn(nodes.len(), D::dim(), |i, j| self.vertices[nodes[i]][j].clone())
    }

    /// Builds a new mesh from the selected elements and the nodes they use.
    ///
    /// Nodes keep their relative order. The result carries original ids referring back to this
    /// mesh, for both nodes and elements, and the tags restricted to what survives.
    pub fn extract_elements(&self, selection: &ElementSelection) -> Self {
        let mut used = vec![false; self.num_nodes()];
        for (element_type, ids) in selection.iter() {
            if let Some(block) = self.block(element_type) {
                for &e in &ids {
                    for &node in block.element(e) {
                        used[node] = true;
                    }
                }
            }
        }
        let kept_nodes: Vec<usize> = (0..self.num_nodes()).filter(|&i| used[i]).collect();
        let node_map: BTreeMap<usize, usize> = kept_nodes
            .iter()
            .enumerate()
            .map(|(new, &old)| (old, new))
            .collect();

        let mut blocks = BTreeMap::new();
        for (element_type, ids) in selection.iter() {
            let Some(block) = self.block(element_type) else {
                continue;
            };
            let connectivity = ids
                .iter()
                .flat_map(|&e| block.element(e).iter().map(|node| node_map[node]))
                .collect();
            let element_map: BTreeMap<usize, usize> = ids
                .iter()
                .enumerate()
                .map(|(new, &old)| (old, new))
                .collect();
            blocks.insert(
                element_type,
                ElementBlock {
                    element_type,
                    connectivity,
                    tags: block.tags.remapped(&element_map),
                    original_ids: Some(ids),
                },
            );
        }

        Self {
            vertices: kept_nodes
                .iter()
                .map(|&i| self.vertices[i].clone())
                .collect(),
            blocks,
            node_tags: self.node_tags.remapped(&node_map),
            original_node_ids: Some(kept_nodes),
            revision: Revision::next(),
        }
    }
}

