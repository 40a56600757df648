//! Global DOF numbering of a space over a mesh.
//!
//! Every shape function slot of every numbered element is mapped to a canonical key describing
//! the mesh entity its DOF lives on. Equal keys get equal DOF indices, which makes DOFs on shared
//! nodes, edges and faces continuous across elements. Keys are numbered in order of first
//! appearance, visiting element types in order, then slots, then elements.
use crate::element::ElementType;
use crate::error::Error;
use crate::filter::{ElementFilter, ElementSelection, ElementSelector};
use crate::mesh::Mesh;
use crate::space::{DofAttachment, Space};
use crate::Real;
use itertools::Itertools;
use log::debug;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Scalar};
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// DOF indices of one element type, `num_elements x num_shape_functions`, row-major.
///
/// `None` marks a slot without DOF, which happens for elements that are not numbered or for
/// boundary slots no numbered element reaches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofTable {
    num_elements: usize,
    num_shape_functions: usize,
    entries: Vec<Option<usize>>,
}

impl DofTable {
    pub fn unassigned(num_elements: usize, num_shape_functions: usize) -> Self {
        Self {
            num_elements,
            num_shape_functions,
            entries: vec![None; num_elements * num_shape_functions],
        }
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn num_shape_functions(&self) -> usize {
        self.num_shape_functions
    }

    pub fn get(&self, element: usize, slot: usize) -> Option<usize> {
        self.entries[element * self.num_shape_functions + slot]
    }

    fn set(&mut self, element: usize, slot: usize, dof: usize) {
        self.entries[element * self.num_shape_functions + slot] = Some(dof);
    }

    /// DOFs of one element.
    pub fn row(&self, element: usize) -> &[Option<usize>] {
        let n = self.num_shape_functions;
        &self.entries[element * n..(element + 1) * n]
    }

    /// DOFs of one element, if all of its slots are assigned.
    pub fn complete_row(&self, element: usize) -> Option<Vec<usize>> {
        self.row(element).iter().copied().collect()
    }

    pub fn is_assigned(&self, element: usize) -> bool {
        self.row(element).iter().any(Option::is_some)
    }
}

/// The mesh entity a DOF lives on. Two slots with equal keys share their DOF.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DofKey {
    Point {
        node: usize,
        component: Option<usize>,
    },
    /// A slot of a single element, never shared.
    ElementSlot {
        element_type: ElementType,
        element: usize,
        slot: usize,
    },
    /// A cell, edge or face, identified by its type and sorted nodes.
    ///
    /// The interior DOFs of an element and the DOFs on the matching face of a higher-dimensional
    /// element share a key.
    Entity {
        entity_type: ElementType,
        nodes: Vec<usize>,
        index: usize,
    },
    Global {
        component: usize,
    },
    /// An integration point of a single element, never shared.
    IntegrationPoint {
        element_type: ElementType,
        element: usize,
        index: usize,
    },
}

/// The key of `slot` of local element `element`, whose connectivity is `nodes`.
fn canonical_key(
    element_type: ElementType,
    element: usize,
    nodes: &[usize],
    slot: usize,
    attachment: &DofAttachment,
    discontinuous: bool,
    space: &str,
) -> Result<DofKey, Error> {
    let out_of_range = |what: &str, index: usize| Error::IncompatibleSpace {
        element_type,
        space: space.to_string(),
        reason: format!("slot {slot} attached to {what} {index}, which the element does not have"),
    };
    let element_slot = DofKey::ElementSlot {
        element_type,
        element,
        slot,
    };
    let key = match *attachment {
        DofAttachment::Point { node, component } => {
            let &global = nodes
                .get(node)
                .ok_or_else(|| out_of_range("node", node))?;
            if discontinuous {
                element_slot
            } else {
                DofKey::Point { node: global, component }
            }
        }
        DofAttachment::Cell { index } => DofKey::Entity {
            entity_type: element_type,
            nodes: nodes.iter().copied().sorted_unstable().collect(),
            index,
        },
        DofAttachment::Edge { edge: local } | DofAttachment::Face { face: local } => {
            let (entities, what) = match attachment {
                DofAttachment::Edge { .. } => (element_type.edges(), "edge"),
                _ => (element_type.faces(), "face"),
            };
            let entity = entities
                .get(local)
                .ok_or_else(|| out_of_range(what, local))?;
            if discontinuous {
                element_slot
            } else {
                DofKey::Entity {
                    entity_type: entity.element_type,
                    nodes: entity.nodes.iter().map(|&i| nodes[i]).sorted_unstable().collect(),
                    index: 0,
                }
            }
        }
        DofAttachment::Global { component } => DofKey::Global { component },
        DofAttachment::IntegrationPoint { index } => DofKey::IntegrationPoint {
            element_type,
            element,
            index,
        },
    };
    Ok(key)
}

/// A global numbering: one [`DofTable`] per element type and the key of every DOF.
#[derive(Debug, Clone, PartialEq)]
pub struct DofNumbering {
    tables: BTreeMap<ElementType, DofTable>,
    size: usize,
    from_connectivity: bool,
    almanac: FxHashMap<DofKey, usize>,
}

/// Incremental construction of a [`DofNumbering`].
///
/// The bulk pass assigns new DOFs, the complementary pass only reuses existing ones.
pub struct NumberingBuilder<'a, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    mesh: &'a Mesh<T, D>,
    space: &'a Space<T>,
    discontinuous: bool,
    tables: BTreeMap<ElementType, DofTable>,
    almanac: FxHashMap<DofKey, usize>,
}

impl<'a, T, D> NumberingBuilder<'a, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn new(mesh: &'a Mesh<T, D>, space: &'a Space<T>, discontinuous: bool) -> Self {
        Self {
            mesh,
            space,
            discontinuous,
            tables: BTreeMap::new(),
            almanac: FxHashMap::default(),
        }
    }

    /// Number of DOFs assigned so far.
    pub fn size(&self) -> usize {
        self.almanac.len()
    }

    /// Assigns DOFs to every slot of the selected elements.
    pub fn number_bulk(&mut self, selection: &ElementSelection) -> Result<(), Error> {
        for (element_type, ids) in selection.iter() {
            let element_space = self
                .space
                .get(element_type)
                .ok_or_else(|| Error::MissingElementSpace {
                    element_type,
                    space: self.space.descriptor().to_string(),
                })?;
            let Some(block) = self.mesh.block(element_type) else {
                continue;
            };
            let table = self
                .tables
                .entry(element_type)
                .or_insert_with(|| DofTable::unassigned(block.len(), element_space.num_shape_functions()));

            for (slot, attachment) in element_space.attachments().iter().enumerate() {
                for &e in &ids {
                    let key = canonical_key(
                        element_type,
                        e,
                        block.element(e),
                        slot,
                        attachment,
                        self.discontinuous,
                        self.space.descriptor(),
                    )?;
                    let next = self.almanac.len();
                    let dof = *self.almanac.entry(key).or_insert(next);
                    table.set(e, slot, dof);
                }
            }
            debug!(
                "bulk: {} {} elements numbered, {} DOFs so far",
                ids.len(),
                element_type,
                self.almanac.len()
            );
        }
        Ok(())
    }

    /// Reuses existing DOFs for the slots of the selected elements. Slots whose key is unknown
    /// stay unassigned, element types the space does not define are skipped.
    pub fn number_complementary(&mut self, selection: &ElementSelection) -> Result<(), Error> {
        for (element_type, ids) in selection.iter() {
            let Some(element_space) = self.space.get(element_type) else {
                debug!("complementary: {element_type} is not part of the space, skipped");
                continue;
            };
            let Some(block) = self.mesh.block(element_type) else {
                continue;
            };
            let table = self
                .tables
                .entry(element_type)
                .or_insert_with(|| DofTable::unassigned(block.len(), element_space.num_shape_functions()));

            let mut reused = 0;
            for (slot, attachment) in element_space.attachments().iter().enumerate() {
                for &e in &ids {
                    let key = canonical_key(
                        element_type,
                        e,
                        block.element(e),
                        slot,
                        attachment,
                        self.discontinuous,
                        self.space.descriptor(),
                    )?;
                    if let Some(&dof) = self.almanac.get(&key) {
                        table.set(e, slot, dof);
                        reused += 1;
                    }
                }
            }
            debug!(
                "complementary: {} {} elements visited, {} slots matched",
                ids.len(),
                element_type,
                reused
            );
        }
        Ok(())
    }

    pub fn finish(self) -> DofNumbering {
        DofNumbering {
            size: self.almanac.len(),
            tables: self.tables,
            from_connectivity: false,
            almanac: self.almanac,
        }
    }
}

impl DofNumbering {
    /// Numbers the space over the elements selected by `filter` (all elements by default).
    ///
    /// Elements one dimension below the highest selected dimension that the filter leaves out
    /// receive the DOFs they share with the selected elements, so that boundary elements can
    /// address the bulk DOFs.
    pub fn general<T, D>(
        mesh: &Mesh<T, D>,
        space: &Space<T>,
        filter: Option<&ElementSelector>,
        discontinuous: bool,
    ) -> Result<Self, Error>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let bulk = match filter {
            Some(selector) => selector.select(mesh),
            None => ElementSelection::full(mesh),
        };
        let mut builder = NumberingBuilder::new(mesh, space, discontinuous);
        builder.number_bulk(&bulk)?;

        if let Some(dim) = bulk.dimensionality().filter(|&dim| dim > 0) {
            let complementary = ElementFilter::new()
                .with_dimensionality(dim - 1)
                .select(mesh)
                .intersection(&bulk.complement(mesh));
            builder.number_complementary(&complementary)?;
        }
        Ok(builder.finish())
    }

    /// DOF index equal to node index, one DOF per node.
    ///
    /// Every element space the space defines for a mesh block must attach its shape functions
    /// to the element nodes, in order.
    pub fn from_connectivity<T, D>(mesh: &Mesh<T, D>, space: &Space<T>) -> Result<Self, Error>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let mut tables = BTreeMap::new();
        for block in mesh.blocks() {
            let element_type = block.element_type();
            if let Some(element_space) = space.get(element_type) {
                let nodal = element_space
                    .attachments()
                    .iter()
                    .enumerate()
                    .all(|(i, a)| matches!(a, DofAttachment::Point { node, .. } if *node == i));
                if !nodal || element_space.num_shape_functions() != element_type.num_nodes() {
                    return Err(Error::IncompatibleSpace {
                        element_type,
                        space: space.descriptor().to_string(),
                        reason: "shape functions do not correspond one-to-one to element nodes".to_string(),
                    });
                }
            }
            let arity = element_type.num_nodes();
            let mut table = DofTable::unassigned(block.len(), arity);
            for (e, nodes) in block.elements().enumerate() {
                for (slot, &node) in nodes.iter().enumerate() {
                    table.set(e, slot, node);
                }
            }
            tables.insert(element_type, table);
        }
        let almanac = (0..mesh.num_nodes())
            .map(|node| (DofKey::Point { node, component: None }, node))
            .collect();
        Ok(Self {
            tables,
            size: mesh.num_nodes(),
            from_connectivity: true,
            almanac,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_from_connectivity(&self) -> bool {
        self.from_connectivity
    }

    pub fn get(&self, element_type: ElementType) -> Option<&DofTable> {
        self.tables.get(&element_type)
    }

    pub fn tables(&self) -> impl Iterator<Item = (ElementType, &DofTable)> {
        self.tables.iter().map(|(ty, table)| (*ty, table))
    }

    /// The key of every DOF.
    pub fn almanac(&self) -> &FxHashMap<DofKey, usize> {
        &self.almanac
    }

    pub fn dof_of(&self, key: &DofKey) -> Option<usize> {
        self.almanac.get(key).copied()
    }

    /// The scalar DOF attached to a node.
    pub fn dof_of_point(&self, node: usize) -> Option<usize> {
        self.dof_of(&DofKey::Point { node, component: None })
    }

    /// `(node, dof)` for every point-attached DOF, sorted.
    pub fn dof_to_point(&self) -> Vec<(usize, usize)> {
        let mut pairs: Vec<_> = self
            .almanac
            .iter()
            .filter_map(|(key, &dof)| match key {
                DofKey::Point { node, .. } => Some((*node, dof)),
                _ => None,
            })
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// `(global element index, dof)` for every DOF attached to an entity that is itself an
    /// element of the mesh, sorted.
    pub fn dof_to_cell<T, D>(&self, mesh: &Mesh<T, D>) -> Vec<(usize, usize)>
    where
        T: Scalar,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        let mut elements: FxHashMap<(ElementType, Vec<usize>), usize> = FxHashMap::default();
        for block in mesh.blocks() {
            let offset = mesh.global_offset(block.element_type());
            for (e, nodes) in block.elements().enumerate() {
                elements
                    .entry((block.element_type(), nodes.iter().copied().sorted_unstable().collect()))
                    .or_insert(offset + e);
            }
        }
        let mut pairs: Vec<_> = self
            .almanac
            .iter()
            .filter_map(|(key, &dof)| match key {
                DofKey::Entity {
                    entity_type, nodes, ..
                } => elements
                    .get(&(*entity_type, nodes.clone()))
                    .map(|&global| (global, dof)),
                _ => None,
            })
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// A hash of the tables, identifying the numbering in cache keys.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.size.hash(&mut hasher);
        self.from_connectivity.hash(&mut hasher);
        for (ty, table) in &self.tables {
            ty.hash(&mut hasher);
            table.num_shape_functions.hash(&mut hasher);
            table.entries.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Pairs of DOF indices `(a, b)` that occupy the same slot of the same element in two
/// numberings of one mesh.
///
/// Each DOF of `a` appears once, with the first matching DOF of `b`, and the pairs are sorted
/// by the DOF of `a`.
pub fn numbering_correspondence(a: &DofNumbering, b: &DofNumbering) -> (Vec<usize>, Vec<usize>) {
    let mut first: BTreeMap<usize, usize> = BTreeMap::new();
    for (ty, table_a) in a.tables() {
        let Some(table_b) = b.get(ty) else {
            continue;
        };
        if table_a.num_shape_functions != table_b.num_shape_functions {
            continue;
        }
        for (&da, &db) in table_a.entries.iter().zip(&table_b.entries) {
            if let (Some(da), Some(db)) = (da, db) {
                first.entry(da).or_insert(db);
            }
        }
    }
    first.into_iter().unzip()
}
