//! Basic procedural mesh generation routines.
use crate::element::ElementType;
use crate::error::Error;
use crate::mesh::{Mesh, Mesh1d, Mesh2d, Mesh3d};
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Point1, Point2, Point3, Scalar, Vector2, Vector3};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

fn from_usize<T: Real>(i: usize) -> T {
    T::from_usize(i).expect("Must be able to fit usize in T")
}

/// Splits `[start, end]` into `num_elements` equal `Bar2` elements.
pub fn create_uniform_bar_mesh<T: Real>(start: T, end: T, num_elements: usize) -> Mesh1d<T> {
    if num_elements == 0 {
        return Mesh::from_vertices(Vec::new());
    }
    let h = (end - start) / from_usize(num_elements);
    let vertices = (0..=num_elements)
        .map(|i| Point1::new(start + h * from_usize(i)))
        .collect();
    let connectivity = (0..num_elements).flat_map(|i| [i, i + 1]).collect();
    Mesh::from_vertices(vertices)
        .with_block(ElementType::Bar2, connectivity)
        .expect("Generated connectivity is valid")
}

pub fn create_unit_square_uniform_quad_mesh_2d<T: Real>(cells_per_dim: usize) -> Mesh2d<T> {
    create_rectangular_uniform_quad_mesh_2d(&Vector2::repeat(T::one()), cells_per_dim, cells_per_dim)
}

pub fn create_unit_square_uniform_tri_mesh_2d<T: Real>(cells_per_dim: usize) -> Mesh2d<T> {
    let quads = create_unit_square_uniform_quad_mesh_2d::<T>(cells_per_dim);
    let connectivity = quads
        .block(ElementType::Quad4)
        .map(|block| {
            block
                .elements()
                .flat_map(|q| [q[0], q[1], q[2], q[0], q[2], q[3]])
                .collect()
        })
        .unwrap_or_default();
    Mesh::from_vertices(quads.vertices().to_vec())
        .with_block(ElementType::Tri3, connectivity)
        .expect("Generated connectivity is valid")
}

/// An axis-aligned grid of `Quad4` elements with its lower-left corner at the origin.
pub fn create_rectangular_uniform_quad_mesh_2d<T: Real>(
    extents: &Vector2<T>,
    cells_x: usize,
    cells_y: usize,
) -> Mesh2d<T> {
    if cells_x == 0 || cells_y == 0 {
        return Mesh::from_vertices(Vec::new());
    }
    let (hx, hy) = (extents.x / from_usize(cells_x), extents.y / from_usize(cells_y));
    let index = |i: usize, j: usize| j * (cells_x + 1) + i;

    let mut vertices = Vec::with_capacity((cells_x + 1) * (cells_y + 1));
    for j in 0..=cells_y {
        for i in 0..=cells_x {
            vertices.push(Point2::new(hx * from_usize(i), hy * from_usize(j)));
        }
    }

    let mut connectivity = Vec::with_capacity(4 * cells_x * cells_y);
    for j in 0..cells_y {
        for i in 0..cells_x {
            connectivity.extend([index(i, j), index(i + 1, j), index(i + 1, j + 1), index(i, j + 1)]);
        }
    }

    Mesh::from_vertices(vertices)
        .with_block(ElementType::Quad4, connectivity)
        .expect("Generated connectivity is valid")
}

pub fn create_unit_box_uniform_hex_mesh_3d<T: Real>(cells_per_dim: usize) -> Mesh3d<T> {
    let n = cells_per_dim;
    if n == 0 {
        return Mesh::from_vertices(Vec::new());
    }
    let h = T::one() / from_usize(n);
    let index = |i: usize, j: usize, k: usize| (k * (n + 1) + j) * (n + 1) + i;

    let mut vertices = Vec::with_capacity((n + 1).pow(3));
    for k in 0..=n {
        for j in 0..=n {
            for i in 0..=n {
                let v = Vector3::new(from_usize::<T>(i), from_usize(j), from_usize(k)) * h;
                vertices.push(Point3::from(v));
            }
        }
    }

    let mut connectivity = Vec::with_capacity(8 * n.pow(3));
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                connectivity.extend([
                    index(i, j, k),
                    index(i + 1, j, k),
                    index(i + 1, j + 1, k),
                    index(i, j + 1, k),
                    index(i, j, k + 1),
                    index(i + 1, j, k + 1),
                    index(i + 1, j + 1, k + 1),
                    index(i, j + 1, k + 1),
                ]);
            }
        }
    }

    Mesh::from_vertices(vertices)
        .with_block(ElementType::Hex8, connectivity)
        .expect("Generated connectivity is valid")
}

/// Splits every cube of the uniform hexahedral mesh into six tetrahedra sharing the main
/// diagonal, which gives a conforming mesh.
pub fn create_unit_box_uniform_tet_mesh_3d<T: Real>(cells_per_dim: usize) -> Mesh3d<T> {
    static KUHN: [[usize; 4]; 6] = [[0, 1, 2, 6], [0, 2, 3, 6], [0, 3, 7, 6], [0, 7, 4, 6], [0, 4, 5, 6], [0, 5, 1, 6]];
    let hexes = create_unit_box_uniform_hex_mesh_3d::<T>(cells_per_dim);
    let connectivity = hexes
        .block(ElementType::Hex8)
        .map(|block| {
            block
                .elements()
                .flat_map(|h| KUHN.iter().flat_map(move |tet| tet.map(|i| h[i])))
                .collect()
        })
        .unwrap_or_default();
    Mesh::from_vertices(hexes.vertices().to_vec())
        .with_block(ElementType::Tet4, connectivity)
        .expect("Generated connectivity is valid")
}

/// Adds the boundary of the highest-dimensional elements as new lower-dimensional elements and
/// tags them with `tag`.
///
/// A face is on the boundary if exactly one element references it. Faces already present in the
/// mesh are tagged instead of duplicated.
pub fn add_skin<T, D>(mesh: &mut Mesh<T, D>, tag: &str) -> Result<(), Error>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let Some(dim) = mesh.dimensionality() else {
        return Ok(());
    };
    if dim == 0 {
        return Ok(());
    }

    // Sorted face nodes -> (face type, face nodes in local order, reference count)
    let mut faces: FxHashMap<Vec<usize>, (ElementType, Vec<usize>, usize)> = FxHashMap::default();
    let mut order = Vec::new();
    for block in mesh
        .blocks()
        .filter(|block| block.element_type().dimension() == dim)
    {
        for element in block.elements() {
            for face in block.element_type().faces() {
                let nodes: Vec<usize> = face.nodes.iter().map(|&i| element[i]).collect();
                let mut key = nodes.clone();
                key.sort_unstable();
                let entry = faces.entry(key.clone()).or_insert_with(|| {
                    order.push(key);
                    (face.element_type, nodes, 0)
                });
                entry.2 += 1;
            }
        }
    }

    let mut existing: FxHashMap<Vec<usize>, (ElementType, usize)> = FxHashMap::default();
    for block in mesh
        .blocks()
        .filter(|block| block.element_type().dimension() + 1 == dim)
    {
        for (e, element) in block.elements().enumerate() {
            let mut key = element.to_vec();
            key.sort_unstable();
            existing.insert(key, (block.element_type(), e));
        }
    }

    let mut new_blocks: BTreeMap<ElementType, Vec<usize>> = BTreeMap::new();
    let mut tagged: Vec<(ElementType, usize)> = Vec::new();
    for key in order {
        let (face_type, nodes, count) = &faces[&key];
        if *count != 1 {
            continue;
        }
        if let Some(&(ty, e)) = existing.get(&key) {
            tagged.push((ty, e));
            continue;
        }
        let offset = mesh.block(*face_type).map(|b| b.len()).unwrap_or(0);
        let added = new_blocks.entry(*face_type).or_default();
        tagged.push((*face_type, offset + added.len() / face_type.num_nodes()));
        added.extend(nodes);
    }

    for (face_type, connectivity) in new_blocks {
        mesh.add_block(face_type, connectivity)?;
    }
    for (face_type, e) in tagged {
        mesh.add_element_tag(face_type, tag, &[e])?;
    }
    Ok(())
}
