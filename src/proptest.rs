//! Proptest strategies for meshes.
use crate::element::ElementType;
use crate::mesh::procedural::{create_rectangular_uniform_quad_mesh_2d, create_unit_square_uniform_tri_mesh_2d};
use crate::mesh::{Mesh, Mesh2d};
use crate::Real;
use ::proptest::prelude::*;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Vector2};
use std::cmp::max;

// Pairs (cells_x, cells_y), both at least one, with cells_x * cells_y <= max_cells
fn rectangular_cell_distribution_strategy(max_cells: usize) -> impl Strategy<Value = (usize, usize)> {
    (1..=max(1, max_cells)).prop_flat_map(move |cells_x| (Just(cells_x), 1..=max(1, max_cells / cells_x)))
}

/// Quad meshes of rectangles with extents in `[0.5, 4]`.
pub fn rectangular_uniform_mesh_strategy(max_cells: usize) -> impl Strategy<Value = Mesh2d<f64>> {
    let extent = 0.5..4.0;
    (rectangular_cell_distribution_strategy(max_cells), [extent.clone(), extent]).prop_map(
        |((cells_x, cells_y), [width, height])| {
            create_rectangular_uniform_quad_mesh_2d(&Vector2::new(width, height), cells_x, cells_y)
        },
    )
}

/// Unit square meshes of `Quad4` or `Tri3` elements.
pub fn unit_square_mesh_strategy(max_cells_per_dim: usize) -> impl Strategy<Value = Mesh2d<f64>> {
    (1..=max(1, max_cells_per_dim), any::<bool>()).prop_map(|(cells, triangles)| {
        if triangles {
            create_unit_square_uniform_tri_mesh_2d(cells)
        } else {
            create_rectangular_uniform_quad_mesh_2d(&Vector2::repeat(1.0), cells, cells)
        }
    })
}

/// The mesh with the elements of every block reordered by `permutations[type]`, where element
/// `i` of the result is element `permutation[i]` of the input. Tags are dropped.
pub fn permute_elements<T, D>(mesh: &Mesh<T, D>, permutations: &[(ElementType, Vec<usize>)]) -> Mesh<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let mut permuted = Mesh::from_vertices(mesh.vertices().to_vec());
    for block in mesh.blocks() {
        let ty = block.element_type();
        let order: Vec<usize> = permutations
            .iter()
            .find(|(other, _)| *other == ty)
            .map(|(_, permutation)| permutation.clone())
            .unwrap_or_else(|| (0..block.len()).collect());
        let connectivity = order
            .iter()
            .flat_map(|&e| block.element(e).iter().copied())
            .collect();
        permuted
            .add_block(ty, connectivity)
            .expect("Permuted connectivity is valid");
    }
    permuted
}

/// A mesh paired with a copy whose elements come in a random order.
pub fn mesh_and_permutation_strategy<S>(mesh: S) -> impl Strategy<Value = (Mesh2d<f64>, Mesh2d<f64>)>
where
    S: Strategy<Value = Mesh2d<f64>>,
{
    mesh.prop_flat_map(|mesh| {
        let permutations: Vec<_> = mesh
            .blocks()
            .map(|block| {
                let ty = block.element_type();
                Just((0..block.len()).collect::<Vec<_>>())
                    .prop_shuffle()
                    .prop_map(move |permutation| (ty, permutation))
            })
            .collect();
        (Just(mesh), permutations)
    })
    .prop_map(|(mesh, permutations)| {
        let permuted = permute_elements(&mesh, &permutations);
        (mesh, permuted)
    })
}
