use crate::tagged_bar_mesh;
use femfields::element::ElementType;
use femfields::filter::{ElementFilter, ElementSelection};
use femfields::mesh::procedural::{
    add_skin, create_rectangular_uniform_quad_mesh_2d, create_unit_box_uniform_hex_mesh_3d,
    create_unit_box_uniform_tet_mesh_3d, create_unit_square_uniform_quad_mesh_2d,
    create_unit_square_uniform_tri_mesh_2d,
};
use femfields::mesh::{Mesh, Mesh2d};
use femfields::Error;
use nalgebra::{Point2, Vector2};
use util::assert_approx_matrix_eq;
use util::matrix_from_rows;

#[test]
fn procedural_mesh_sizes() {
    let bar = tagged_bar_mesh();
    assert_eq!((bar.num_nodes(), bar.num_elements()), (11, 10));

    let quads = create_rectangular_uniform_quad_mesh_2d(&Vector2::new(2.0, 1.0), 3, 2);
    assert_eq!((quads.num_nodes(), quads.num_elements()), (12, 6));
    assert_eq!(quads.block(ElementType::Quad4).unwrap().element(4), &[5, 6, 10, 9]);
    assert!((quads.vertices()[11] - Point2::new(2.0, 1.0)).norm() < 1e-14);

    let tris = create_unit_square_uniform_tri_mesh_2d::<f64>(3);
    assert_eq!((tris.num_nodes(), tris.num_elements()), (16, 18));

    let hexes = create_unit_box_uniform_hex_mesh_3d::<f64>(2);
    assert_eq!((hexes.num_nodes(), hexes.num_elements()), (27, 8));

    let tets = create_unit_box_uniform_tet_mesh_3d::<f64>(2);
    assert_eq!((tets.num_nodes(), tets.num_elements()), (27, 48));
}

#[test]
fn invalid_connectivity_is_rejected() {
    let vertices = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
    let mesh = Mesh2d::from_vertices(vertices.clone());
    assert!(matches!(
        mesh.clone().with_block(ElementType::Tri3, vec![0, 1]),
        Err(Error::InvalidConnectivity { .. })
    ));
    assert!(matches!(
        mesh.with_block(ElementType::Tri3, vec![0, 1, 3]),
        Err(Error::InvalidConnectivity { .. })
    ));

    let mut mesh = Mesh2d::from_vertices(vertices)
        .with_block(ElementType::Tri3, vec![0, 1, 2])
        .unwrap();
    assert!(mesh.add_element_tag(ElementType::Tri3, "t", &[1]).is_err());
    assert!(mesh.add_element_tag(ElementType::Quad4, "t", &[0]).is_err());
    assert!(mesh.add_node_tag("n", &[3]).is_err());
}

#[test]
fn global_element_indices_follow_block_order() {
    let mut mesh = create_unit_square_uniform_quad_mesh_2d::<f64>(2);
    add_skin(&mut mesh, "skin").unwrap();
    assert_eq!(mesh.global_offset(ElementType::Bar2), 0);
    assert_eq!(mesh.global_offset(ElementType::Quad4), 8);
    assert_eq!(mesh.locate_element(3), Some((ElementType::Bar2, 3)));
    assert_eq!(mesh.locate_element(9), Some((ElementType::Quad4, 1)));
    assert_eq!(mesh.locate_element(12), None);
    assert_eq!(mesh.dimensionality(), Some(2));
}

#[test]
fn mutation_draws_a_new_revision() {
    let mut mesh = tagged_bar_mesh();
    let clone = mesh.clone();
    assert_eq!(mesh.revision(), clone.revision());

    let before = mesh.revision();
    mesh.vertices_mut()[0].x = -1.0;
    assert_ne!(mesh.revision(), before);

    let before = mesh.revision();
    mesh.add_node_tag("Middle", &[5]).unwrap();
    assert_ne!(mesh.revision(), before);

    let a = create_unit_square_uniform_quad_mesh_2d::<f64>(1);
    let b = create_unit_square_uniform_quad_mesh_2d::<f64>(1);
    assert_ne!(a.revision(), b.revision());
}

#[test]
fn skin_of_a_square_and_a_box() {
    for n in 1..4 {
        let mut mesh = create_unit_square_uniform_quad_mesh_2d::<f64>(n);
        add_skin(&mut mesh, "boundary").unwrap();
        let skin = ElementFilter::new().with_tag("boundary").select(&mesh);
        assert_eq!(skin.ids(ElementType::Bar2).len(), 4 * n);
        assert_eq!(mesh.block(ElementType::Bar2).unwrap().len(), 4 * n);

        let mut tris = create_unit_square_uniform_tri_mesh_2d::<f64>(n);
        add_skin(&mut tris, "boundary").unwrap();
        assert_eq!(tris.block(ElementType::Bar2).unwrap().len(), 4 * n);
    }

    let mut hexes = create_unit_box_uniform_hex_mesh_3d::<f64>(2);
    add_skin(&mut hexes, "boundary").unwrap();
    assert_eq!(hexes.block(ElementType::Quad4).unwrap().len(), 24);

    let mut tets = create_unit_box_uniform_tet_mesh_3d::<f64>(1);
    add_skin(&mut tets, "boundary").unwrap();
    assert_eq!(tets.block(ElementType::Tri3).unwrap().len(), 12);
}

#[test]
fn skin_reuses_existing_faces() {
    let mut mesh = create_unit_square_uniform_quad_mesh_2d::<f64>(2);
    add_skin(&mut mesh, "first").unwrap();
    add_skin(&mut mesh, "second").unwrap();
    let bars = mesh.block(ElementType::Bar2).unwrap();
    assert_eq!(bars.len(), 8);
    assert_eq!(bars.tags().get("first"), bars.tags().get("second"));
}

#[test]
fn element_node_matrix_holds_coordinates_as_rows() {
    let mesh = create_rectangular_uniform_quad_mesh_2d(&Vector2::new(2.0, 1.0), 1, 1);
    let block = mesh.block(ElementType::Quad4).unwrap();
    let expected = matrix_from_rows(&[&[0.0, 0.0], &[2.0, 0.0], &[2.0, 1.0], &[0.0, 1.0]]);
    assert_approx_matrix_eq!(&mesh.element_node_matrix(block, 0), &expected, abstol = 1e-14);
}

#[test]
fn extracted_mesh_refers_back_to_its_source() {
    let mesh = tagged_bar_mesh();
    let selection = ElementFilter::new()
        .with_tag("next3")
        .with_tag("Last")
        .select(&mesh);
    let extracted = mesh.extract_elements(&selection);

    assert_eq!(extracted.num_elements(), 4);
    assert_eq!(extracted.original_node_ids(), Some(&[3, 4, 5, 6, 8, 9][..]));
    let block = extracted.block(ElementType::Bar2).unwrap();
    assert_eq!(block.original_ids(), Some(&[3, 4, 5, 8][..]));
    assert_eq!(block.element(3), &[4, 5]);
    assert_eq!(block.tags().get("next3"), Some(&[0, 1, 2][..]));
    assert_eq!(block.tags().get("first3"), Some(&[][..]));
    assert_eq!(extracted.node_tags().get("LastPoint"), Some(&[5][..]));
    assert_eq!(extracted.vertices()[4], mesh.vertices()[8]);
    assert_ne!(extracted.revision(), mesh.revision());
}

#[test]
fn extracting_everything_keeps_the_mesh() {
    let mesh = create_unit_square_uniform_tri_mesh_2d::<f64>(2);
    let extracted = mesh.extract_elements(&ElementSelection::full(&mesh));
    assert_eq!(extracted.vertices(), mesh.vertices());
    assert_eq!(
        extracted.block(ElementType::Tri3).unwrap().connectivity(),
        mesh.block(ElementType::Tri3).unwrap().connectivity()
    );
}

#[test]
fn original_ids_must_match_sizes() {
    let mut mesh: Mesh<f64, _> = tagged_bar_mesh();
    assert!(mesh.set_original_node_ids(vec![0; 3]).is_err());
    assert!(mesh.set_original_element_ids(ElementType::Bar2, vec![0; 3]).is_err());
    assert!(mesh.set_original_element_ids(ElementType::Tri3, vec![]).is_err());
    mesh.set_original_node_ids((0..11).collect()).unwrap();
    mesh.set_original_element_ids(ElementType::Bar2, (10..20).collect())
        .unwrap();
    assert_eq!(mesh.block(ElementType::Bar2).unwrap().original_ids().unwrap()[0], 10);
}
