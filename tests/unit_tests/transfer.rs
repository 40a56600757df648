use crate::tagged_bar_mesh;
use femfields::cache::TransferOperatorCache;
use femfields::element::ElementType;
use femfields::field::{FeField, Field, IpField};
use femfields::fill::{fill_fe_field, DescriptionValue};
use femfields::filter::{ElementFilter, ElementSelector, Selector};
use femfields::mesh::procedural::{
    create_rectangular_uniform_quad_mesh_2d, create_unit_square_uniform_quad_mesh_2d,
    create_unit_square_uniform_tri_mesh_2d,
};
use femfields::mesh::{Mesh1d, Mesh2d};
use femfields::nalgebra_sparse::CsrMatrix;
use femfields::numbering::DofNumbering;
use femfields::proptest::unit_square_mesh_strategy;
use femfields::quadrature::{IntegrationRules, RULE_NAMES};
use femfields::space::Space;
use femfields::transfer::{
    elementwise_fe_to_fe_operator, elementwise_ip_to_fe_operator, fields_at_ip, pseudo_inverse,
    transfer_fe_field_to_ip_field, transfer_positions_to_ip_fields, IntegrationPointWrapper, TransferMethod,
    TransferOperator,
};
use femfields::Error;
use matrixcompare::assert_scalar_eq;
use nalgebra::{DMatrix, DVector, Point1, Vector2};
use proptest::prelude::*;
use std::sync::Arc;
use util::{assert_approx_matrix_eq, matrix_from_rows};

fn general_field(mesh: &Arc<Mesh2d<f64>>, space: Space<f64>, data: impl Fn(usize) -> f64) -> FeField<f64, nalgebra::U2> {
    let numbering = DofNumbering::general(mesh, &space, None, false).unwrap();
    let values = DVector::from_fn(numbering.size(), |i, _| data(i));
    FeField::new("u", Arc::clone(mesh), Arc::new(space), Arc::new(numbering), values).unwrap()
}

/// The isoparametric field of `f` at the mesh nodes.
fn nodal_field(mesh: &Arc<Mesh2d<f64>>, f: impl Fn(f64, f64) -> f64) -> FeField<f64, nalgebra::U2> {
    let space = Space::lagrange_geo();
    let numbering = DofNumbering::from_connectivity(mesh, &space).unwrap();
    let values = DVector::from_iterator(mesh.num_nodes(), mesh.vertices().iter().map(|p| f(p.x, p.y)));
    FeField::new("u", Arc::clone(mesh), Arc::new(space), Arc::new(numbering), values).unwrap()
}

fn assert_all_close(field: &IpField<f64, nalgebra::U2>, expected: f64) {
    for (ty, values) in field.data() {
        for &v in values.iter() {
            assert!((v - expected).abs() < 1e-12, "{}: {ty}: {v} != {expected}", field.name());
        }
    }
}

#[test]
fn pseudo_inverse_of_full_rank_and_deficient_matrices() {
    let a = matrix_from_rows(&[&[1.0, 0.0], &[0.0, 2.0], &[0.0, 0.0]]);
    let expected = matrix_from_rows(&[&[1.0, 0.0, 0.0], &[0.0, 0.5, 0.0]]);
    assert_approx_matrix_eq!(&pseudo_inverse(&a).unwrap(), &expected, abstol = 1e-14);

    // Minimum-norm solution of a rank one system
    let b = matrix_from_rows(&[&[1.0, 1.0]]);
    let expected = matrix_from_rows(&[&[0.5], &[0.5]]);
    assert_approx_matrix_eq!(&pseudo_inverse(&b).unwrap(), &expected, abstol = 1e-14);

    assert_eq!(pseudo_inverse(&DMatrix::<f64>::zeros(0, 3)).unwrap().shape(), (3, 0));
}

#[test]
fn constants_transfer_exactly_to_every_rule() {
    let quads = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(2));
    let tris = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(2));
    for mesh in [quads, tris] {
        for space in [Space::lagrange_geo(), Space::lagrange_p0(), Space::lagrange_p1(), Space::lagrange_p2()] {
            let field = general_field(&mesh, space, |_| 2.5);
            for name in RULE_NAMES {
                let ip = transfer_fe_field_to_ip_field(&field, name, None, None).unwrap();
                assert!(!ip.data().is_empty());
                assert_all_close(&ip, 2.5);
            }
        }
    }
}

#[test]
fn linear_fields_have_exact_derivatives() {
    let mesh = Arc::new(create_rectangular_uniform_quad_mesh_2d(&Vector2::new(2.0, 1.5), 3, 2));
    let field = nodal_field(&mesh, |x, y| 2.0 * x + 3.0 * y);
    for name in ["LagrangeIsoParam", "NodalEvalGeo", "ElementCenterEval"] {
        let dx = transfer_fe_field_to_ip_field(&field, name, Some(0), None).unwrap();
        let dy = transfer_fe_field_to_ip_field(&field, name, Some(1), None).unwrap();
        assert_all_close(&dx, 2.0);
        assert_all_close(&dy, 3.0);
    }
}

#[test]
fn quadratic_fields_have_exact_derivatives_on_affine_elements() {
    let mesh = Arc::new(create_unit_square_uniform_tri_mesh_2d::<f64>(3));
    let mut field = general_field(&mesh, Space::lagrange_p2(), |_| 0.0);
    let square = DescriptionValue::function(|p: &nalgebra::Point2<f64>| p.x * p.x + p.x * p.y);
    fill_fe_field(&mut field, &[(Selector::from(ElementSelector::all()), square)]).unwrap();

    let positions = transfer_positions_to_ip_fields(&mesh, "LagrangeP2", None).unwrap();
    let values = transfer_fe_field_to_ip_field(&field, "LagrangeP2", None, None).unwrap();
    let dx = transfer_fe_field_to_ip_field(&field, "LagrangeP2", Some(0), None).unwrap();
    let (x, y) = (positions[0].flattened(), positions[1].flattened());
    let expected_values = x.component_mul(&x) + x.component_mul(&y);
    assert_approx_matrix_eq!(&values.flattened(), &expected_values, abstol = 1e-12);
    assert_approx_matrix_eq!(&dx.flattened(), &(2.0 * &x + &y), abstol = 1e-11);
}

#[test]
fn direct_and_weak_form_operators_agree() {
    let mesh = create_unit_square_uniform_tri_mesh_2d::<f64>(2);
    let space = Space::lagrange_p2();
    let numbering = DofNumbering::general(&mesh, &space, None, false).unwrap();
    let rules = Arc::new(IntegrationRules::named("LagrangeIsoParam").unwrap());
    for derivative in [None, Some(0), Some(1)] {
        let build = |method| {
            TransferOperator::build(&mesh, &space, &numbering, Arc::clone(&rules), derivative, None, method).unwrap()
        };
        let (direct, weak) = (build(TransferMethod::Direct), build(TransferMethod::WeakForm));
        let dense = |op: &TransferOperator<f64>| DMatrix::from(op.block(ElementType::Tri3).unwrap().matrix());
        assert_approx_matrix_eq!(&dense(&direct), &dense(&weak), abstol = 1e-12);
        assert_eq!(direct.num_dofs(), numbering.size());
    }
}

#[test]
fn elements_with_equal_connectivity_keep_their_own_points() {
    let mesh = Mesh1d::from_vertices(vec![Point1::new(0.0), Point1::new(1.0)])
        .with_block(ElementType::Bar2, vec![0, 1, 0, 1])
        .unwrap();
    let space = Space::lagrange_p1();
    let numbering = DofNumbering::general(&mesh, &space, None, false).unwrap();
    let rules = Arc::new(IntegrationRules::named("LagrangeIsoParam").unwrap());
    let num_points = rules.get(ElementType::Bar2).unwrap().len();

    let ip_numbering = DofNumbering::general(&mesh, &Space::integration_points(&rules), None, false).unwrap();
    assert_eq!(ip_numbering.size(), 2 * num_points);

    let build = |method| {
        TransferOperator::build(&mesh, &space, &numbering, Arc::clone(&rules), None, None, method).unwrap()
    };
    let (direct, weak) = (build(TransferMethod::Direct), build(TransferMethod::WeakForm));
    let dense = |op: &TransferOperator<f64>| DMatrix::from(op.block(ElementType::Bar2).unwrap().matrix());
    assert_eq!(dense(&direct).shape(), (2 * num_points, 2));
    assert_approx_matrix_eq!(&dense(&direct), &dense(&weak), abstol = 1e-12);
}

#[test]
fn operator_rows_are_point_major() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(2));
    let field = general_field(&mesh, Space::lagrange_p0(), |i| i as f64);
    let rules = Arc::new(IntegrationRules::named("LagrangeIsoParam").unwrap());
    let op = TransferOperator::for_field(&field, rules, None, None, TransferMethod::Direct).unwrap();

    let block = op.block(ElementType::Quad4).unwrap();
    assert_eq!(block.element_ids(), &[0, 1, 2, 3]);
    let matrix: &CsrMatrix<f64> = block.matrix();
    assert_eq!((matrix.nrows(), matrix.ncols()), (16, 4));
    for k in 0..4 {
        for e in 0..4 {
            let row = matrix.row(k * 4 + e);
            assert_eq!(row.col_indices(), &[e]);
        }
    }

    let ip = op.apply(&field).unwrap();
    for e in 0..4 {
        for k in 0..4 {
            assert_scalar_eq!(ip.value(ElementType::Quad4, e, k).unwrap(), e as f64, comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn filtered_transfer_gives_restricted_fields() {
    let mesh = Arc::new(tagged_bar_mesh());
    let space = Space::lagrange_p1();
    let numbering = DofNumbering::general(&mesh, &space, None, false).unwrap();
    let data = DVector::from_iterator(numbering.size(), mesh.vertices().iter().map(|p| p.x));
    let field = FeField::new("x", Arc::clone(&mesh), Arc::new(space), Arc::new(numbering), data).unwrap();

    let filter = ElementSelector::from(ElementFilter::new().with_tag("Last"));
    let ip = transfer_fe_field_to_ip_field(&field, "ElementCenterEval", None, Some(&filter)).unwrap();
    assert!(ip.is_restricted());
    assert_eq!(ip.element_ids(ElementType::Bar2), vec![8]);
    assert_scalar_eq!(ip.value(ElementType::Bar2, 8, 0).unwrap(), 0.85, comp = abs, tol = 1e-12);
    assert_eq!(ip.value(ElementType::Bar2, 7, 0), None);
}

#[test]
fn invalid_derivative_component_is_rejected() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(1));
    let field = nodal_field(&mesh, |x, _| x);
    let result = transfer_fe_field_to_ip_field(&field, "LagrangeIsoParam", Some(2), None);
    assert!(matches!(result, Err(Error::InvalidDerivative { component: 2, dimension: 2 })));
    let result = transfer_fe_field_to_ip_field(&field, "NoSuchRule", None, None);
    assert!(matches!(result, Err(Error::UnknownRule { .. })));
}

#[test]
fn operator_rejects_foreign_data() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(2));
    let field = nodal_field(&mesh, |x, _| x);
    let rules = Arc::new(IntegrationRules::named("LagrangeP1").unwrap());
    let op = TransferOperator::for_field(&field, rules, None, None, TransferMethod::Auto).unwrap();
    assert!(matches!(
        op.apply_to_data(&DVector::zeros(3)),
        Err(Error::DataSizeMismatch { expected: 9, actual: 3 })
    ));
    let p0 = general_field(&mesh, Space::lagrange_p0(), |_| 1.0);
    assert!(matches!(op.apply(&p0), Err(Error::IncompatibleFields { .. })));
}

#[test]
fn positions_at_element_centers() {
    let mesh = Arc::new(create_rectangular_uniform_quad_mesh_2d(&Vector2::new(2.0, 1.0), 2, 1));
    let positions = transfer_positions_to_ip_fields(&mesh, "ElementCenterEval", None).unwrap();
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[0].name(), "posx");
    assert_eq!(positions[1].name(), "posy");
    let expected_x = DMatrix::from_column_slice(2, 1, &[0.5, 1.5]);
    let expected_y = DMatrix::from_column_slice(2, 1, &[0.5, 0.5]);
    assert_approx_matrix_eq!(positions[0].data_for(ElementType::Quad4).unwrap(), &expected_x, abstol = 1e-14);
    assert_approx_matrix_eq!(positions[1].data_for(ElementType::Quad4).unwrap(), &expected_y, abstol = 1e-14);
}

#[test]
fn elementwise_operators_invert_point_evaluation() {
    let geo = Space::<f64>::lagrange_geo();
    let nodal = IntegrationRules::named("NodalEvalGeo").unwrap();
    let ops = elementwise_ip_to_fe_operator(&nodal, &geo).unwrap();
    for (ty, op) in &ops {
        let n = ty.num_nodes();
        assert_approx_matrix_eq!(op, &DMatrix::<f64>::identity(n, n), abstol = 1e-10);
    }

    // Square systems with unisolvent points
    let cases = [
        ("LagrangeIsoParam", ElementType::Quad4),
        ("LagrangeIsoParam", ElementType::Hex8),
        ("LagrangeP1", ElementType::Tri3),
        ("LagrangeP2", ElementType::Quad9),
    ];
    for (name, ty) in cases {
        let rules = IntegrationRules::named(name).unwrap();
        let ops = elementwise_ip_to_fe_operator(&rules, &geo).unwrap();
        let op = &ops[&ty];
        let element_space = geo.get(ty).unwrap();
        let n = element_space.at_points(rules.get(ty).unwrap().points()).values;
        let nsf = element_space.num_shape_functions();
        assert_eq!(op.shape(), (nsf, rules.get(ty).unwrap().len()));
        assert_approx_matrix_eq!(&(op * &n), &DMatrix::<f64>::identity(nsf, nsf), abstol = 1e-10);
    }
}

#[test]
fn fe_to_fe_operator_restricts_quadratic_to_linear() {
    let geo = Space::<f64>::lagrange_geo();
    let p1 = Space::lagrange_p1();
    let ops = elementwise_fe_to_fe_operator(&geo, &p1).unwrap();

    let linear = |p: &nalgebra::Point3<f64>| 1.0 + 2.0 * p.x - p.y;
    for ty in [ElementType::Tri6, ElementType::Quad9] {
        let op = &ops[&ty];
        let at_nodes = DVector::from_iterator(ty.num_nodes(), ty.reference_nodes::<f64>().iter().map(linear));
        let vertices = DVector::from_iterator(
            ty.num_vertices(),
            ty.reference_nodes::<f64>()[..ty.num_vertices()].iter().map(linear),
        );
        assert_approx_matrix_eq!(&(op * &at_nodes), &vertices, abstol = 1e-12);
    }
    let quad = &ops[&ElementType::Quad4];
    assert_approx_matrix_eq!(quad, &DMatrix::<f64>::identity(4, 4), abstol = 1e-12);
}

#[test]
fn wrapper_caches_values_and_derivatives() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(2));
    let field = nodal_field(&mesh, |x, y| x * y);
    let rules = Arc::new(IntegrationRules::named("LagrangeIsoParam").unwrap());
    let mut wrapper = IntegrationPointWrapper::new(field, rules, None);

    let a = wrapper.ip_field().unwrap();
    assert!(Arc::ptr_eq(&a, &wrapper.ip_field().unwrap()));
    let dx = wrapper.derivative(0).unwrap();
    assert_eq!(dx.name(), "du/dx0");
    assert!(Arc::ptr_eq(&dx, &wrapper.derivative(0).unwrap()));

    wrapper.field_mut().data_mut().iter_mut().for_each(|v| *v = 1.0);
    let b = wrapper.ip_field().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_all_close(&b, 1.0);
    assert_all_close(&wrapper.derivative(1).unwrap(), 0.0);
}

#[test]
fn fields_at_ip_keeps_matching_rules_only() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(2));
    let rules = Arc::new(IntegrationRules::named("LagrangeIsoParam").unwrap());
    let centers = Arc::new(IntegrationRules::named("ElementCenterEval").unwrap());
    let fields: Vec<Field<f64, nalgebra::U2>> = vec![
        nodal_field(&mesh, |x, _| x).into(),
        IpField::allocate("on_rules", Arc::clone(&mesh), Arc::clone(&rules), 1.0).into(),
        IpField::allocate("on_centers", Arc::clone(&mesh), centers, 2.0).into(),
    ];
    let at_ip = fields_at_ip(&fields, &rules, None).unwrap();
    let names: Vec<_> = at_ip.iter().map(|f| f.name()).collect();
    assert_eq!(names, ["u", "on_rules"]);

    let filter = ElementSelector::from(ElementFilter::new().with_global_ids([1, 2]));
    let restricted = fields_at_ip(&fields, &rules, Some(&filter)).unwrap();
    for field in &restricted {
        assert_eq!(field.element_ids(ElementType::Quad4), vec![1, 2]);
        assert_eq!(field.data_for(ElementType::Quad4).unwrap().shape(), (2, 4));
    }
}

#[test]
fn operator_cache_reuses_operators() {
    let mesh = create_unit_square_uniform_quad_mesh_2d::<f64>(2);
    let space = Space::lagrange_p1();
    let numbering = DofNumbering::general(&mesh, &space, None, false).unwrap();
    let rules = Arc::new(IntegrationRules::named("LagrangeIsoParam").unwrap());
    let cache = TransferOperatorCache::new();

    let get = |derivative, method| {
        cache
            .get_or_build(&mesh, &space, &numbering, &rules, derivative, None, method)
            .unwrap()
    };
    let a = get(None, TransferMethod::Direct);
    let b = get(None, TransferMethod::WeakForm);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(cache.len(), 1);

    let c = get(Some(0), TransferMethod::Auto);
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(cache.len(), 2);

    let rebuilt = TransferOperator::build(&mesh, &space, &numbering, Arc::clone(&rules), None, None, TransferMethod::Direct)
        .unwrap();
    assert_eq!(*a, rebuilt);
}

proptest! {
    #[test]
    fn constants_survive_transfer_on_any_mesh(
        mesh in unit_square_mesh_strategy(3),
        value in -10.0..10.0f64,
        rule in proptest::sample::select(RULE_NAMES.to_vec()),
    ) {
        let mesh = Arc::new(mesh);
        let field = general_field(&mesh, Space::lagrange_p1(), |_| value);
        let ip = transfer_fe_field_to_ip_field(&field, rule, None, None).unwrap();
        for values in ip.data().values() {
            for &v in values.iter() {
                prop_assert!((v - value).abs() < 1e-11);
            }
        }
    }
}
