use crate::tagged_bar_mesh;
use femfields::element::ElementType;
use femfields::field::{FeField, IpField};
use femfields::fill::{create_field_from_description, fill_fe_field, fill_ip_field, DescriptionValue, FieldDescription, FieldKind};
use femfields::filter::{ElementFilter, ElementSelector, NodeFilter};
use femfields::mesh::procedural::create_unit_square_uniform_quad_mesh_2d;
use femfields::mesh::Mesh1d;
use femfields::numbering::DofNumbering;
use femfields::quadrature::IntegrationRules;
use femfields::space::Space;
use femfields::transfer::transfer_positions_to_ip_fields;
use femfields::Error;
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point1, Point2, U1, U2};
use std::sync::Arc;

fn bar_description() -> FieldDescription<f64, U1> {
    vec![
        (ElementSelector::all().into(), DescriptionValue::Constant(5.0)),
        (ElementFilter::new().with_tag("first3").into(), DescriptionValue::Constant(3.0)),
        (ElementFilter::new().with_tag("Last").into(), DescriptionValue::Constant(-1.0)),
        (ElementFilter::new().with_tag("next3").into(), DescriptionValue::function(|p: &Point1<f64>| p.x)),
    ]
}

fn root_error(report: &eyre::Report) -> Option<&Error> {
    report.root_cause().downcast_ref::<Error>()
}

#[test]
fn integration_point_field_from_description() {
    let mesh: Arc<Mesh1d<f64>> = Arc::new(tagged_bar_mesh());
    let field = create_field_from_description("f", Arc::clone(&mesh), &bar_description(), FieldKind::IntegrationPoint)
        .unwrap()
        .into_ip()
        .unwrap();
    assert_eq!(field.name(), "f");
    assert_eq!(field.rules().key(), "LagrangeIsoParam");

    let positions = transfer_positions_to_ip_fields(&mesh, "LagrangeIsoParam", None).unwrap();
    let values = field.data_for(ElementType::Bar2).unwrap();
    assert_eq!(values.shape(), (10, 2));
    for e in 0..10 {
        for k in 0..2 {
            let expected = match e {
                0..=2 => 3.0,
                3..=5 => positions[0].value(ElementType::Bar2, e, k).unwrap(),
                8 => -1.0,
                _ => 5.0,
            };
            assert_scalar_eq!(values[(e, k)], expected, comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn isoparametric_field_from_description() {
    let mesh = Arc::new(tagged_bar_mesh());
    let field = create_field_from_description("f", Arc::clone(&mesh), &bar_description(), FieldKind::Isoparametric)
        .unwrap()
        .into_fe()
        .unwrap();
    assert!(field.numbering().is_from_connectivity());

    // Later entries overwrite the nodes they share with earlier ones
    let x = |node: usize| mesh.vertices()[node].x;
    let expected = [3.0, 3.0, 3.0, x(3), x(4), x(5), x(6), 5.0, -1.0, -1.0, 5.0];
    for (node, &value) in expected.iter().enumerate() {
        assert_scalar_eq!(field.data()[node], value, comp = abs, tol = 1e-14);
    }
}

#[test]
fn element_constant_field_from_description() {
    let mesh = Arc::new(tagged_bar_mesh());
    let field = create_field_from_description("f", Arc::clone(&mesh), &bar_description(), FieldKind::ElementConstant)
        .unwrap()
        .into_fe()
        .unwrap();
    assert_eq!(field.data().len(), 10);
    let cells = field.cell_representation(f64::NAN);
    assert_scalar_eq!(cells[1], 3.0);
    assert_scalar_eq!(cells[4], 0.45, comp = abs, tol = 1e-14);
    assert_scalar_eq!(cells[7], 5.0);
    assert_scalar_eq!(cells[8], -1.0);
}

#[test]
fn node_entries_set_point_dofs() {
    let mesh = Arc::new(tagged_bar_mesh());
    let space = Arc::new(Space::lagrange_p1());
    let numbering = Arc::new(DofNumbering::general(&mesh, &space, None, false).unwrap());
    let mut field = FeField::allocate("f", Arc::clone(&mesh), space, Arc::clone(&numbering), 0.0);
    let description: FieldDescription<f64, U1> = vec![
        (ElementFilter::new().with_tag("first3").into(), DescriptionValue::Constant(1.0)),
        (NodeFilter::new().with_tag("FirstPoint").into(), DescriptionValue::Constant(7.0)),
        (NodeFilter::new().with_tag("LastPoint").into(), DescriptionValue::function(|p: &Point1<f64>| 10.0 * p.x)),
    ];
    fill_fe_field(&mut field, &description).unwrap();

    let at = |node| field.data()[numbering.dof_of_point(node).unwrap()];
    assert_eq!(at(0), 7.0);
    assert_eq!(at(1), 1.0);
    assert_eq!(at(3), 1.0);
    assert_eq!(at(4), 0.0);
    assert_scalar_eq!(at(9), 9.0, comp = abs, tol = 1e-12);
}

#[test]
fn node_entries_need_point_dofs() {
    let mesh = Arc::new(tagged_bar_mesh());
    let description: FieldDescription<f64, U1> =
        vec![(NodeFilter::new().with_tag("FirstPoint").into(), DescriptionValue::Constant(1.0))];

    let result = create_field_from_description("f", Arc::clone(&mesh), &description, FieldKind::ElementConstant);
    let report = result.unwrap_err();
    assert!(matches!(root_error(&report), Some(Error::MissingPointDof { node: 0 })));

    let rules = Arc::new(IntegrationRules::named("LagrangeIsoParam").unwrap());
    let mut ip = IpField::allocate("g", mesh, rules, 0.0);
    let report = fill_ip_field(&mut ip, &description).unwrap_err();
    assert!(matches!(root_error(&report), Some(Error::UnsupportedSelector { .. })));
    assert!(report.to_string().contains("`g`"));
}

#[test]
fn later_entries_take_precedence() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d::<f64>(2));
    let left = ElementFilter::new().with_global_ids([0, 2]);
    let description: FieldDescription<f64, U2> = vec![
        (ElementSelector::all().into(), DescriptionValue::Constant(1.0)),
        (left.clone().into(), DescriptionValue::function(|p: &Point2<f64>| p.y)),
        (ElementSelector::from(left).complement().into(), DescriptionValue::Constant(-2.0)),
    ];
    let field = create_field_from_description("f", mesh, &description, FieldKind::ElementConstant)
        .unwrap()
        .into_fe()
        .unwrap();
    let expected = [0.25, -2.0, 0.75, -2.0];
    for (e, &value) in expected.iter().enumerate() {
        assert_scalar_eq!(field.data()[e], value, comp = abs, tol = 1e-14);
    }
}

#[test]
fn restricted_integration_point_fields_fill_their_rows_only() {
    let mesh = Arc::new(tagged_bar_mesh());
    let rules = Arc::new(IntegrationRules::named("ElementCenterEval").unwrap());
    let field = IpField::allocate("g", Arc::clone(&mesh), rules, 0.0);
    let mut restricted = field.restricted(&ElementFilter::new().with_tag("next3").into());
    let description: FieldDescription<f64, U1> = vec![(ElementSelector::all().into(), DescriptionValue::Constant(4.0))];
    fill_ip_field(&mut restricted, &description).unwrap();
    assert_eq!(restricted.value(ElementType::Bar2, 4, 0), Some(4.0));
    assert_eq!(restricted.value(ElementType::Bar2, 6, 0), None);
    assert_eq!(restricted.data_for(ElementType::Bar2).unwrap().nrows(), 3);
}
