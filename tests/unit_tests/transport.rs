use crate::tagged_bar_mesh;
use femfields::element::ElementType;
use femfields::field::{FeField, IpField};
use femfields::filter::{ElementFilter, ElementSelection};
use femfields::mesh::{Mesh, Mesh1d};
use femfields::numbering::DofNumbering;
use femfields::quadrature::IntegrationRules;
use femfields::space::Space;
use femfields::transport::{FieldsMeshTransportation, Fill};
use femfields::Error;
use nalgebra::{DMatrix, DVector, U1};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

fn field_on(mesh: &Arc<Mesh1d<f64>>, space: Space<f64>, from_connectivity: bool) -> FeField<f64, U1> {
    let numbering = if from_connectivity {
        DofNumbering::from_connectivity(mesh, &space).unwrap()
    } else {
        DofNumbering::general(mesh, &space, None, false).unwrap()
    };
    let data = DVector::from_fn(numbering.size(), |i, _| 10.0 + i as f64);
    FeField::new("u", Arc::clone(mesh), Arc::new(space), Arc::new(numbering), data).unwrap()
}

/// The `next3` and `Last` elements of the tagged bar: elements 3, 4, 5 and 8, nodes 3-6, 8 and 9.
fn extracted(mesh: &Mesh1d<f64>) -> Arc<Mesh1d<f64>> {
    let selection = ElementFilter::new()
        .with_tag("next3")
        .with_tag("Last")
        .select(mesh);
    Arc::new(mesh.extract_elements(&selection))
}

fn root_error(report: &eyre::Report) -> Option<&Error> {
    report.root_cause().downcast_ref::<Error>()
}

#[test]
fn nodal_fields_go_back_and_forth() {
    let mesh = Arc::new(tagged_bar_mesh());
    let field = field_on(&mesh, Space::lagrange_geo(), true);
    let part = extracted(&mesh);
    let transport = FieldsMeshTransportation::new();

    let forward = transport.fe_field_to_new_mesh(&field, &part).unwrap();
    assert!(matches!(forward, Cow::Owned(_)));
    assert!(forward.numbering().is_from_connectivity());
    assert_eq!(forward.data().as_slice(), &[13.0, 14.0, 15.0, 16.0, 18.0, 19.0]);

    let back = transport
        .fe_field_to_old_mesh(&mesh, &forward, Fill::Undefined)
        .unwrap();
    for node in 0..mesh.num_nodes() {
        let value = back.data()[node];
        match node {
            3..=6 | 8 | 9 => assert_eq!(value, field.data()[node]),
            _ => assert!(value.is_nan(), "node {node}"),
        }
    }
}

#[test]
fn general_fields_go_back_and_forth() {
    let mesh = Arc::new(tagged_bar_mesh());
    let part = extracted(&mesh);
    let transport = FieldsMeshTransportation::new();

    let p0 = field_on(&mesh, Space::lagrange_p0(), false);
    let forward = transport.fe_field_to_new_mesh(&p0, &part).unwrap();
    assert_eq!(forward.data().as_slice(), &[13.0, 14.0, 15.0, 18.0]);
    let back = transport
        .fe_field_to_old_mesh(&mesh, &forward, Fill::Value(-1.0))
        .unwrap();
    let expected = [-1.0, -1.0, -1.0, 13.0, 14.0, 15.0, -1.0, -1.0, 18.0, -1.0];
    assert_eq!(back.data().as_slice(), &expected);

    // Point DOFs keep their value whatever their number on either mesh
    let p2 = field_on(&mesh, Space::lagrange_p2(), false);
    let forward = transport.fe_field_to_new_mesh(&p2, &part).unwrap();
    let back = transport
        .fe_field_to_old_mesh(&mesh, &forward, Fill::Value(0.0))
        .unwrap();
    for &node in &[3, 4, 5, 6, 8, 9] {
        let dof = p2.numbering().dof_of_point(node).unwrap();
        assert_eq!(back.data()[dof], p2.data()[dof]);
    }
    let dof = p2.numbering().dof_of_point(7).unwrap();
    assert_eq!(back.data()[dof], 0.0);
}

#[test]
fn target_numberings_are_cached() {
    let mesh = Arc::new(tagged_bar_mesh());
    let part = extracted(&mesh);
    let transport = FieldsMeshTransportation::new();
    let u = field_on(&mesh, Space::lagrange_p1(), false);
    let v = u.with_data("v", u.data() * 2.0).unwrap();

    let a = transport.fe_field_to_new_mesh(&u, &part).unwrap();
    let b = transport.fe_field_to_new_mesh(&v, &part).unwrap();
    assert!(Arc::ptr_eq(a.numbering(), b.numbering()));
    assert_eq!(b.data(), &(a.data() * 2.0));

    transport.reset_cache();
    let c = transport.fe_field_to_new_mesh(&u, &part).unwrap();
    assert!(!Arc::ptr_eq(a.numbering(), c.numbering()));
    assert_eq!(a.numbering(), c.numbering());
}

#[test]
fn same_mesh_is_a_no_op() {
    let mesh = Arc::new(tagged_bar_mesh());
    let field = field_on(&mesh, Space::lagrange_p1(), false);
    let transport = FieldsMeshTransportation::new();
    assert!(matches!(transport.fe_field_to_new_mesh(&field, &mesh).unwrap(), Cow::Borrowed(_)));
    assert!(matches!(
        transport
            .fe_field_to_old_mesh(&mesh, &field, Fill::Undefined)
            .unwrap(),
        Cow::Borrowed(_)
    ));
}

#[test]
fn unrelated_meshes_are_rejected() {
    let mesh = Arc::new(tagged_bar_mesh());
    let other = Arc::new(tagged_bar_mesh());
    let transport = FieldsMeshTransportation::new();

    let nodal = field_on(&mesh, Space::lagrange_geo(), true);
    let report = transport.fe_field_to_new_mesh(&nodal, &other).unwrap_err();
    assert!(matches!(root_error(&report), Some(Error::MissingOriginalIds { .. })));

    let p1 = field_on(&mesh, Space::lagrange_p1(), false);
    let report = transport.fe_field_to_new_mesh(&p1, &other).unwrap_err();
    assert!(matches!(root_error(&report), Some(Error::MissingOriginalIds { .. })));

    // Original ids pointing outside the source mesh
    let mut shifted: Mesh<f64, U1> = tagged_bar_mesh();
    shifted.set_original_node_ids((100..111).collect()).unwrap();
    let shifted = Arc::new(shifted);
    let report = transport.fe_field_to_new_mesh(&nodal, &shifted).unwrap_err();
    assert!(matches!(root_error(&report), Some(Error::IncompatibleFields { .. })));
}

#[test]
fn integration_point_fields_go_back_and_forth() {
    let mesh = Arc::new(tagged_bar_mesh());
    let part = extracted(&mesh);
    let rules = Arc::new(IntegrationRules::named("LagrangeIsoParam").unwrap());
    let values = DMatrix::from_fn(10, 2, |e, k| (10 * e + k) as f64);
    let mut data = BTreeMap::new();
    data.insert(ElementType::Bar2, values.clone());
    let field = IpField::from_data("w", Arc::clone(&mesh), rules, data, None).unwrap();
    let transport = FieldsMeshTransportation::new();

    let forward = transport.ip_field_to_new_mesh(&field, &part).unwrap();
    let expected = values.select_rows([3, 4, 5, 8].iter());
    assert_eq!(forward.data_for(ElementType::Bar2).unwrap(), &expected);

    let back = transport.ip_field_to_old_mesh(&mesh, &forward).unwrap();
    let back_values = back.data_for(ElementType::Bar2).unwrap();
    for e in 0..10 {
        if [3, 4, 5, 8].contains(&e) {
            assert_eq!(back_values.row(e), values.row(e));
        } else {
            assert!(back_values.row(e).iter().all(|&v| v == 0.0));
        }
    }

    assert!(matches!(transport.ip_field_to_new_mesh(&field, &mesh).unwrap(), Cow::Borrowed(_)));
}

#[test]
fn restricted_integration_point_fields_leave_missing_rows_at_zero() {
    let mesh = Arc::new(tagged_bar_mesh());
    let part = extracted(&mesh);
    let rules = Arc::new(IntegrationRules::named("ElementCenterEval").unwrap());
    let selection = ElementSelection::from_ids(ElementType::Bar2, [4, 8]);
    let field = IpField::allocate_restricted("w", Arc::clone(&mesh), rules, &selection, 3.0);

    let forward = FieldsMeshTransportation::new()
        .ip_field_to_new_mesh(&field, &part)
        .unwrap();
    assert!(!forward.is_restricted());
    let values = forward.data_for(ElementType::Bar2).unwrap();
    assert_eq!(values.as_slice(), &[0.0, 3.0, 0.0, 3.0]);
}
