//! Conversions between fields and plain nodal or element arrays.
use crate::error::Error;
use crate::field::{FeField, Field};
use crate::mesh::Mesh;
use crate::numbering::DofNumbering;
use crate::space::Space;
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{DMatrix, DVector, DefaultAllocator, DimName};
use std::collections::BTreeMap;
use std::sync::Arc;

fn split_columns<T: Real>(name: &str, values: &DMatrix<T>) -> Vec<(String, DVector<T>)> {
    if values.ncols() == 1 {
        vec![(name.to_string(), values.column(0).into_owned())]
    } else {
        values
            .column_iter()
            .enumerate()
            .map(|(i, column)| (format!("{name}_{i}"), column.into_owned()))
            .collect()
    }
}

/// Isoparametric fields from nodal arrays (`num_nodes x components`).
///
/// Arrays with several columns give one field per column, named `name_0`, `name_1`, ...
pub fn node_fields_to_fe_fields<T, D>(
    mesh: &Arc<Mesh<T, D>>,
    fields: &BTreeMap<String, DMatrix<T>>,
) -> Result<Vec<FeField<T, D>>, Error>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let space = Arc::new(Space::lagrange_geo());
    let numbering = Arc::new(DofNumbering::from_connectivity(mesh, &space)?);
    let mut result = Vec::new();
    for (name, values) in fields {
        if values.nrows() != mesh.num_nodes() {
            return Err(Error::DataSizeMismatch {
                expected: mesh.num_nodes(),
                actual: values.nrows(),
            });
        }
        for (name, column) in split_columns(name, values) {
            result.push(FeField::new(
                name,
                Arc::clone(mesh),
                Arc::clone(&space),
                Arc::clone(&numbering),
                column,
            )?);
        }
    }
    Ok(result)
}

/// Element-wise constant fields from element arrays (`num_elements x components`), rows by
/// global element index.
pub fn element_fields_to_fe_fields<T, D>(
    mesh: &Arc<Mesh<T, D>>,
    fields: &BTreeMap<String, DMatrix<T>>,
) -> Result<Vec<FeField<T, D>>, Error>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let space = Arc::new(Space::lagrange_p0());
    let numbering = Arc::new(DofNumbering::general(mesh, &space, None, false)?);
    let mut result = Vec::new();
    for (name, values) in fields {
        if values.nrows() != mesh.num_elements() {
            return Err(Error::DataSizeMismatch {
                expected: mesh.num_elements(),
                actual: values.nrows(),
            });
        }
        for (name, column) in split_columns(name, values) {
            let mut data = DVector::zeros(numbering.size());
            for (ty, table) in numbering.tables() {
                let offset = mesh.global_offset(ty);
                for e in 0..table.num_elements() {
                    if let Some(dof) = table.get(e, 0) {
                        data[dof] = column[offset + e];
                    }
                }
            }
            result.push(FeField::new(
                name,
                Arc::clone(mesh),
                Arc::clone(&space),
                Arc::clone(&numbering),
                data,
            )?);
        }
    }
    Ok(result)
}

/// Concatenates the DOF values of the fields.
pub fn fe_fields_data_to_vector<T, D>(fields: &[FeField<T, D>]) -> DVector<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let values: Vec<T> = fields
        .iter()
        .flat_map(|field| field.data().iter().copied())
        .collect();
    DVector::from_vec(values)
}

/// Splits a vector into the DOF values of the fields, in order. The inverse of
/// [`fe_fields_data_to_vector`].
pub fn vector_to_fe_fields_data<T, D>(vector: &DVector<T>, fields: &mut [FeField<T, D>]) -> Result<(), Error>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let expected: usize = fields
        .iter()
        .map(|field| field.numbering().size())
        .sum();
    if vector.len() != expected {
        return Err(Error::DataSizeMismatch {
            expected,
            actual: vector.len(),
        });
    }
    let mut start = 0;
    for field in fields {
        let n = field.numbering().size();
        field.set_data(vector.rows(start, n).into_owned())?;
        start += n;
    }
    Ok(())
}

/// Nodal values of the fields, one column per field.
pub fn point_representation<T, D>(fields: &[FeField<T, D>], fill: T) -> DMatrix<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let columns: Vec<DVector<T>> = fields
        .iter()
        .map(|field| field.point_representation(fill))
        .collect();
    let num_nodes = fields
        .first()
        .map(|field| field.mesh().num_nodes())
        .unwrap_or(0);
    DMatrix::from_fn(num_nodes, columns.len(), |i, j| columns[j][i])
}

/// Element values of the fields, one column per field, rows by global element index.
pub fn cell_representation<T, D>(fields: &[Field<T, D>], fill: T) -> DMatrix<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let columns: Vec<DVector<T>> = fields
        .iter()
        .map(|field| field.cell_representation(fill))
        .collect();
    let num_elements = fields
        .first()
        .map(|field| field.mesh().num_elements())
        .unwrap_or(0);
    DMatrix::from_fn(num_elements, columns.len(), |i, j| columns[j][i])
}
