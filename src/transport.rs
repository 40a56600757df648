//! Moving fields between a mesh and a transformation of it.
//!
//! A transformed mesh (for instance the result of [`Mesh::extract_elements`]) carries original
//! node and element ids that refer back to its source. Fields go forward by gathering through
//! these ids and backward by scattering.
use crate::cache::NumberingCache;
use crate::element::ElementType;
use crate::error::Error;
use crate::field::{FeField, IpField};
use crate::mesh::Mesh;
use crate::numbering::DofNumbering;
use crate::space::Space;
use crate::Real;
use eyre::WrapErr;
use nalgebra::allocator::Allocator;
use nalgebra::{DMatrix, DVector, DefaultAllocator, DimName};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Value of the DOFs of the source mesh that the transformed mesh does not reach.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Fill<T> {
    Value(T),
    /// NaN, giving a partial field.
    Undefined,
}

impl<T: Real> Fill<T> {
    fn value(self) -> T {
        match self {
            Self::Value(value) => value,
            Self::Undefined => nalgebra::convert(f64::NAN),
        }
    }
}

fn original_node_ids<T, D>(mesh: &Mesh<T, D>) -> Result<&[usize], Error>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    mesh.original_node_ids()
        .ok_or_else(|| Error::MissingOriginalIds {
            what: "nodes".to_string(),
        })
}

fn original_element_ids<T, D>(mesh: &Mesh<T, D>, element_type: ElementType) -> Result<&[usize], Error>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    mesh.block(element_type)
        .and_then(|block| block.original_ids())
        .ok_or_else(|| Error::MissingOriginalIds {
            what: format!("{element_type} elements"),
        })
}

fn out_of_range(id: usize, what: &str) -> Error {
    Error::IncompatibleFields {
        reason: format!("original {what} id {id} is outside the source mesh"),
    }
}

/// Transports fields between meshes, reusing numberings of the target meshes.
#[derive(Debug, Default)]
pub struct FieldsMeshTransportation {
    numberings: NumberingCache,
}

impl FieldsMeshTransportation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_cache(&self) {
        self.numberings.clear();
    }

    fn numbering_like<T, D>(
        &self,
        source: &DofNumbering,
        mesh: &Mesh<T, D>,
        space: &Space<T>,
    ) -> Result<Arc<DofNumbering>, Error>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        if source.is_from_connectivity() {
            self.numberings.from_connectivity(mesh, space)
        } else {
            self.numberings.general(mesh, space, None, false)
        }
    }

    /// The field on `new_mesh`, a transformation of the field's mesh.
    ///
    /// Returns the input unchanged if `new_mesh` is the field's mesh.
    pub fn fe_field_to_new_mesh<'a, T, D>(
        &self,
        field: &'a FeField<T, D>,
        new_mesh: &Arc<Mesh<T, D>>,
    ) -> eyre::Result<Cow<'a, FeField<T, D>>>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        if field.mesh().revision() == new_mesh.revision() {
            return Ok(Cow::Borrowed(field));
        }
        let context = || format!("failed to transport `{}` to the new mesh", field.name());
        let space = Arc::clone(field.space());
        let numbering = self
            .numbering_like(field.numbering(), new_mesh, &space)
            .wrap_err_with(context)?;
        let source = field.data();
        let mut data = DVector::zeros(numbering.size());

        if field.numbering().is_from_connectivity() {
            let ids = original_node_ids(new_mesh).wrap_err_with(context)?;
            for (i, &id) in ids.iter().enumerate() {
                data[i] = *source
                    .get(id)
                    .ok_or_else(|| out_of_range(id, "node"))
                    .wrap_err_with(context)?;
            }
        } else {
            for (ty, table) in numbering.tables() {
                let Some(source_table) = field.numbering().get(ty) else {
                    continue;
                };
                let ids = original_element_ids(new_mesh, ty).wrap_err_with(context)?;
                for (e, &id) in ids.iter().enumerate() {
                    if id >= source_table.num_elements() {
                        return Err(out_of_range(id, "element")).wrap_err_with(context);
                    }
                    for (slot, dof) in table.row(e).iter().enumerate() {
                        if let (Some(dof), Some(source_dof)) = (*dof, source_table.get(id, slot)) {
                            data[dof] = source[source_dof];
                        }
                    }
                }
            }
        }
        Ok(Cow::Owned(FeField::new(
            field.name(),
            Arc::clone(new_mesh),
            space,
            numbering,
            data,
        )?))
    }

    /// The field on `old_mesh`, of which the field's mesh is a transformation.
    ///
    /// DOFs of `old_mesh` that the field does not reach get the fill value. Returns the input
    /// unchanged if `old_mesh` is the field's mesh.
    pub fn fe_field_to_old_mesh<'a, T, D>(
        &self,
        old_mesh: &Arc<Mesh<T, D>>,
        field: &'a FeField<T, D>,
        fill: Fill<T>,
    ) -> eyre::Result<Cow<'a, FeField<T, D>>>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        if field.mesh().revision() == old_mesh.revision() {
            return Ok(Cow::Borrowed(field));
        }
        let context = || format!("failed to transport `{}` to the old mesh", field.name());
        let space = Arc::clone(field.space());
        let numbering = self
            .numbering_like(field.numbering(), old_mesh, &space)
            .wrap_err_with(context)?;
        let mut result = FeField::allocate(
            field.name(),
            Arc::clone(old_mesh),
            space,
            Arc::clone(&numbering),
            fill.value(),
        );
        let source = field.data();

        if field.numbering().is_from_connectivity() {
            let ids = original_node_ids(field.mesh()).wrap_err_with(context)?;
            let data = result.data_mut();
            for (i, &id) in ids.iter().enumerate() {
                let target = data
                    .get_mut(id)
                    .ok_or_else(|| out_of_range(id, "node"))
                    .wrap_err_with(context)?;
                *target = source[i];
            }
        } else {
            for (ty, table) in numbering.tables() {
                let Some(source_table) = field.numbering().get(ty) else {
                    continue;
                };
                let ids = original_element_ids(field.mesh(), ty).wrap_err_with(context)?;
                let data = result.data_mut();
                for (e, &id) in ids.iter().enumerate() {
                    if id >= table.num_elements() {
                        return Err(out_of_range(id, "element")).wrap_err_with(context);
                    }
                    for (slot, dof) in table.row(id).iter().enumerate() {
                        if let (Some(dof), Some(source_dof)) = (*dof, source_table.get(e, slot)) {
                            data[dof] = source[source_dof];
                        }
                    }
                }
            }
        }
        Ok(Cow::Owned(result))
    }

    /// The integration-point field on `new_mesh`, a transformation of the field's mesh.
    ///
    /// Elements of a restricted field without a row get zeros.
    pub fn ip_field_to_new_mesh<'a, T, D>(
        &self,
        field: &'a IpField<T, D>,
        new_mesh: &Arc<Mesh<T, D>>,
    ) -> eyre::Result<Cow<'a, IpField<T, D>>>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        if field.mesh().revision() == new_mesh.revision() {
            return Ok(Cow::Borrowed(field));
        }
        let context = || format!("failed to transport `{}` to the new mesh", field.name());
        let mut data = BTreeMap::new();
        for block in new_mesh.blocks() {
            let ty = block.element_type();
            let (Some(source), Some(rule)) = (field.data_for(ty), field.rule(ty)) else {
                continue;
            };
            let ids = original_element_ids(new_mesh, ty).wrap_err_with(context)?;
            let mut values = DMatrix::zeros(block.len(), rule.len());
            for (e, &id) in ids.iter().enumerate() {
                if let Some(row) = field.row_of(ty, id) {
                    values.row_mut(e).copy_from(&source.row(row));
                }
            }
            data.insert(ty, values);
        }
        Ok(Cow::Owned(IpField::from_data(
            field.name(),
            Arc::clone(new_mesh),
            Arc::clone(field.rules()),
            data,
            None,
        )?))
    }

    /// The integration-point field on `old_mesh`, of which the field's mesh is a
    /// transformation. Elements of `old_mesh` that the field does not reach get zeros.
    pub fn ip_field_to_old_mesh<'a, T, D>(
        &self,
        old_mesh: &Arc<Mesh<T, D>>,
        field: &'a IpField<T, D>,
    ) -> eyre::Result<Cow<'a, IpField<T, D>>>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        if field.mesh().revision() == old_mesh.revision() {
            return Ok(Cow::Borrowed(field));
        }
        let context = || format!("failed to transport `{}` to the old mesh", field.name());
        let mut data = BTreeMap::new();
        for (&ty, source) in field.data() {
            let (Some(block), Some(rule)) = (old_mesh.block(ty), field.rule(ty)) else {
                continue;
            };
            let ids = original_element_ids(field.mesh(), ty).wrap_err_with(context)?;
            let mut values = DMatrix::zeros(block.len(), rule.len());
            for (row, e) in field.element_ids(ty).into_iter().enumerate() {
                let id = ids[e];
                if id >= block.len() {
                    return Err(out_of_range(id, "element")).wrap_err_with(context);
                }
                values.row_mut(id).copy_from(&source.row(row));
            }
            data.insert(ty, values);
        }
        Ok(Cow::Owned(IpField::from_data(
            field.name(),
            Arc::clone(old_mesh),
            Arc::clone(field.rules()),
            data,
            None,
        )?))
    }
}
