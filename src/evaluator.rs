//! Evaluation of expressions over a set of fields in a chosen representation.
use crate::error::Error;
use crate::expression::{EvaluationPlan, Expr, Operand};
use crate::field::{FeField, Field, IpField};
use crate::filter::ElementSelector;
use crate::quadrature::IntegrationRules;
use crate::transfer::fields_at_ip;
use crate::Real;
use eyre::WrapErr;
use log::debug;
use nalgebra::allocator::Allocator;
use nalgebra::{DVector, DefaultAllocator, DimName, Scalar};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Where the fields are evaluated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Representation {
    /// The DOF values of the finite element fields.
    FeField,
    /// Values at the points of the `LagrangeIsoParam` rules.
    IpField,
    /// Values at the element centroids.
    Centroids,
    /// Values at the mesh nodes.
    Nodes,
}

impl Display for Representation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FeField => "FeField",
            Self::IpField => "IpField",
            Self::Centroids => "Centroids",
            Self::Nodes => "Nodes",
        };
        f.write_str(name)
    }
}

/// The cached representations recomputed by [`FieldsEvaluator::update`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Refresh {
    All,
    IpFields,
    Centroids,
}

/// The result of an evaluation, in the layout of its representation.
#[derive(Debug, Clone)]
pub enum Evaluated<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    Fe(FeField<T, D>),
    Ip(IpField<T, D>),
    Nodal(DVector<T>),
}

impl<T, D> Evaluated<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// The values, flattened for integration-point fields.
    pub fn values(&self) -> DVector<T> {
        match self {
            Self::Fe(field) => field.data().clone(),
            Self::Ip(field) => field.flattened(),
            Self::Nodal(values) => values.clone(),
        }
    }
}

/// Named fields and constants, with cached integration-point and centroid representations.
///
/// The cached representations are only recomputed by [`update`](Self::update). They go stale
/// when fields are added or changed in between.
#[derive(Debug)]
pub struct FieldsEvaluator<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    originals: BTreeMap<String, Field<T, D>>,
    constants: BTreeMap<String, T>,
    rules: Arc<IntegrationRules<T>>,
    centroid_rules: Arc<IntegrationRules<T>>,
    filter: Option<ElementSelector>,
    at_ip: Option<BTreeMap<String, IpField<T, D>>>,
    at_centroids: Option<BTreeMap<String, IpField<T, D>>>,
}

impl<T, D> FieldsEvaluator<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            originals: BTreeMap::new(),
            constants: BTreeMap::new(),
            rules: Arc::new(IntegrationRules::named("LagrangeIsoParam")?),
            centroid_rules: Arc::new(IntegrationRules::named("ElementCenterEval")?),
            filter: None,
            at_ip: None,
            at_centroids: None,
        })
    }

    pub fn with_fields(fields: impl IntoIterator<Item = Field<T, D>>) -> Result<Self, Error> {
        let mut evaluator = Self::new()?;
        for field in fields {
            evaluator.add_field(field);
        }
        Ok(evaluator)
    }

    /// Adds a field, replacing any field of the same name.
    pub fn add_field(&mut self, field: impl Into<Field<T, D>>) {
        let field = field.into();
        self.originals.insert(field.name().to_string(), field);
    }

    pub fn add_constant(&mut self, name: impl Into<String>, value: T) {
        self.constants.insert(name.into(), value);
    }

    /// Restricts the integration-point and centroid representations to the selected elements.
    pub fn set_filter(&mut self, filter: Option<ElementSelector>) {
        self.filter = filter;
    }

    pub fn field(&self, name: &str) -> Option<&Field<T, D>> {
        self.originals.get(name)
    }

    pub fn constant(&self, name: &str) -> Option<T> {
        self.constants.get(name).copied()
    }

    /// Recomputes cached representations of the fields.
    pub fn update(&mut self, refresh: Refresh) -> eyre::Result<()> {
        let fields: Vec<Field<T, D>> = self.originals.values().cloned().collect();
        let by_name = |ip_fields: Vec<IpField<T, D>>| {
            ip_fields
                .into_iter()
                .map(|field| (field.name().to_string(), field))
                .collect::<BTreeMap<_, _>>()
        };
        if matches!(refresh, Refresh::All | Refresh::IpFields) {
            let at_ip = fields_at_ip(&fields, &self.rules, self.filter.as_ref())
                .wrap_err("failed to compute the integration-point representation")?;
            debug!("evaluator: {} fields at integration points", at_ip.len());
            self.at_ip = Some(by_name(at_ip));
        }
        if matches!(refresh, Refresh::All | Refresh::Centroids) {
            let at_centroids = fields_at_ip(&fields, &self.centroid_rules, self.filter.as_ref())
                .wrap_err("failed to compute the centroid representation")?;
            debug!("evaluator: {} fields at centroids", at_centroids.len());
            self.at_centroids = Some(by_name(at_centroids));
        }
        Ok(())
    }

    fn cached(&self, representation: Representation) -> Result<Option<&BTreeMap<String, IpField<T, D>>>, Error> {
        let cache = match representation {
            Representation::IpField => &self.at_ip,
            Representation::Centroids => &self.at_centroids,
            Representation::FeField | Representation::Nodes => return Ok(None),
        };
        cache
            .as_ref()
            .map(Some)
            .ok_or_else(|| Error::RepresentationNotReady {
                representation: representation.to_string(),
            })
    }

    /// The constants and the fields in the given representation, fields shadowing constants.
    ///
    /// Integration-point fields have no finite element or nodal representation and are left out
    /// of those.
    pub fn fields_at(&self, representation: Representation) -> Result<BTreeMap<String, Operand<T>>, Error> {
        let mut operands: BTreeMap<String, Operand<T>> = self
            .constants
            .iter()
            .map(|(name, &value)| (name.clone(), Operand::Scalar(value)))
            .collect();
        match self.cached(representation)? {
            Some(fields) => {
                for (name, field) in fields {
                    operands.insert(name.clone(), Operand::Array(field.flattened()));
                }
            }
            None => {
                for (name, field) in &self.originals {
                    let Field::Fe(field) = field else {
                        continue;
                    };
                    let values = match representation {
                        Representation::Nodes => field.point_representation(T::zero()),
                        _ => field.data().clone(),
                    };
                    operands.insert(name.clone(), Operand::Array(values));
                }
            }
        }
        Ok(operands)
    }

    /// Evaluates the expression by walking its tree.
    pub fn compute(&self, expr: &Expr, representation: Representation) -> eyre::Result<Evaluated<T, D>> {
        let symbols: Vec<&str> = expr.symbols().into_iter().collect();
        self.compute_with(&expr.to_string(), representation, &symbols, |operands| {
            expr.evaluate(operands)
        })
    }

    /// Evaluates the expression through its common-subexpression plan.
    pub fn compute_optimized(&self, expr: &Expr, representation: Representation) -> eyre::Result<Evaluated<T, D>> {
        let plan = EvaluationPlan::new(expr);
        debug!("evaluator: `{expr}` planned in {} steps", plan.len());
        let symbols: Vec<&str> = expr.symbols().into_iter().collect();
        self.compute_with(&expr.to_string(), representation, &symbols, |operands| {
            plan.evaluate(operands)
        })
    }

    /// Evaluates an arbitrary function of the operands of a representation.
    ///
    /// The result takes the layout of the first field in `preferred` that exists in the
    /// representation, or else of any field in it.
    pub fn compute_with(
        &self,
        name: &str,
        representation: Representation,
        preferred: &[&str],
        f: impl FnOnce(&BTreeMap<String, Operand<T>>) -> Result<Operand<T>, Error>,
    ) -> eyre::Result<Evaluated<T, D>> {
        let context = || format!("failed to evaluate `{name}` on {representation}");
        let operands = self.fields_at(representation).wrap_err_with(context)?;
        let result = f(&operands).wrap_err_with(context)?;
        self.shape_result(name, representation, preferred, result)
            .wrap_err_with(context)
    }

    fn shape_result(
        &self,
        name: &str,
        representation: Representation,
        preferred: &[&str],
        result: Operand<T>,
    ) -> Result<Evaluated<T, D>, Error> {
        let no_layout = || Error::IncompatibleOperands {
            reason: format!("no field gives the layout of `{name}` on {representation}"),
        };
        match self.cached(representation)? {
            Some(fields) => {
                let template = preferred
                    .iter()
                    .find_map(|n| fields.get(*n))
                    .or_else(|| fields.values().next())
                    .ok_or_else(no_layout)?;
                let n = template.data().values().map(|m| m.len()).sum();
                let values = result.into_array(n)?;
                Ok(Evaluated::Ip(template.with_flattened(name, &values)?))
            }
            None => {
                let template = preferred
                    .iter()
                    .find_map(|n| self.originals.get(*n).and_then(Field::as_fe))
                    .or_else(|| self.originals.values().find_map(Field::as_fe))
                    .ok_or_else(no_layout)?;
                match representation {
                    Representation::Nodes => Ok(Evaluated::Nodal(result.into_array(template.mesh().num_nodes())?)),
                    _ => {
                        let values = result.into_array(template.numbering().size())?;
                        Ok(Evaluated::Fe(template.with_data(name, values)?))
                    }
                }
            }
        }
    }
}
