//! Integration rules per element type, and the catalog of named rule sets.
use crate::element::{point_from_f64, ElementType, ReferenceShape};
use crate::error::Error;
use crate::space::ElementSpace;
use crate::Real;
use nalgebra::{convert, Point3, Scalar};
use ordered_float::OrderedFloat;
use rustc_hash::FxHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Errors returned by the quadrature primitives.
pub use femfields_quadrature::Error as QuadratureError;

/// Names of the rule sets in the catalog.
pub const RULE_NAMES: [&str; 7] = [
    "LagrangeIsoParam",
    "LagrangeP1",
    "LagrangeP2",
    "ElementCenterEval",
    "NodalEvalGeo",
    "NodalEvalP1",
    "NodalEvalP2",
];

/// Points and weights on a reference element.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationRule<T: Scalar> {
    points: Vec<Point3<T>>,
    weights: Vec<T>,
}

impl<T: Real> IntegrationRule<T> {
    /// A rule from its points and one weight per point.
    pub fn new(points: Vec<Point3<T>>, weights: Vec<T>) -> Result<Self, Error> {
        if points.len() != weights.len() {
            return Err(Error::DataSizeMismatch {
                expected: points.len(),
                actual: weights.len(),
            });
        }
        Ok(Self { points, weights })
    }

    fn from_rule<const D: usize>((weights, points): femfields_quadrature::Rule<D>) -> Self {
        let points = points
            .iter()
            .map(|p| {
                let mut padded = [0.0; 3];
                padded[..D].copy_from_slice(p);
                point_from_f64(&padded)
            })
            .collect();
        Self {
            points,
            weights: weights.into_iter().map(convert).collect(),
        }
    }

    /// Gauss rule of the given strength on the reference shape.
    pub fn gauss(shape: ReferenceShape, strength: usize) -> Result<Self, QuadratureError> {
        Ok(match shape {
            ReferenceShape::Point => Self {
                points: vec![Point3::origin()],
                weights: vec![T::one()],
            },
            ReferenceShape::Segment => Self::from_rule(femfields_quadrature::segment(strength)),
            ReferenceShape::Quadrilateral => Self::from_rule(femfields_quadrature::quadrilateral(strength)),
            ReferenceShape::Hexahedron => Self::from_rule(femfields_quadrature::hexahedron(strength)),
            ReferenceShape::Triangle => Self::from_rule(femfields_quadrature::triangle(strength)?),
            ReferenceShape::Tetrahedron => Self::from_rule(femfields_quadrature::tetrahedron(strength)?),
        })
    }

    /// A single point at the centroid, weighted with the reference measure.
    pub fn centroid(shape: ReferenceShape) -> Self {
        Self {
            points: vec![shape.centroid()],
            weights: vec![convert(shape.measure())],
        }
    }

    /// Unit weights at the given points, for point evaluation.
    pub fn nodal(points: &[Point3<T>]) -> Self {
        Self {
            points: points.to_vec(),
            weights: vec![T::one(); points.len()],
        }
    }

    pub fn points(&self) -> &[Point3<T>] {
        &self.points
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Approximates the reference integral of `f`.
    pub fn integrate(&self, f: impl Fn(&Point3<T>) -> T) -> T {
        self.weights
            .iter()
            .zip(&self.points)
            .fold(T::zero(), |acc, (&w, p)| acc + w * f(p))
    }
}

/// A set of integration rules, one per element type.
///
/// Named sets from the catalog are keyed by their name. Explicit sets are keyed by a hash of
/// their content, so equal content gives equal keys. Equality compares keys.
#[derive(Debug, Clone)]
pub struct IntegrationRules<T: Scalar> {
    key: String,
    rules: BTreeMap<ElementType, IntegrationRule<T>>,
}

impl<T: Scalar> PartialEq for IntegrationRules<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T: Real> IntegrationRules<T> {
    /// Looks up a rule set of the catalog.
    pub fn named(name: &str) -> Result<Self, Error> {
        let mut rules = BTreeMap::new();
        for ty in ElementType::ALL {
            let shape = ty.shape();
            let gauss = |strength| {
                IntegrationRule::gauss(shape, strength).map_err(|_| Error::MissingRule { element_type: ty })
            };
            let rule = match name {
                "LagrangeIsoParam" => gauss(if ty.is_quadratic() { 4 } else { 2 })?,
                "LagrangeP1" => gauss(2)?,
                "LagrangeP2" => gauss(4)?,
                "ElementCenterEval" => IntegrationRule::centroid(shape),
                "NodalEvalGeo" => IntegrationRule::nodal(&ty.reference_nodes()),
                "NodalEvalP1" => IntegrationRule::nodal(ElementSpace::lagrange_p1(shape).nodal_points()),
                "NodalEvalP2" => IntegrationRule::nodal(ElementSpace::lagrange_p2(shape).nodal_points()),
                _ => return Err(Error::UnknownRule { name: name.to_string() }),
            };
            rules.insert(ty, rule);
        }
        Ok(Self {
            key: name.to_string(),
            rules,
        })
    }

    /// A rule set given point by point.
    pub fn explicit(rules: BTreeMap<ElementType, IntegrationRule<T>>) -> Self {
        let mut hasher = FxHasher::default();
        let as_f64 = |x: &T| OrderedFloat(x.to_subset().unwrap_or(f64::NAN));
        for (ty, rule) in &rules {
            ty.hash(&mut hasher);
            for (p, w) in rule.points.iter().zip(&rule.weights) {
                p.coords.iter().for_each(|x| as_f64(x).hash(&mut hasher));
                as_f64(w).hash(&mut hasher);
            }
        }
        Self {
            key: format!("Explicit[{:016x}]", hasher.finish()),
            rules,
        }
    }

    /// Restricts the set to the given element types.
    pub fn restricted_to(&self, element_types: &[ElementType]) -> Self {
        Self::explicit(
            self.rules
                .iter()
                .filter(|(ty, _)| element_types.contains(ty))
                .map(|(ty, rule)| (*ty, rule.clone()))
                .collect(),
        )
    }
}

impl<T: Scalar> IntegrationRules<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self, element_type: ElementType) -> Option<&IntegrationRule<T>> {
        self.rules.get(&element_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementType, &IntegrationRule<T>)> {
        self.rules.iter().map(|(ty, rule)| (*ty, rule))
    }

    pub fn element_types(&self) -> impl Iterator<Item = ElementType> + '_ {
        self.rules.keys().copied()
    }
}

/// Either the name of a catalog rule set or an explicit rule set.
#[derive(Debug, Clone)]
pub enum RuleSpec<T: Scalar> {
    Named(String),
    Explicit(Arc<IntegrationRules<T>>),
}

impl<T: Real> RuleSpec<T> {
    pub fn resolve(&self) -> Result<Arc<IntegrationRules<T>>, Error> {
        match self {
            Self::Named(name) => Ok(Arc::new(IntegrationRules::named(name)?)),
            Self::Explicit(rules) => Ok(Arc::clone(rules)),
        }
    }
}

impl<T: Scalar> From<&str> for RuleSpec<T> {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl<T: Scalar> From<Arc<IntegrationRules<T>>> for RuleSpec<T> {
    fn from(rules: Arc<IntegrationRules<T>>) -> Self {
        Self::Explicit(rules)
    }
}
