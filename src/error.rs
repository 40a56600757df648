//! Library-wide error type.
//!
//! Every variant describes a configuration problem: the inputs do not fit together. None of
//! them is recoverable by retrying. Partial coverage (element types missing from an operator,
//! boundary DOFs that no bulk element reaches) is not an error and never shows up here.
use crate::element::ElementType;
use std::fmt;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A DOF attachment tag that is not one of `P`, `C`, `F`, `F2`, `G` or `IP`.
    UnsupportedAttachment { tag: String },
    /// The space has no definition for an element type that must be numbered.
    MissingElementSpace { element_type: ElementType, space: String },
    /// A space cannot be used with an element type of the mesh.
    IncompatibleSpace {
        element_type: ElementType,
        space: String,
        reason: String,
    },
    /// A selector kind that cannot be used for the requested operation.
    UnsupportedSelector { context: &'static str },
    /// No integration rule catalog entry with the given name.
    UnknownRule { name: String },
    /// The integration rule set has no rule for an element type.
    MissingRule { element_type: ElementType },
    /// Two fields that must share a mesh, space or rule do not.
    IncompatibleFields { reason: String },
    /// A data array does not have the length its numbering or layout demands.
    DataSizeMismatch { expected: usize, actual: usize },
    /// Restricted element ids that repeat or refer to missing elements.
    InvalidRestriction { element_type: ElementType, reason: String },
    /// Connectivity that does not fit the element type or refers to missing nodes.
    InvalidConnectivity { element_type: ElementType, reason: String },
    /// A transformed mesh lacks the original-ID arrays needed to relate it to its source.
    MissingOriginalIds { what: String },
    /// A node selector hit a node that carries no DOF in the field's numbering.
    MissingPointDof { node: usize },
    /// An expression refers to a name that is neither a field nor a constant.
    UnknownField { name: String },
    /// A cached representation was requested before it was computed.
    RepresentationNotReady { representation: String },
    /// Operands of an expression do not share a layout.
    IncompatibleOperands { reason: String },
    /// A derivative component outside the geometric dimension.
    InvalidDerivative { component: usize, dimension: usize },
    /// The least-squares solver refused to run.
    LeastSquares { reason: &'static str },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedAttachment { tag } => {
                write!(f, "unsupported DOF attachment tag `{tag}`")
            }
            Self::MissingElementSpace { element_type, space } => {
                write!(f, "space `{space}` has no definition for element type {element_type}")
            }
            Self::IncompatibleSpace {
                element_type,
                space,
                reason,
            } => {
                write!(f, "space `{space}` cannot be used on element type {element_type}: {reason}")
            }
            Self::UnsupportedSelector { context } => {
                write!(f, "this type of selector cannot be used to {context}")
            }
            Self::UnknownRule { name } => write!(f, "no integration rule named `{name}`"),
            Self::MissingRule { element_type } => {
                write!(f, "the integration rule set has no rule for element type {element_type}")
            }
            Self::IncompatibleFields { reason } => write!(f, "incompatible fields: {reason}"),
            Self::DataSizeMismatch { expected, actual } => {
                write!(f, "data has length {actual}, expected {expected}")
            }
            Self::InvalidRestriction { element_type, reason } => {
                write!(f, "invalid restriction for element type {element_type}: {reason}")
            }
            Self::InvalidConnectivity { element_type, reason } => {
                write!(f, "invalid connectivity for element type {element_type}: {reason}")
            }
            Self::MissingOriginalIds { what } => write!(f, "missing original ids for {what}"),
            Self::MissingPointDof { node } => write!(f, "node {node} carries no DOF in this numbering"),
            Self::UnknownField { name } => write!(f, "`{name}` is neither a field nor a constant"),
            Self::RepresentationNotReady { representation } => {
                write!(f, "the {representation} representation is not computed, call `update` first")
            }
            Self::IncompatibleOperands { reason } => write!(f, "incompatible operands: {reason}"),
            Self::InvalidDerivative { component, dimension } => {
                write!(f, "derivative component {component} out of range for dimension {dimension}")
            }
            Self::LeastSquares { reason } => write!(f, "least-squares solve failed: {reason}"),
        }
    }
}

impl std::error::Error for Error {}
