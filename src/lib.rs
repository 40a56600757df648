//! Degree-of-freedom numbering, field containers and field transfer operators for finite
//! element meshes.
//!
//! The main pieces, from the bottom up:
//!
//! - [`space`]: shape functions per element type and the mesh entity each DOF is attached to.
//! - [`quadrature`]: the named integration rule catalog.
//! - [`numbering`]: global, deduplicated DOF numberings of a space over a mesh.
//! - [`field`]: finite element fields and integration-point fields.
//! - [`transfer`]: least-squares transfer operators between representations.
//! - [`fill`], [`transport`] and [`evaluator`]: building fields, moving them between meshes and
//!   evaluating expressions over them.
pub mod cache;
pub mod element;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod field;
pub mod fill;
pub mod filter;
pub mod mesh;
pub mod numbering;
pub mod quadrature;
pub mod space;
pub mod transfer;
pub mod transport;
pub mod weak_form;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub use error::Error;
pub use femfields_traits::Real;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
