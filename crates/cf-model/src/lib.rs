//! CF data model types shared by the aggregation engine.
//!
//! A [`Field`] is a data variable together with its domain: axes,
//! dimension and auxiliary coordinates, cell measures, ancillaries and
//! coordinate references. Everything here is an in-memory model; reading
//! and writing netCDF is out of scope for this crate.

pub mod cell_methods;
pub mod coordref;
pub mod data;
pub mod error;
pub mod field;
pub mod property;
pub mod units;
pub mod variable;

pub use cell_methods::{CellMethod, CellMethods};
pub use coordref::{CoordRefSignature, CoordinateReference};
pub use data::{Data, FilePointer, Scalar, Values};
pub use error::{ModelError, ModelResult};
pub use field::{Construct, DomainAxis, Field};
pub use property::{Properties, PropertyValue};
pub use units::{Calendar, Units};
pub use variable::{AxisHint, Variable};
