//! Validation and value transforms
//!
//! Validators check (and may normalize) field values when a payload goes
//! through the schema; filters are the ready-made `OnInit` / `OnUpdate`
//! transforms fields can declare.

pub mod filters;
pub mod validators;

pub use validators::{
    ArrayValidator, BoolValidator, FieldValidator, FloatValidator, IntegerValidator,
    ReferenceValidator, StringValidator, TimeValidator,
};
