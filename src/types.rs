use nalgebra::{Point3, Vector3};

/// Scalar field value at a point in space.
pub type Value = f32;

/// A 3D point with [`Value`] components.
pub type Point = Point3<Value>;

/// A 3D vector with [`Value`] components.
pub type Vector = Vector3<Value>;

/// A scalar field function: maps a physical [`Point`] to a [`Value`].
///
/// Values **strictly below** the extraction isovalue are considered "inside" the surface.
/// The function may borrow from its caller (e.g. orbital coefficients) for `'a`.
pub type CompiledFunction<'a> = dyn Fn(Point) -> Value + Sync + 'a;
