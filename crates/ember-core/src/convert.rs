//! Conversions between flat scalar arrays and vector arrays.
//!
//! These always build a new container. Element layouts are checked up front so
//! a type with padding or a mismatched lane count is rejected rather than
//! silently reinterpreted.

use crate::error::{Error, Result};
use glam::{Vec2, Vec3, Vec4};

/// A plain vector type made of `LANES` consecutive `f32` values.
pub trait VectorLanes: bytemuck::Pod {
    /// Number of `f32` components.
    const LANES: usize;
}

impl VectorLanes for Vec2 {
    const LANES: usize = 2;
}

impl VectorLanes for Vec3 {
    const LANES: usize = 3;
}

impl VectorLanes for Vec4 {
    const LANES: usize = 4;
}

impl VectorLanes for [f32; 2] {
    const LANES: usize = 2;
}

impl VectorLanes for [f32; 3] {
    const LANES: usize = 3;
}

impl VectorLanes for [f32; 4] {
    const LANES: usize = 4;
}

fn check_layout<V: VectorLanes>() -> Result<()> {
    let size = std::mem::size_of::<V>();
    if V::LANES == 0 || size != V::LANES * std::mem::size_of::<f32>() {
        return Err(Error::LayoutMismatch {
            type_name: std::any::type_name::<V>(),
            size,
            lanes: V::LANES,
        });
    }
    Ok(())
}

/// Group a flat scalar array into vectors of `V::LANES` components.
pub fn scalars_to_vectors<V: VectorLanes>(scalars: &[f32]) -> Result<Vec<V>> {
    check_layout::<V>()?;
    if scalars.len() % V::LANES != 0 {
        return Err(Error::InvalidLength {
            len: scalars.len(),
            lanes: V::LANES,
        });
    }

    Ok(scalars
        .chunks_exact(V::LANES)
        .map(|chunk| bytemuck::pod_read_unaligned(bytemuck::cast_slice(chunk)))
        .collect())
}

/// Flatten vectors back into a scalar array.
pub fn vectors_to_scalars<V: VectorLanes>(vectors: &[V]) -> Result<Vec<f32>> {
    check_layout::<V>()?;

    let mut scalars = Vec::with_capacity(vectors.len() * V::LANES);
    for vector in vectors {
        let bytes = bytemuck::bytes_of(vector);
        scalars.extend(
            bytes
                .chunks_exact(std::mem::size_of::<f32>())
                .map(bytemuck::pod_read_unaligned::<f32>),
        );
    }
    Ok(scalars)
}
