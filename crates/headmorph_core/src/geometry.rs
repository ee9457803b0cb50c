//! Geometry types shared with the streaming service and the blend callback
//!
//! The core never looks inside a geometry buffer. It only needs to find the
//! first buffer of a drawable's primary model and hand it, together with the
//! base head buffer and a weight, to an externally supplied [`MorphBlend`].

use glam::Vec3;

/// A streamed drawable: the primary LOD's models, each with its geometry buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct Drawable<G> {
    pub models: Vec<Model<G>>,
}

/// One renderable primitive of a drawable.
#[derive(Debug, Clone, PartialEq)]
pub struct Model<G> {
    pub geometries: Vec<G>,
}

impl<G> Drawable<G> {
    /// Drawable with a single model holding a single geometry buffer.
    pub fn single(geometry: G) -> Self {
        Self {
            models: vec![Model {
                geometries: vec![geometry],
            }],
        }
    }

    /// First geometry buffer of the first primary model, if any.
    pub fn primary_geometry(&self) -> Option<&G> {
        self.models.first()?.geometries.first()
    }
}

/// The opaque morph transform: blends `morph` into `base` scaled by `weight`.
pub trait MorphBlend<G> {
    fn apply_morph(&mut self, base: &mut G, morph: &G, weight: f32);
}

impl<G, F> MorphBlend<G> for F
where
    F: FnMut(&mut G, &G, f32),
{
    fn apply_morph(&mut self, base: &mut G, morph: &G, weight: f32) {
        self(base, morph, weight)
    }
}

/// Vertex positions of a head mesh, or per-vertex deltas for a morph target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshGeometry {
    pub positions: Vec<Vec3>,
}

impl MeshGeometry {
    pub fn new(positions: Vec<Vec3>) -> Self {
        Self { positions }
    }
}

/// Adds `delta * weight` to every base vertex. Extra vertices on either side are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearMorph;

impl MorphBlend<MeshGeometry> for LinearMorph {
    fn apply_morph(&mut self, base: &mut MeshGeometry, morph: &MeshGeometry, weight: f32) {
        for (vertex, delta) in base.positions.iter_mut().zip(&morph.positions) {
            *vertex += *delta * weight;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_geometry_is_first_buffer_of_first_model() {
        let drawable = Drawable {
            models: vec![
                Model { geometries: vec![1, 2] },
                Model { geometries: vec![3] },
            ],
        };
        assert_eq!(drawable.primary_geometry(), Some(&1));
    }

    #[test]
    fn primary_geometry_requires_a_buffer() {
        let no_models: Drawable<u8> = Drawable { models: vec![] };
        assert!(no_models.primary_geometry().is_none());

        let empty_model: Drawable<u8> = Drawable {
            models: vec![Model { geometries: vec![] }],
        };
        assert!(empty_model.primary_geometry().is_none());
    }

    #[test]
    fn linear_morph_scales_deltas() {
        let mut base = MeshGeometry::new(vec![Vec3::ZERO, Vec3::ONE]);
        let morph = MeshGeometry::new(vec![Vec3::Y, Vec3::X * 2.0]);

        LinearMorph.apply_morph(&mut base, &morph, 0.5);

        assert_eq!(base.positions[0], Vec3::new(0.0, 0.5, 0.0));
        assert_eq!(base.positions[1], Vec3::new(2.0, 1.0, 1.0));
    }

    #[test]
    fn closures_are_blend_transforms() {
        let mut calls = Vec::new();
        let mut blend = |base: &mut i32, morph: &i32, weight: f32| {
            calls.push(weight);
            *base += morph;
        };
        let mut base = 1;
        blend.apply_morph(&mut base, &2, 0.25);
        assert_eq!(base, 3);
        assert_eq!(calls, vec![0.25]);
    }
}
