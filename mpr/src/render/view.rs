//! Camera transforms
use nalgebra::{Matrix4, Vector3};

/// Object providing a world-to-model transform in 3D
///
/// World space is the `±1` cube produced by
/// [`VoxelSize::screen_to_world`](crate::render::VoxelSize::screen_to_world);
/// model space is the coordinate system of the rendered expression.
#[derive(Copy, Clone, Debug)]
pub struct View3 {
    center: Vector3<f32>,
    scale: f32,
    yaw: f32,
    pitch: f32,
    perspective: f32,
}

impl Default for View3 {
    fn default() -> Self {
        Self {
            center: Vector3::new(0.0, 0.0, 0.0),
            scale: 1.0,
            yaw: 0.0,
            pitch: 0.0,
            perspective: 0.0,
        }
    }
}

impl View3 {
    /// Builds a camera from a center (in model coordinates) and a scale
    ///
    /// The resulting camera will point at the center, and the viewport will be
    /// ± `scale` in size.
    pub fn from_center_and_scale(center: Vector3<f32>, scale: f32) -> Self {
        Self {
            center,
            scale,
            ..Self::default()
        }
    }

    /// Sets the camera's rotation, in radians
    ///
    /// `yaw` rotates about the model Z axis; `pitch` rotates about the X axis
    /// (and is applied first).
    pub fn set_rotation(&mut self, yaw: f32, pitch: f32) {
        self.yaw = yaw;
        self.pitch = pitch;
    }

    /// Sets the strength of the perspective effect
    ///
    /// With `p = 0`, the view is orthographic.  Otherwise, world-space points
    /// are divided by `1 + p * z`, so geometry closer to the viewer (larger Z)
    /// appears larger.  `p` should be in the range `[0, 1)` so that the divisor
    /// stays positive within the world cube.
    pub fn set_perspective(&mut self, p: f32) {
        self.perspective = p;
    }

    /// Returns the world-to-model transform matrix
    pub fn world_to_model(&self) -> Matrix4<f32> {
        let scale = Matrix4::new_scaling(self.scale);
        let rot = Matrix4::from_axis_angle(
            &nalgebra::Unit::new_normalize(Vector3::new(0.0, 0.0, 1.0)),
            self.yaw,
        ) * Matrix4::from_axis_angle(
            &nalgebra::Unit::new_normalize(Vector3::new(1.0, 0.0, 0.0)),
            self.pitch,
        );
        let translation = Matrix4::new_translation(&self.center);
        let mut perspective = Matrix4::identity();
        perspective[(3, 2)] = self.perspective;

        translation * rot * scale * perspective
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn to_model(v: &View3, p: Point3<f32>) -> Point3<f32> {
        v.world_to_model().transform_point(&p)
    }

    #[test]
    fn default_view() {
        let v = View3::default();
        assert_eq!(v.world_to_model(), Matrix4::identity());
    }

    #[test]
    fn center_and_scale() {
        let v = View3::from_center_and_scale(Vector3::new(1.0, 2.0, 3.0), 2.0);
        let p = to_model(&v, Point3::new(1.0, -1.0, 0.5));
        assert_relative_eq!(p, Point3::new(3.0, 0.0, 4.0));
    }

    #[test]
    fn rotation() {
        let mut v = View3::default();
        v.set_rotation(std::f32::consts::FRAC_PI_2, 0.0);
        let p = to_model(&v, Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-6);

        v.set_rotation(0.0, std::f32::consts::FRAC_PI_2);
        let p = to_model(&v, Point3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.0, 0.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn perspective() {
        let mut v = View3::default();
        v.set_perspective(0.5);
        let near = to_model(&v, Point3::new(1.0, 1.0, 1.0));
        let far = to_model(&v, Point3::new(1.0, 1.0, -1.0));
        assert_relative_eq!(near, Point3::new(1.0, 1.0, 1.0) / 1.5);
        assert_relative_eq!(far, Point3::new(1.0, 1.0, -1.0) / 0.5);
    }

    #[test]
    fn rotate_then_translate() {
        let mut v =
            View3::from_center_and_scale(Vector3::new(0.0, 0.0, 1.0), 0.5);
        v.set_rotation(std::f32::consts::FRAC_PI_2, 0.0);
        let p = to_model(&v, Point3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.0, 1.0, 1.0), epsilon = 1e-6);
    }
}
