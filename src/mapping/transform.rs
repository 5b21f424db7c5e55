//! 2D affine transforms over interleaved position buffers

/// Row-major 2x3 affine matrix: `x' = a*x + b*y + tx`, `y' = c*x + d*y + ty`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn translation(tx: f32, ty: f32) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    pub fn scale(s: f32) -> Self {
        Self {
            a: s,
            d: s,
            ..Self::IDENTITY
        }
    }

    /// Rotation by `radians` about the origin
    pub fn rotation(radians: f32) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self {
            a: cos,
            b: -sin,
            c: sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Scale, then rotate, then translate
    pub fn from_scale_rotation_translation(scale: f32, radians: f32, tx: f32, ty: f32) -> Self {
        Self::scale(scale)
            .then(&Self::rotation(radians))
            .then(&Self::translation(tx, ty))
    }

    /// The transform that applies `self` first and `next` second
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            a: next.a * self.a + next.b * self.c,
            b: next.a * self.b + next.b * self.d,
            c: next.c * self.a + next.d * self.c,
            d: next.c * self.b + next.d * self.d,
            tx: next.a * self.tx + next.b * self.ty + next.tx,
            ty: next.c * self.tx + next.d * self.ty + next.ty,
        }
    }

    /// Uniform scale factor (length of the transformed unit x vector)
    pub fn scale_factor(&self) -> f32 {
        (self.a * self.a + self.c * self.c).sqrt()
    }

    #[inline]
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.b * y + self.tx,
            self.c * x + self.d * y + self.ty,
        )
    }

    /// Inverse transform, or `None` when the matrix is singular
    pub fn inverse(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f32::EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        let a = self.d * inv;
        let b = -self.b * inv;
        let c = -self.c * inv;
        let d = self.a * inv;
        Some(Affine {
            a,
            b,
            c,
            d,
            tx: -(a * self.tx + b * self.ty),
            ty: -(c * self.tx + d * self.ty),
        })
    }

    /// Transform interleaved `(x, y)` pairs from `src` into `dst`, reusing its allocation
    pub fn apply_into(&self, src: &[f32], dst: &mut Vec<f32>) {
        dst.clear();
        dst.reserve(src.len());
        for p in src.chunks_exact(2) {
            let (x, y) = self.apply(p[0], p[1]);
            dst.push(x);
            dst.push(y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-5 && (a.1 - b.1).abs() < 1e-5
    }

    #[test]
    fn test_composition_order() {
        let t = Affine::from_scale_rotation_translation(2.0, FRAC_PI_2, 10.0, 0.0);
        // (1,0) -> scale (2,0) -> rotate (0,2) -> translate (10,2)
        assert!(close(t.apply(1.0, 0.0), (10.0, 2.0)));
        assert!((t.scale_factor() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = Affine::from_scale_rotation_translation(1.5, 0.7, -3.0, 4.0);
        let inv = t.inverse().unwrap();
        let (x, y) = t.apply(12.0, -7.0);
        assert!(close(inv.apply(x, y), (12.0, -7.0)));
        assert!(Affine::scale(0.0).inverse().is_none());
    }

    #[test]
    fn test_apply_into_reuses_buffer() {
        let mut dst = Vec::with_capacity(4);
        Affine::translation(1.0, 1.0).apply_into(&[0.0, 0.0, 2.0, 3.0], &mut dst);
        assert_eq!(dst, vec![1.0, 1.0, 3.0, 4.0]);
        Affine::IDENTITY.apply_into(&[5.0, 6.0], &mut dst);
        assert_eq!(dst, vec![5.0, 6.0]);
    }
}
