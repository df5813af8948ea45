//! Light sources

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Vec3;

/// Stable light handle; ids are never reused
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
pub struct LightId(pub u16);

/// Light types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    /// Uniform light with no position or direction
    Ambient,
    /// Directional light (like sunlight)
    Directional,
    /// Point light (like a lightbulb)
    Point,
    /// Spot light (like a flashlight)
    Spot,
}

/// Bucket a light is sorted into for shading; order is the shading order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LightCategory {
    /// Ambient lights
    Ambient,
    /// Directional lights without shadows
    Directional,
    /// Shadow-casting directional lights
    ShadowDirectional,
    /// Point lights without shadows
    Point,
    /// Shadow-casting point lights
    ShadowPoint,
    /// Spot lights without shadows
    Spot,
    /// Shadow-casting spot lights
    ShadowSpot,
}

impl LightCategory {
    /// Number of categories
    pub const COUNT: usize = 7;

    /// Every category in shading order
    pub const ALL: [Self; Self::COUNT] = [
        Self::Ambient,
        Self::Directional,
        Self::ShadowDirectional,
        Self::Point,
        Self::ShadowPoint,
        Self::Spot,
        Self::ShadowSpot,
    ];

    /// Position in shading order
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether lights in this bucket render a shadow map
    pub fn is_shadow(self) -> bool {
        matches!(
            self,
            Self::ShadowDirectional | Self::ShadowPoint | Self::ShadowSpot
        )
    }

    /// The non-shadow bucket of the same light kind
    pub fn without_shadow(self) -> Self {
        match self {
            Self::ShadowDirectional => Self::Directional,
            Self::ShadowPoint => Self::Point,
            Self::ShadowSpot => Self::Spot,
            other => other,
        }
    }
}

/// Light source
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    /// Light type
    pub kind: LightKind,
    /// Light position (for point/spot lights)
    pub position: Vec3,
    /// Light direction (for directional/spot lights)
    pub direction: Vec3,
    /// Light color
    pub color: Vec3,
    /// Light intensity
    pub intensity: f32,
    /// Light range (for point/spot lights)
    pub range: f32,
    /// Outer cone angle for spot lights (in radians)
    pub cone_angle: f32,
    /// Renders a shadow map when shadows are enabled
    pub casts_shadows: bool,
    /// Disabled lights are ignored by every light group
    pub enabled: bool,
}

impl Light {
    fn new(kind: LightKind, color: Vec3, intensity: f32) -> Self {
        Self {
            kind,
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, -1.0, 0.0),
            color,
            intensity,
            range: 0.0,
            cone_angle: 0.0,
            casts_shadows: false,
            enabled: true,
        }
    }

    /// Create an ambient light
    pub fn ambient(color: Vec3, intensity: f32) -> Self {
        Self::new(LightKind::Ambient, color, intensity)
    }

    /// Create a directional light
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize(),
            ..Self::new(LightKind::Directional, color, intensity)
        }
    }

    /// Create a point light
    pub fn point(position: Vec3, color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            position,
            range,
            ..Self::new(LightKind::Point, color, intensity)
        }
    }

    /// Create a spot light
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        intensity: f32,
        range: f32,
        cone_angle: f32,
    ) -> Self {
        Self {
            position,
            direction: direction.normalize(),
            range,
            cone_angle,
            ..Self::new(LightKind::Spot, color, intensity)
        }
    }

    /// Toggle shadow casting (builder style)
    pub fn with_shadows(mut self, casts_shadows: bool) -> Self {
        self.casts_shadows = casts_shadows;
        self
    }

    /// Shading bucket of this light; ambient lights never cast shadows
    pub fn category(&self) -> LightCategory {
        match (self.kind, self.casts_shadows) {
            (LightKind::Ambient, _) => LightCategory::Ambient,
            (LightKind::Directional, false) => LightCategory::Directional,
            (LightKind::Directional, true) => LightCategory::ShadowDirectional,
            (LightKind::Point, false) => LightCategory::Point,
            (LightKind::Point, true) => LightCategory::ShadowPoint,
            (LightKind::Spot, false) => LightCategory::Spot,
            (LightKind::Spot, true) => LightCategory::ShadowSpot,
        }
    }

    /// Whether the light has a finite reach
    pub fn is_local(&self) -> bool {
        matches!(self.kind, LightKind::Point | LightKind::Spot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_follows_kind_and_shadows() {
        let white = Vec3::new(1.0, 1.0, 1.0);
        assert_eq!(
            Light::ambient(white, 0.2).with_shadows(true).category(),
            LightCategory::Ambient
        );
        assert_eq!(
            Light::point(Vec3::zeros(), white, 1.0, 5.0).category(),
            LightCategory::Point
        );
        assert_eq!(
            Light::spot(Vec3::zeros(), Vec3::z(), white, 1.0, 5.0, 0.5)
                .with_shadows(true)
                .category(),
            LightCategory::ShadowSpot
        );
    }

    #[test]
    fn test_category_order() {
        assert!(LightCategory::ALL.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(LightCategory::ShadowPoint.without_shadow(), LightCategory::Point);
        assert_eq!(LightCategory::Spot.without_shadow(), LightCategory::Spot);
    }
}
