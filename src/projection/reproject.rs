//! Spatial reference identifiers and bounding box reprojection.
//!
//! The tile grid is always EPSG:3857. When a renderer works in another
//! reference system the tile extent is pushed through a
//! [`ProjectionTransform`] before it becomes the renderer's viewport.

use std::fmt;
use std::str::FromStr;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use super::mercator::{lon_lat_to_mercator, mercator_to_lon_lat, BoundingBox};
use crate::error::ProjectionError;

/// Legacy alias for Web Mercator used by older tile stacks.
const GOOGLE_MERCATOR_ALIAS: u32 = 900_913;

// =============================================================================
// Srs
// =============================================================================

/// An EPSG spatial reference identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Srs(u16);

impl Srs {
    /// EPSG:3857, the tiling scheme's native projection.
    pub const WEB_MERCATOR: Srs = Srs(3857);

    /// EPSG:4326, WGS84 longitude/latitude in degrees.
    pub const WGS84: Srs = Srs(4326);

    pub fn from_epsg(code: u16) -> Self {
        Srs(code)
    }

    pub fn code(&self) -> u16 {
        self.0
    }

    fn proj_string(&self) -> Result<&'static str, ProjectionError> {
        crs_definitions::from_code(self.0)
            .map(|def| def.proj4)
            .ok_or_else(|| ProjectionError::UnsupportedSrs(self.to_string()))
    }

    fn is_geographic(&self) -> Result<bool, ProjectionError> {
        Ok(self.proj_string()?.contains("+proj=longlat"))
    }
}

impl Default for Srs {
    fn default() -> Self {
        Srs::WEB_MERCATOR
    }
}

impl fmt::Display for Srs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for Srs {
    type Err = ProjectionError;

    /// Accepts `EPSG:<code>` (any case), a bare code, or `900913`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return Err(ProjectionError::UnsupportedSrs(s.to_string())),
            None => trimmed,
        };

        let code: u32 = digits
            .parse()
            .map_err(|_| ProjectionError::UnsupportedSrs(s.to_string()))?;

        if code == GOOGLE_MERCATOR_ALIAS {
            return Ok(Srs::WEB_MERCATOR);
        }

        u16::try_from(code)
            .map(Srs)
            .map_err(|_| ProjectionError::UnsupportedSrs(s.to_string()))
    }
}

// =============================================================================
// Transform Capability
// =============================================================================

/// Point transform between two spatial reference systems.
pub trait ProjectionTransform: Send + Sync {
    fn transform(&self, from: Srs, to: Srs, point: (f64, f64))
        -> Result<(f64, f64), ProjectionError>;
}

/// Transform backed by `proj4rs` with EPSG definitions from `crs-definitions`.
///
/// Web Mercator <-> WGS84 uses the closed-form spherical formulas; every
/// other pair goes through proj4rs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Proj4Transform;

impl Proj4Transform {
    pub fn new() -> Self {
        Self
    }

    fn transform_proj4(
        &self,
        from: Srs,
        to: Srs,
        point: (f64, f64),
    ) -> Result<(f64, f64), ProjectionError> {
        let source = Proj::from_proj_string(from.proj_string()?)
            .map_err(|e| ProjectionError::Transform(format!("invalid {}: {:?}", from, e)))?;
        let target = Proj::from_proj_string(to.proj_string()?)
            .map_err(|e| ProjectionError::Transform(format!("invalid {}: {:?}", to, e)))?;

        // proj4rs works in radians for geographic systems
        let source_geographic = from.is_geographic()?;
        let mut xyz = if source_geographic {
            (point.0.to_radians(), point.1.to_radians(), 0.0)
        } else {
            (point.0, point.1, 0.0)
        };

        transform(&source, &target, &mut xyz).map_err(|e| {
            ProjectionError::Transform(format!("{} -> {} failed: {:?}", from, to, e))
        })?;

        let out = if to.is_geographic()? {
            (xyz.0.to_degrees(), xyz.1.to_degrees())
        } else {
            (xyz.0, xyz.1)
        };

        if !out.0.is_finite() || !out.1.is_finite() {
            return Err(ProjectionError::Transform(format!(
                "{} -> {} produced a non-finite coordinate",
                from, to
            )));
        }

        Ok(out)
    }
}

impl ProjectionTransform for Proj4Transform {
    fn transform(
        &self,
        from: Srs,
        to: Srs,
        point: (f64, f64),
    ) -> Result<(f64, f64), ProjectionError> {
        match (from, to) {
            _ if from == to => Ok(point),
            (Srs::WEB_MERCATOR, Srs::WGS84) => Ok(mercator_to_lon_lat(point.0, point.1)),
            (Srs::WGS84, Srs::WEB_MERCATOR) => Ok(lon_lat_to_mercator(point.0, point.1)),
            _ => self.transform_proj4(from, to, point),
        }
    }
}

/// Reproject a bounding box, returning the envelope of its transformed
/// corners and edge midpoints.
///
/// # Errors
///
/// Propagates the transform's failure as a [`ProjectionError`].
pub fn reproject_bbox(
    bbox: &BoundingBox,
    from: Srs,
    to: Srs,
    transform: &dyn ProjectionTransform,
) -> Result<BoundingBox, ProjectionError> {
    if from == to {
        return Ok(*bbox);
    }

    let (cx, cy) = bbox.center();
    let samples = [
        (bbox.min_x, bbox.min_y),
        (bbox.min_x, bbox.max_y),
        (bbox.max_x, bbox.min_y),
        (bbox.max_x, bbox.max_y),
        (cx, bbox.min_y),
        (cx, bbox.max_y),
        (bbox.min_x, cy),
        (bbox.max_x, cy),
    ];

    let mut out = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for point in samples {
        let (x, y) = transform.transform(from, to, point)?;
        out.min_x = out.min_x.min(x);
        out.min_y = out.min_y.min(y);
        out.max_x = out.max_x.max(x);
        out.max_y = out.max_y.max(y);
    }

    if !out.is_valid() {
        return Err(ProjectionError::Transform(format!(
            "{} -> {} collapsed the extent",
            from, to
        )));
    }

    Ok(out)
}
