//! Map styles loaded at startup.
//!
//! A style is a small JSON document:
//!
//! ```json
//! {
//!   "background": "#aad3df",
//!   "graticule": { "spacing": 1000000, "color": "#00000040", "width": 1 },
//!   "areas": [
//!     { "bbox": [-1000000, -1000000, 1000000, 1000000], "color": "#f2efe9" }
//!   ]
//! }
//! ```
//!
//! Coordinates are in the renderer's projection (EPSG:3857 meters unless the
//! server is configured with another SRS).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::error::StyleError;

// =============================================================================
// Color
// =============================================================================

/// RGBA colour parsed from `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const TRANSPARENT: Color = Color([0, 0, 0, 0]);
    pub const WHITE: Color = Color([255, 255, 255, 255]);
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| format!("colour '{}' must start with '#'", s))?;

        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return Err(format!("colour '{}' must be #rrggbb or #rrggbbaa", s));
        }

        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| format!("colour '{}' has an invalid hex digit", s))
        };

        let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Color([channel(0)?, channel(2)?, channel(4)?, alpha]))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// =============================================================================
// Style
// =============================================================================

/// Grid lines drawn at multiples of `spacing`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Graticule {
    pub spacing: f64,
    pub color: Color,
    #[serde(default = "default_line_width")]
    pub width: u32,
}

/// A filled rectangle, `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Area {
    pub bbox: [f64; 4],
    pub color: Color,
}

/// Drawing instructions for one map style.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Style {
    #[serde(default = "default_background")]
    pub background: Color,
    #[serde(default)]
    pub graticule: Option<Graticule>,
    #[serde(default)]
    pub areas: Vec<Area>,
}

fn default_background() -> Color {
    Color::TRANSPARENT
}

fn default_line_width() -> u32 {
    1
}

impl Default for Style {
    fn default() -> Self {
        Self {
            background: default_background(),
            graticule: None,
            areas: Vec::new(),
        }
    }
}

impl Style {
    /// Read and validate a style file.
    pub fn load(name: &str, path: &Path) -> Result<Self, StyleError> {
        let raw = std::fs::read_to_string(path).map_err(|source| StyleError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let style: Style = serde_json::from_str(&raw).map_err(|source| StyleError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        style.validate(name)?;
        Ok(style)
    }

    /// Check values serde cannot express.
    pub fn validate(&self, name: &str) -> Result<(), StyleError> {
        let invalid = |message: String| StyleError::Invalid {
            name: name.to_string(),
            message,
        };

        if let Some(graticule) = &self.graticule {
            if !graticule.spacing.is_finite() || graticule.spacing <= 0.0 {
                return Err(invalid(format!(
                    "graticule spacing must be positive, got {}",
                    graticule.spacing
                )));
            }
            if graticule.width == 0 {
                return Err(invalid("graticule width must be at least 1".to_string()));
            }
        }

        for (i, area) in self.areas.iter().enumerate() {
            let [min_x, min_y, max_x, max_y] = area.bbox;
            let finite = area.bbox.iter().all(|v| v.is_finite());
            if !finite || min_x >= max_x || min_y >= max_y {
                return Err(invalid(format!(
                    "area {} has an empty or non-finite bbox {:?}",
                    i, area.bbox
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Style Sources
// =============================================================================

/// A `name=path` (or bare `path`) style argument.
///
/// A bare path is named after its file stem, so `styles/osm.json` registers
/// the style `osm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSource {
    pub name: String,
    pub path: PathBuf,
}

impl FromStr for StyleSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, path) = match s.split_once('=') {
            Some((name, path)) => (name.trim().to_string(), PathBuf::from(path.trim())),
            None => {
                let path = PathBuf::from(s.trim());
                let name = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or_default()
                    .to_string();
                (name, path)
            }
        };

        if name.is_empty() {
            return Err(format!("style '{}' has no name", s));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!(
                "style name '{}' may only contain letters, digits, '-' and '_'",
                name
            ));
        }
        if path.as_os_str().is_empty() {
            return Err(format!("style '{}' has no path", name));
        }

        Ok(Self { name, path })
    }
}

impl fmt::Display for StyleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.path.display())
    }
}

// =============================================================================
// StyleSet
// =============================================================================

/// The styles registered at startup. The first one is the default.
#[derive(Debug, Clone)]
pub struct StyleSet {
    default: String,
    order: Vec<String>,
    styles: HashMap<String, Arc<Style>>,
}

impl StyleSet {
    /// Build a set from already parsed styles.
    pub fn from_styles<I>(styles: I) -> Result<Self, StyleError>
    where
        I: IntoIterator<Item = (String, Style)>,
    {
        let mut order = Vec::new();
        let mut map = HashMap::new();

        for (name, style) in styles {
            style.validate(&name)?;
            if map.insert(name.clone(), Arc::new(style)).is_some() {
                return Err(StyleError::Invalid {
                    name,
                    message: "registered more than once".to_string(),
                });
            }
            order.push(name);
        }

        let default = order.first().cloned().ok_or_else(|| StyleError::Invalid {
            name: String::new(),
            message: "at least one style is required".to_string(),
        })?;

        Ok(Self {
            default,
            order,
            styles: map,
        })
    }

    /// Load every style file, failing on the first unreadable or invalid one.
    pub fn load(sources: &[StyleSource]) -> Result<Self, StyleError> {
        let mut styles = Vec::with_capacity(sources.len());
        for source in sources {
            let style = Style::load(&source.name, &source.path)?;
            info!(
                style = %source.name,
                path = %source.path.display(),
                areas = style.areas.len(),
                "Loaded style"
            );
            styles.push((source.name.clone(), style));
        }
        Self::from_styles(styles)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Style>> {
        self.styles.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.styles.contains_key(name)
    }

    /// Name of the style served by the unprefixed tile route.
    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Style names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
