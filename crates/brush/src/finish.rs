//! Polish finishes
//!
//! A finish changes how strokes look, not how they are simulated: the
//! fallback compositor scales its underlay and highlight strokes by the
//! finish profile, and the host renderer shades the nail with the finish's
//! material parameters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Polish finish selected in the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Finish {
    Cream,
    #[default]
    Glossy,
    Matte,
    Metallic,
    Shimmer,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown finish: {0:?}")]
pub struct FinishParseError(pub String);

/// How the fallback compositor layers a stroke for a finish
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishProfile {
    /// Opacity multiplier for the gloss highlight stroke (0 disables it)
    pub highlight: f32,
    /// How much darker the underlay is than the main color (0..1)
    pub underlay_darkening: f32,
    /// Edge hardness of the main stroke
    pub hardness: f32,
}

/// PBR parameters for the host renderer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialParams {
    pub roughness: f32,
    pub metalness: f32,
    pub clearcoat: f32,
}

impl Finish {
    pub const ALL: [Finish; 5] = [
        Finish::Cream,
        Finish::Glossy,
        Finish::Matte,
        Finish::Metallic,
        Finish::Shimmer,
    ];

    /// Identifier used by the UI
    pub fn as_str(&self) -> &'static str {
        match self {
            Finish::Cream => "cream",
            Finish::Glossy => "glossy",
            Finish::Matte => "matte",
            Finish::Metallic => "metallic",
            Finish::Shimmer => "shimmer",
        }
    }

    pub fn profile(&self) -> FinishProfile {
        match self {
            Finish::Cream => FinishProfile {
                highlight: 0.25,
                underlay_darkening: 0.2,
                hardness: 0.7,
            },
            Finish::Glossy => FinishProfile {
                highlight: 0.6,
                underlay_darkening: 0.25,
                hardness: 0.8,
            },
            Finish::Matte => FinishProfile {
                highlight: 0.0,
                underlay_darkening: 0.15,
                hardness: 0.6,
            },
            Finish::Metallic => FinishProfile {
                highlight: 0.8,
                underlay_darkening: 0.35,
                hardness: 0.85,
            },
            Finish::Shimmer => FinishProfile {
                highlight: 0.7,
                underlay_darkening: 0.2,
                hardness: 0.75,
            },
        }
    }

    pub fn material_params(&self) -> MaterialParams {
        match self {
            Finish::Cream => MaterialParams {
                roughness: 0.35,
                metalness: 0.0,
                clearcoat: 0.3,
            },
            Finish::Glossy => MaterialParams {
                roughness: 0.08,
                metalness: 0.0,
                clearcoat: 1.0,
            },
            Finish::Matte => MaterialParams {
                roughness: 0.8,
                metalness: 0.0,
                clearcoat: 0.0,
            },
            Finish::Metallic => MaterialParams {
                roughness: 0.2,
                metalness: 0.9,
                clearcoat: 0.6,
            },
            Finish::Shimmer => MaterialParams {
                roughness: 0.25,
                metalness: 0.4,
                clearcoat: 0.8,
            },
        }
    }
}

impl std::fmt::Display for Finish {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Finish {
    type Err = FinishParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim();
        Finish::ALL
            .into_iter()
            .find(|finish| finish.as_str().eq_ignore_ascii_case(id))
            .ok_or_else(|| FinishParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_finish_identifiers() {
        for finish in Finish::ALL {
            assert_eq!(finish.as_str().parse::<Finish>(), Ok(finish));
        }
        assert_eq!(" Metallic ".parse::<Finish>(), Ok(Finish::Metallic));
        assert!(matches!(
            "sparkle".parse::<Finish>(),
            Err(FinishParseError(id)) if id == "sparkle"
        ));
    }

    #[test]
    fn test_matte_has_no_highlight() {
        assert_eq!(Finish::Matte.profile().highlight, 0.0);
        assert!(Finish::Glossy.profile().highlight > 0.0);
    }

    #[test]
    fn test_material_params_in_range() {
        for finish in Finish::ALL {
            let m = finish.material_params();
            for value in [m.roughness, m.metalness, m.clearcoat] {
                assert!((0.0..=1.0).contains(&value));
            }
        }
        assert!(Finish::Metallic.material_params().metalness > Finish::Glossy.material_params().metalness);
    }

    #[test]
    fn test_serde_identifier() {
        let json = serde_json::to_string(&Finish::Shimmer).unwrap();
        assert_eq!(json, "\"shimmer\"");
    }
}
