use tapatan_vision_aruco::ParamsError;

/// Invalid configuration. Always fatal: returned from constructors only.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("distance_mm must be finite and > 0, got {0}")]
    DistanceMm(f64),
    #[error("smoothing_frames must be in 3..=5, got {0}")]
    SmoothingFrames(usize),
    #[error("safety_margin_mm must be finite and >= 0, got {0}")]
    SafetyMargin(f64),
    #[error("reference marker ids must differ, both are {0}")]
    SameReferenceIds(u32),
    #[error("reference marker id {id} is outside the dictionary ({len} ids)")]
    ReferenceIdOutsideDictionary { id: u32, len: usize },
    #[error("marker distance range must satisfy 0 < min < max, got [{min_px}, {max_px}] px")]
    PlausibilityRange { min_px: f64, max_px: f64 },
    #[error("round_trip_tolerance_px must be finite and > 0, got {0}")]
    RoundTripTolerance(f64),
    #[error("dictionary has {found}x{found} markers, configuration expects {expected}x{expected}")]
    MarkerSizeMismatch { expected: usize, found: usize },
    #[error("dictionary is '{found}', configuration expects '{expected}'")]
    DictionaryName { expected: String, found: String },
    #[error("dictionary codes are {min_distance} bits apart, too close to correct {correction_bits} bits")]
    AmbiguousCodes { min_distance: u32, correction_bits: u8 },
    #[error(transparent)]
    Marker(#[from] ParamsError),
}

/// Coarse class of a per-frame failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The reference markers were not both seen, or their spacing is implausible.
    Detection,
    /// The board frame could not be built.
    Transform,
    /// A built frame, grid or workspace failed its self-check.
    Validation,
}

/// Recoverable per-frame calibration failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("markers not detected: {found} of 2 reference markers visible")]
    MarkersNotDetected { found: usize },
    #[error("implausible marker distance {distance_px:.1} px (expected {min_px}..={max_px} px)")]
    ImplausibleDistance {
        distance_px: f64,
        min_px: f64,
        max_px: f64,
    },
    #[error("invalid/degenerate transform: reference markers coincide")]
    DegenerateAxis,
    #[error("invalid/degenerate transform: non-finite parameters")]
    NonFiniteTransform,
    #[error("round-trip deviation {deviation_px:.4} px exceeds {tolerance_px} px")]
    RoundTripExceeded { deviation_px: f64, tolerance_px: f64 },
    #[error("grid out of bounds: cells {cells:?}")]
    GridOutOfBounds { cells: Vec<usize> },
    #[error("workspace validation failed: positions {positions:?}")]
    WorkspaceInvalid { positions: Vec<usize> },
}

impl CalibrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MarkersNotDetected { .. } | Self::ImplausibleDistance { .. } => {
                ErrorKind::Detection
            }
            Self::DegenerateAxis | Self::NonFiniteTransform => ErrorKind::Transform,
            Self::RoundTripExceeded { .. }
            | Self::GridOutOfBounds { .. }
            | Self::WorkspaceInvalid { .. } => ErrorKind::Validation,
        }
    }
}
