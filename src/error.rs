use thiserror::Error;

/// Error types for the raman-map-rs library.
///
/// Every variant describes an operation that was abandoned before it touched
/// any state: callers can report the message and carry on with the session.
#[derive(Error, Debug)]
pub enum RamanError {
    /// Error indicating a mismatch in array dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Text entered for a numeric field is not a number.
    #[error("Invalid entry '{text}' for {field}")]
    InvalidEntry { field: String, text: String },

    /// A band whose decay is exactly zero cannot be modelled.
    #[error("Band {0} has zero decay (zero-width Lorentzian)")]
    ZeroWidthBand(String),

    /// Two reference points share an x coordinate where a difference is required.
    #[error("Reference points share x = {0}; pick a point at a different frequency")]
    CoincidentReference(f64),

    /// The first and last anchors bound the spectrum and cannot be removed.
    #[error("Cannot remove the spectral limits (anchor {0})")]
    ProtectedAnchor(f64),

    /// The anchor is not in the set.
    #[error("Anchor {0} not found")]
    AnchorNotFound(f64),

    /// Not enough anchors to interpolate a baseline.
    #[error("At least two anchors are needed, got {0}")]
    TooFewAnchors(usize),

    /// No band with the given name.
    #[error("Band not found: {0}")]
    BandNotFound(String),

    /// Band collection was requested with no bands defined.
    #[error("No bands added")]
    NoBands,

    /// A fit was requested without any fully defined band.
    #[error("No defined bands to perform fit")]
    NoCollectedBands,

    /// Map fitting was requested before an accepted guide fit, or after edits.
    #[error("Average spectra is not fitted or changes were made after last fit")]
    StaleGuideFit,

    /// An operation needs loaded maps.
    #[error("No maps loaded")]
    NoMaps,

    /// An operation needs spectral data.
    #[error("No spectral data: {0}")]
    NoData(String),

    /// Map with the given original identifier is not registered.
    #[error("Map not found: {0}")]
    MapNotFound(String),

    /// A map with the same original identifier is already open.
    #[error("Map already open: {0}")]
    DuplicateMap(String),

    /// Malformed map text file.
    #[error("Malformed map file at line {line}: {message}")]
    MapFormat { line: usize, message: String },

    /// Malformed import file (fit report or anchor parameters).
    #[error("Wrong file type: {0}")]
    ImportFormat(String),

    /// Error for parameter-related problems.
    #[error("Parameter error: {0}")]
    ParameterError(String),

    /// Parameter not found.
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    /// Error during function evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<crate::parameters::parameter::ParameterError> for RamanError {
    fn from(err: crate::parameters::parameter::ParameterError) -> Self {
        RamanError::ParameterError(format!("{}", err))
    }
}

impl From<crate::parameters::bounds::BoundsError> for RamanError {
    fn from(err: crate::parameters::bounds::BoundsError) -> Self {
        RamanError::ParameterError(format!("{}", err))
    }
}

/// Result type alias for raman-map-rs operations.
pub type Result<T> = std::result::Result<T, RamanError>;
