use derive_more::Display;

pub type Result<T> = core::result::Result<T, IsosurfaceError>;

#[derive(Debug, Display)]
pub enum IsosurfaceError {
    /// Grid buffer length does not equal `resolution³`.
    #[display("grid of resolution {resolution} needs {expected} samples, got {actual}")]
    GridLength {
        resolution: usize,
        expected: usize,
        actual: usize,
    },

    /// Fewer than two samples per axis leaves no cell to march.
    #[display("grid resolution {_0} is too small, at least 2 samples per axis are required")]
    ResolutionTooSmall(usize),

    /// `max <= min` (or a non-finite bound) on some axis.
    #[display("invalid bounds on axis {axis}: min {min} must be below max {max}")]
    InvalidBounds { axis: usize, min: f32, max: f32 },

    #[display("isovalue {_0} is not a finite number")]
    InvalidIsovalue(f32),

    #[display("could not allocate output buffers for {_0} floats")]
    OutOfMemory(usize),

    #[display("buffer holds {actual} bytes, {expected} expected")]
    TruncatedBuffer { expected: usize, actual: usize },

    #[display("invalid grid header: {_0}")]
    InvalidHeader(String),

    /// The extraction task died before producing a result.
    #[display("extraction task failed: {_0}")]
    TaskFailed(String),
}

impl std::error::Error for IsosurfaceError {}
