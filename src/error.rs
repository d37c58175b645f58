use thiserror::Error;

/// Errors raised while configuring or running a convolver.
///
/// Everything except the thread variants is a configuration error: it is
/// returned before any task starts and nothing is allocated.
#[derive(Debug, Error)]
pub enum ConvError {
    #[error("dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("dimensions {width}x{height} exceed maximum {max}")]
    DimensionTooLarge { width: u32, height: u32, max: u32 },

    #[error("kernel size must be positive and odd, got {0}")]
    InvalidKernelSize(usize),

    #[error("sigma must be positive and finite, got {0}")]
    InvalidSigma(f64),

    #[error("alpha must be positive and finite, got {0}")]
    InvalidAlpha(f64),

    #[error("frame rate must give a positive, schedulable period, got {0}")]
    InvalidPeriod(f64),

    #[error("tick period must be positive and finite, got {0}")]
    InvalidTickPeriod(f64),

    #[error("maximum timestamp must be non-zero")]
    InvalidMaxStamp,

    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),

    #[error("pipeline already stopped")]
    AlreadyStopped,
}

pub type Result<T> = std::result::Result<T, ConvError>;
