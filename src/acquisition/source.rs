//! Line-oriented data source abstraction
//!
//! A [`LineSource`] is one blocking, line-producing device (a serial port in
//! production, a simulated board or a scripted feed in tests). A
//! [`SourceProvider`] enumerates the sources available at connect time.

use thiserror::Error;

/// Acquisition errors
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("No sensor sources found")]
    NoSources,

    #[error("Source enumeration failed: {0}")]
    Enumerate(String),

    #[error("Failed to open source {name}: {message}")]
    Open { name: String, message: String },

    #[error("Read failed on {name}: {message}")]
    Read { name: String, message: String },

    #[error("Source {0} closed")]
    SourceClosed(String),

    #[error("All sensor sources are down")]
    AllSourcesDown,

    #[error("Failed to spawn reader thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Parser setup failed: {0}")]
    Parser(#[from] regex::Error),
}

impl AcquisitionError {
    /// Connection-class errors trigger the reconnect policy
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            AcquisitionError::NoSources
                | AcquisitionError::AllSourcesDown
                | AcquisitionError::Open { .. }
                | AcquisitionError::SourceClosed(_)
        )
    }
}

/// One blocking line-oriented device
pub trait LineSource: Send + 'static {
    /// Human-readable name for logging (port path, board label)
    fn name(&self) -> &str;

    /// Open the underlying device. Called once on the reader thread.
    fn open(&mut self) -> Result<(), AcquisitionError>;

    /// Read the next complete line.
    ///
    /// `Ok(None)` means the per-read timeout elapsed with no complete line;
    /// callers use it to poll their stop flag.
    fn read_line(&mut self) -> Result<Option<String>, AcquisitionError>;
}

/// Enumerates the sources available right now
pub trait SourceProvider: Send + Sync {
    fn discover(&self) -> Result<Vec<Box<dyn LineSource>>, AcquisitionError>;

    fn provider_name(&self) -> &str;
}
