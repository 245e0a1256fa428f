use anyhow::Result;

/// Implemented by stores that can be opened from environment-provided
/// options.
pub trait Backend: Sized + Send + Sync {
    /// The options used to connect to the backend.
    type ConnectOptions: FromEnv;

    /// Connect using options loaded from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the options cannot be loaded or the connection fails.
    fn connect() -> Result<Self> {
        Self::connect_with(Self::ConnectOptions::from_env()?)
    }

    /// Connect with the specified options.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    fn connect_with(options: Self::ConnectOptions) -> Result<Self>;
}

/// Trait for loading options from environment variables.
pub trait FromEnv: Sized {
    /// Create options from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    fn from_env() -> Result<Self>;
}
