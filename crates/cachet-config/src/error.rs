use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("Profile '{name}' is not defined")]
    UnknownProfile { name: String },

    #[error("No token found for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Could not serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not open store: {0}")]
    Store(#[from] cachet_core::StoreError),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Figment(Box::new(e))
    }
}
