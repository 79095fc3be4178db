// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be parsed.
    #[error("Failed to parse config file '{path}': {message}")]
    Parse {
        /// Configuration file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A value failed validation.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong.
        message: String,
    },

    /// Two entries of a section share an id.
    #[error("Duplicate {section} id: {id}")]
    DuplicateId {
        /// `drivers` or `loggers`.
        section: String,
        /// The repeated id.
        id: String,
    },

    /// A topic address does not parse.
    #[error("Invalid topic '{topic}' in '{field}'")]
    InvalidTopic {
        /// Dotted path of the field holding the topic.
        field: String,
        /// The address.
        topic: String,
    },

    /// The file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Configuration file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file does not exist.
    #[error("File not found: {path}")]
    FileNotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// An `FGATE_*` override holds an unusable value.
    #[error("Invalid environment variable value for '{name}': {message}")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// What is wrong.
        message: String,
    },

    /// Unknown file extension.
    #[error("Unsupported configuration format: {format}")]
    UnsupportedFormat {
        /// The extension seen.
        format: String,
    },

    /// Deserialization failed outside of a file context.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Parser message.
        message: String,
    },
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a duplicate id error.
    pub fn duplicate_id(section: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            section: section.into(),
            id: id.into(),
        }
    }

    /// Creates an invalid topic error.
    pub fn invalid_topic(field: impl Into<String>, topic: impl Into<String>) -> Self {
        Self::InvalidTopic {
            field: field.into(),
            topic: topic.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a file-not-found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid environment variable error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns `true` for errors about the file itself rather than its content.
    pub fn is_file_error(&self) -> bool {
        matches!(
            self,
            ConfigError::Io { .. } | ConfigError::FileNotFound { .. } | ConfigError::UnsupportedFormat { .. }
        )
    }

    /// Returns `true` for content errors a user can fix by editing the file.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            ConfigError::Validation { .. } | ConfigError::DuplicateId { .. } | ConfigError::InvalidTopic { .. }
        )
    }
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
