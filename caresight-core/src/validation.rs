//! Input validation for identifiers crossing the HTTP boundary.

// ============================================================================
// Canonical validation limits — single source of truth for the entire codebase
// ============================================================================

/// Maximum subject (user/camera/event/...) identifier length
pub const SUBJECT_ID_MAX: usize = 64;

/// Maximum permission key length
pub const PERMISSION_KEY_MAX: usize = 128;

/// Validation error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid {field}: {message}")]
    Field { field: String, message: String },

    #[error("Multiple validation errors: {0}")]
    Multiple(String),
}

/// Validation result
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validator for subject identifiers (user, camera, event, snapshot,
/// notification ids). Ids are opaque nanoid-style tokens, so the check is
/// length plus charset only.
pub struct SubjectIdValidator {
    field: &'static str,
    max_length: usize,
}

impl SubjectIdValidator {
    #[must_use]
    pub const fn new(field: &'static str) -> Self {
        Self {
            field,
            max_length: SUBJECT_ID_MAX,
        }
    }

    #[must_use]
    pub const fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = max;
        self
    }

    pub fn validate(&self, value: &str) -> ValidationResult<()> {
        if value.is_empty() {
            return Err(ValidationError::Field {
                field: self.field.to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if value.len() > self.max_length {
            return Err(ValidationError::Field {
                field: self.field.to_string(),
                message: format!("must be at most {} characters", self.max_length),
            });
        }

        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ValidationError::Field {
                field: self.field.to_string(),
                message: "can only contain letters, numbers, underscores, and hyphens"
                    .to_string(),
            });
        }

        Ok(())
    }
}

/// Validator for permission keys (`alert:read`, `stream_view`, ...).
pub struct PermissionKeyValidator {
    max_length: usize,
}

impl Default for PermissionKeyValidator {
    fn default() -> Self {
        Self {
            max_length: PERMISSION_KEY_MAX,
        }
    }
}

impl PermissionKeyValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, key: &str) -> ValidationResult<()> {
        if key.is_empty() {
            return Err(ValidationError::Field {
                field: "permission".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if key.len() > self.max_length {
            return Err(ValidationError::Field {
                field: "permission".to_string(),
                message: format!("must be at most {} characters", self.max_length),
            });
        }

        // Lowercase namespaced keys only; both spellings are accepted
        if !key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == ':')
        {
            return Err(ValidationError::Field {
                field: "permission".to_string(),
                message: "can only contain lowercase letters, digits, underscores, and colons"
                    .to_string(),
            });
        }

        Ok(())
    }
}

/// Batch validator collecting multiple field errors before reporting.
#[derive(Default)]
pub struct Validator {
    errors: Vec<ValidationError>,
}

impl Validator {
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn validate_field<F>(&mut self, _field: &str, result: ValidationResult<F>) -> &mut Self {
        if let Err(e) = result {
            self.errors.push(e);
        }
        self
    }

    /// Record a field error directly, for cross-field rules no single
    /// validator can express.
    pub fn add_error(&mut self, field: &str, message: &str) -> &mut Self {
        self.errors.push(ValidationError::Field {
            field: field.to_string(),
            message: message.to_string(),
        });
        self
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> ValidationResult<()> {
        let mut errors = self.errors;
        match errors.len() {
            0 => Ok(()),
            1 => {
                if let Some(err) = errors.pop() {
                    Err(err)
                } else {
                    Ok(())
                }
            }
            _ => {
                let combined = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(ValidationError::Multiple(combined))
            }
        }
    }
}
