//! # Command
//!
//! An ordered set of uniquely-named parameters plus the raw body of the
//! invocation. The schema is declared once; `parse` binds an incoming
//! envelope body to it for each invocation.

use crate::param::{Param, SchemaError};
use errstack::ErrorStack;
use tracing::debug;

/// A command schema with the body it was last parsed from.
#[derive(Debug, Clone)]
pub struct Command {
    name: String,
    params: Vec<Param>,
    body: String,
}

impl Command {
    /// Declare an empty command schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            body: String::new(),
        }
    }

    /// Command name, as it appears in envelopes.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw body of the last `parse`.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Add a parameter to the schema. Names are unique within a command.
    pub fn add_param(&mut self, param: Param) -> Result<(), SchemaError> {
        if self.params.iter().any(|p| p.name() == param.name()) {
            return Err(SchemaError::DuplicateParameter {
                name: param.name().to_string(),
            });
        }
        self.params.push(param);
        Ok(())
    }

    /// Look up a parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name() == name)
    }

    /// Mutable lookup, for setting defaults and bounds at declaration
    /// time.
    pub fn param_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.params.iter_mut().find(|p| p.name() == name)
    }

    /// Declared parameters, in declaration order.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Whether `name` is declared and carries a user value.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.param(name).is_some_and(Param::is_defined)
    }

    /// Bind a `-name value` body to the declared parameters.
    ///
    /// Each assignment is type- and range-checked through the parameter
    /// setters. After binding, every mandatory parameter must hold a user
    /// or default value. The first failure is returned and recorded on
    /// `stack`; the raw body is kept either way for diagnostics.
    pub fn parse(&mut self, body: &str, stack: &mut ErrorStack) -> Result<(), SchemaError> {
        debug!(command = %self.name, body, "Parsing command body");
        self.body = body.to_string();

        let mut tokens = body.split_whitespace().peekable();
        while let Some(token) = tokens.next() {
            let Some(name) = token.strip_prefix('-') else {
                let err = SchemaError::UnknownParameter {
                    name: token.to_string(),
                };
                err.record(stack);
                return Err(err);
            };

            let Some(value) = tokens.next() else {
                let err = SchemaError::MissingValue {
                    name: name.to_string(),
                };
                err.record(stack);
                return Err(err);
            };

            let Some(param) = self.params.iter_mut().find(|p| p.name() == name) else {
                let err = SchemaError::UnknownParameter {
                    name: name.to_string(),
                };
                err.record(stack);
                return Err(err);
            };

            param.set_user_value(value, stack)?;
        }

        // Mandatory parameters must be covered by the body or a default.
        for p in &self.params {
            if !p.is_optional() && !p.is_defined() && !p.has_default_value() {
                let err = SchemaError::MissingParameter {
                    name: p.name().to_string(),
                };
                err.record(stack);
                return Err(err);
            }
        }

        Ok(())
    }

    /// Help text for the whole command: one block per parameter, in
    /// declaration order.
    #[must_use]
    pub fn help(&self) -> String {
        self.params.iter().map(Param::help).collect()
    }
}
