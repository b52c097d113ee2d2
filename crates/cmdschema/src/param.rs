//! # Parameter
//!
//! One named, typed parameter of a command. Four canonical string-valued
//! slots are kept: user value, default value, minimum and maximum bound.
//! Every value assigned to any slot must type-check first; the user and
//! default slots are additionally range-checked against whichever bounds
//! are set.

use crate::MODULE_ID;
use errstack::ErrorStack;
use thiserror::Error;

/// Diagnostic codes stamped on the error stack by schema validation.
pub const CODE_INTEGER_VALUE: i32 = 1;
pub const CODE_DOUBLE_VALUE: i32 = 2;
pub const CODE_LOGICAL_VALUE: i32 = 3;
pub const CODE_VALUE_OUT_OF_RANGE: i32 = 4;

/// The four parameter types a command schema may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Double,
    Logical,
}

impl ParamType {
    /// Lower-case name used in help output and diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Double => "double",
            ParamType::Logical => "logical",
        }
    }
}

/// Validation failures. All are local: the operation returns the error
/// and pushes a matching entry onto the caller's error stack; nothing
/// here aborts the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Value does not parse as the declared type.
    #[error("Value '{value}' of parameter '{param}' is not a valid {}", expected.name())]
    TypeMismatch {
        param: String,
        value: String,
        expected: ParamType,
    },

    /// Value violates the lower bound.
    #[error("Value '{value}' of parameter '{param}' must be greater than '{min}'")]
    BelowMinimum {
        param: String,
        value: String,
        min: String,
    },

    /// Value violates the upper bound.
    #[error("Value '{value}' of parameter '{param}' must be less than '{max}'")]
    AboveMaximum {
        param: String,
        value: String,
        max: String,
    },

    /// Body named a parameter the schema does not declare.
    #[error("Unknown parameter '{name}'")]
    UnknownParameter { name: String },

    /// A mandatory parameter has neither a user nor a default value.
    #[error("Mandatory parameter '{name}' is missing")]
    MissingParameter { name: String },

    /// A parameter token was not followed by a value.
    #[error("Parameter '{name}' has no value")]
    MissingValue { name: String },

    /// Two parameters with the same name in one schema.
    #[error("Duplicate parameter '{name}' in command definition")]
    DuplicateParameter { name: String },
}

impl SchemaError {
    /// Push this failure onto `stack`. Range violations are end-user
    /// oriented; everything else is maintainer-facing.
    pub fn record(&self, stack: &mut ErrorStack) {
        let location = concat!(file!(), ":", line!());
        let result = match self {
            SchemaError::BelowMinimum { .. } | SchemaError::AboveMaximum { .. } => {
                stack.add_user(MODULE_ID, location, CODE_VALUE_OUT_OF_RANGE, self.to_string())
            }
            SchemaError::TypeMismatch { expected, .. } => {
                let code = match expected {
                    ParamType::Integer => CODE_INTEGER_VALUE,
                    ParamType::Double => CODE_DOUBLE_VALUE,
                    ParamType::Logical => CODE_LOGICAL_VALUE,
                    ParamType::String => CODE_INTEGER_VALUE,
                };
                stack.add(MODULE_ID, location, code, self.to_string())
            }
            _ => stack.add(MODULE_ID, location, CODE_VALUE_OUT_OF_RANGE, self.to_string()),
        };
        if let Err(e) = result {
            tracing::warn!("Diagnostic entry dropped: {e}");
        }
    }
}

/// Native representations a canonical string slot can be read back as.
pub trait ParamValue: Sized {
    /// Parse `raw` for parameter `param`; the error names both the
    /// parameter and the offending raw value.
    fn parse_slot(param: &str, raw: &str) -> Result<Self, SchemaError>;
}

impl ParamValue for i32 {
    fn parse_slot(param: &str, raw: &str) -> Result<Self, SchemaError> {
        raw.trim()
            .parse()
            .map_err(|_| SchemaError::TypeMismatch {
                param: param.to_string(),
                value: raw.to_string(),
                expected: ParamType::Integer,
            })
    }
}

impl ParamValue for f64 {
    fn parse_slot(param: &str, raw: &str) -> Result<Self, SchemaError> {
        raw.trim()
            .parse()
            .map_err(|_| SchemaError::TypeMismatch {
                param: param.to_string(),
                value: raw.to_string(),
                expected: ParamType::Double,
            })
    }
}

impl ParamValue for bool {
    fn parse_slot(param: &str, raw: &str) -> Result<Self, SchemaError> {
        match raw.trim() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(SchemaError::TypeMismatch {
                param: param.to_string(),
                value: raw.to_string(),
                expected: ParamType::Logical,
            }),
        }
    }
}

impl ParamValue for String {
    // Raw string retrieval always succeeds.
    fn parse_slot(_param: &str, raw: &str) -> Result<Self, SchemaError> {
        Ok(raw.to_string())
    }
}

/// One typed, named parameter. The empty string means "slot not set",
/// for all four slots.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    desc: String,
    ptype: ParamType,
    unit: String,
    optional: bool,
    user_value: String,
    default_value: String,
    min_value: String,
    max_value: String,
}

impl Param {
    /// Declare a parameter. Values and bounds are set afterwards through
    /// the checked setters.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        desc: impl Into<String>,
        ptype: ParamType,
        unit: impl Into<String>,
        optional: bool,
    ) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            ptype,
            unit: unit.into(),
            optional,
            user_value: String::new(),
            default_value: String::new(),
            min_value: String::new(),
            max_value: String::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn param_type(&self) -> ParamType {
        self.ptype
    }

    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Whether a user value has been assigned for this invocation.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        !self.user_value.is_empty()
    }

    #[must_use]
    pub fn has_default_value(&self) -> bool {
        !self.default_value.is_empty()
    }

    /// Raw user value; empty if unset.
    #[must_use]
    pub fn user_value_raw(&self) -> &str {
        &self.user_value
    }

    /// Raw default value; empty if unset.
    #[must_use]
    pub fn default_value_raw(&self) -> &str {
        &self.default_value
    }

    /// User value parsed into the requested native representation.
    pub fn user_value<T: ParamValue>(&self, stack: &mut ErrorStack) -> Result<T, SchemaError> {
        T::parse_slot(&self.name, &self.user_value).map_err(|e| {
            e.record(stack);
            e
        })
    }

    /// Default value parsed into the requested native representation.
    pub fn default_value<T: ParamValue>(&self, stack: &mut ErrorStack) -> Result<T, SchemaError> {
        T::parse_slot(&self.name, &self.default_value).map_err(|e| {
            e.record(stack);
            e
        })
    }

    /// Assign the user value: type check, then range check, commit only
    /// on success.
    pub fn set_user_value(&mut self, value: &str, stack: &mut ErrorStack) -> Result<(), SchemaError> {
        self.check_type(value).map_err(|e| {
            e.record(stack);
            e
        })?;
        self.check_range(value).map_err(|e| {
            e.record(stack);
            e
        })?;
        self.user_value = value.to_string();
        Ok(())
    }

    /// Assign the default value, with the same checks as the user value.
    pub fn set_default_value(
        &mut self,
        value: &str,
        stack: &mut ErrorStack,
    ) -> Result<(), SchemaError> {
        self.check_type(value).map_err(|e| {
            e.record(stack);
            e
        })?;
        self.check_range(value).map_err(|e| {
            e.record(stack);
            e
        })?;
        self.default_value = value.to_string();
        Ok(())
    }

    /// Set the lower bound. Bounds define the range, so only the type is
    /// checked.
    pub fn set_min_value(&mut self, value: &str, stack: &mut ErrorStack) -> Result<(), SchemaError> {
        self.check_type(value).map_err(|e| {
            e.record(stack);
            e
        })?;
        self.min_value = value.to_string();
        Ok(())
    }

    /// Set the upper bound; type check only.
    pub fn set_max_value(&mut self, value: &str, stack: &mut ErrorStack) -> Result<(), SchemaError> {
        self.check_type(value).map_err(|e| {
            e.record(stack);
            e
        })?;
        self.max_value = value.to_string();
        Ok(())
    }

    fn check_type(&self, value: &str) -> Result<(), SchemaError> {
        match self.ptype {
            ParamType::String => Ok(()),
            ParamType::Integer => i32::parse_slot(&self.name, value).map(|_| ()),
            ParamType::Double => f64::parse_slot(&self.name, value).map(|_| ()),
            ParamType::Logical => bool::parse_slot(&self.name, value).map(|_| ()),
        }
    }

    /// Range check a candidate against whichever bounds are set.
    ///
    /// Logical parameters are exempt. Integer and double compare
    /// numerically, string lexicographically against the matching bound.
    fn check_range(&self, value: &str) -> Result<(), SchemaError> {
        match self.ptype {
            ParamType::Logical => Ok(()),
            ParamType::String => {
                if !self.min_value.is_empty() && value < self.min_value.as_str() {
                    return Err(self.below_minimum(value));
                }
                if !self.max_value.is_empty() && value > self.max_value.as_str() {
                    return Err(self.above_maximum(value));
                }
                Ok(())
            }
            ParamType::Integer => {
                // Candidate and bounds already passed the type check.
                let v: i32 = value.trim().parse().unwrap_or_default();
                if let Ok(min) = self.min_value.trim().parse::<i32>() {
                    if v < min {
                        return Err(self.below_minimum(value));
                    }
                }
                if let Ok(max) = self.max_value.trim().parse::<i32>() {
                    if v > max {
                        return Err(self.above_maximum(value));
                    }
                }
                Ok(())
            }
            ParamType::Double => {
                let v: f64 = value.trim().parse().unwrap_or_default();
                if let Ok(min) = self.min_value.trim().parse::<f64>() {
                    if v < min {
                        return Err(self.below_minimum(value));
                    }
                }
                if let Ok(max) = self.max_value.trim().parse::<f64>() {
                    if v > max {
                        return Err(self.above_maximum(value));
                    }
                }
                Ok(())
            }
        }
    }

    fn below_minimum(&self, value: &str) -> SchemaError {
        SchemaError::BelowMinimum {
            param: self.name.clone(),
            value: value.to_string(),
            min: self.min_value.clone(),
        }
    }

    fn above_maximum(&self, value: &str) -> SchemaError {
        SchemaError::AboveMaximum {
            param: self.name.clone(),
            value: value.to_string(),
            max: self.max_value.clone(),
        }
    }

    /// Render the fixed help line for this parameter.
    ///
    /// Clauses whose underlying value is empty are omitted; when only one
    /// bound is set, the single-bound clause replaces the range clause.
    #[must_use]
    pub fn help(&self) -> String {
        let mut help = String::new();
        help.push_str("\t-");
        help.push_str(&self.name);

        help.push_str(" <");
        help.push_str(self.ptype.name());
        help.push('>');

        if self.has_default_value() {
            help.push_str(" (default = '");
            help.push_str(&self.default_value);
            help.push_str("')");
        }

        if !self.unit.is_empty() {
            help.push_str(" (unit = '");
            help.push_str(&self.unit);
            help.push_str("')");
        }

        if !self.min_value.is_empty() && !self.max_value.is_empty() {
            help.push_str(" (range from '");
            help.push_str(&self.min_value);
            help.push_str("' to '");
            help.push_str(&self.max_value);
            help.push_str("')");
        } else if !self.min_value.is_empty() {
            help.push_str(" (minimum value of '");
            help.push_str(&self.min_value);
            help.push_str("')");
        } else if !self.max_value.is_empty() {
            help.push_str(" (maximum value of '");
            help.push_str(&self.max_value);
            help.push_str("')");
        }

        help.push_str("\n\t\t");
        if self.desc.is_empty() {
            help.push_str("No description");
        } else {
            help.push_str(&self.desc);
        }
        help.push('\n');

        help
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> ErrorStack {
        ErrorStack::new("testProc")
    }

    #[test]
    fn test_set_user_value_type_checks() {
        let mut stack = stack();
        let mut p = Param::new("count", "number of frames", ParamType::Integer, "", true);

        assert!(p.set_user_value("12", &mut stack).is_ok());
        assert_eq!(p.user_value::<i32>(&mut stack).unwrap(), 12);

        let err = p.set_user_value("twelve", &mut stack).unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { .. }));
        // Failed assignment must not clobber the committed value.
        assert_eq!(p.user_value_raw(), "12");
        // The failure also landed on the error stack.
        assert!(stack.contains(MODULE_ID, CODE_INTEGER_VALUE));
    }

    #[test]
    fn test_integer_range_bounds() {
        let mut stack = stack();
        let mut p = Param::new("level", "", ParamType::Integer, "", true);
        p.set_min_value("0", &mut stack).unwrap();
        p.set_max_value("10", &mut stack).unwrap();

        assert!(p.set_user_value("5", &mut stack).is_ok());

        let err = p.set_user_value("11", &mut stack).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Value '11' of parameter 'level' must be less than '10'"
        );

        let err = p.set_user_value("-1", &mut stack).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Value '-1' of parameter 'level' must be greater than '0'"
        );

        // Range violations are user-facing on the stack.
        assert_eq!(stack.last_user_error().unwrap().code, CODE_VALUE_OUT_OF_RANGE);
    }

    #[test]
    fn test_double_range() {
        let mut stack = stack();
        let mut p = Param::new("exposure", "", ParamType::Double, "s", true);
        p.set_max_value("60.0", &mut stack).unwrap();

        assert!(p.set_user_value("59.9", &mut stack).is_ok());
        assert!(matches!(
            p.set_user_value("60.5", &mut stack).unwrap_err(),
            SchemaError::AboveMaximum { .. }
        ));
    }

    #[test]
    fn test_logical_never_range_checked() {
        let mut stack = stack();
        let mut p = Param::new("enabled", "", ParamType::Logical, "", true);
        // Bounds on a logical are type-checked but never applied.
        p.set_min_value("0", &mut stack).unwrap();
        p.set_max_value("0", &mut stack).unwrap();

        for v in ["1", "0", "true", "false"] {
            assert!(p.set_user_value(v, &mut stack).is_ok(), "rejected {v}");
        }
        assert!(p.set_user_value("yes", &mut stack).is_err());
    }

    #[test]
    fn test_string_range_upper_bound_uses_max_value() {
        let mut stack = stack();
        let mut p = Param::new("filter", "", ParamType::String, "", true);
        p.set_min_value("b", &mut stack).unwrap();
        p.set_max_value("m", &mut stack).unwrap();

        // Between the bounds, even though it is above the minimum.
        assert!(p.set_user_value("g", &mut stack).is_ok());

        let err = p.set_user_value("z", &mut stack).unwrap_err();
        assert!(matches!(err, SchemaError::AboveMaximum { ref max, .. } if max == "m"));

        assert!(matches!(
            p.set_user_value("a", &mut stack).unwrap_err(),
            SchemaError::BelowMinimum { .. }
        ));
    }

    #[test]
    fn test_typed_getters_and_mismatch() {
        let mut stack = stack();
        let mut p = Param::new("gain", "", ParamType::String, "", true);
        p.set_user_value("2.5", &mut stack).unwrap();

        assert_eq!(p.user_value::<String>(&mut stack).unwrap(), "2.5");
        assert_eq!(p.user_value::<f64>(&mut stack).unwrap(), 2.5);

        let err = p.user_value::<bool>(&mut stack).unwrap_err();
        assert_eq!(
            err,
            SchemaError::TypeMismatch {
                param: "gain".to_string(),
                value: "2.5".to_string(),
                expected: ParamType::Logical,
            }
        );
    }

    #[test]
    fn test_help_golden_full_range_no_unit() {
        let mut stack = stack();
        let mut p = Param::new("port", "TCP port", ParamType::Integer, "", true);
        p.set_default_value("8791", &mut stack).unwrap();
        p.set_min_value("1", &mut stack).unwrap();
        p.set_max_value("65535", &mut stack).unwrap();

        assert_eq!(
            p.help(),
            "\t-port <integer> (default = '8791') (range from '1' to '65535')\n\t\tTCP port\n"
        );
    }

    #[test]
    fn test_help_single_bound_and_no_description() {
        let mut stack = stack();
        let mut p = Param::new("timeout", "", ParamType::Double, "s", true);
        p.set_min_value("0.1", &mut stack).unwrap();
        assert_eq!(
            p.help(),
            "\t-timeout <double> (unit = 's') (minimum value of '0.1')\n\t\tNo description\n"
        );

        let mut p = Param::new("retries", "", ParamType::Integer, "", true);
        p.set_max_value("5", &mut stack).unwrap();
        assert_eq!(
            p.help(),
            "\t-retries <integer> (maximum value of '5')\n\t\tNo description\n"
        );
    }
}
