// crates/datatrust-config/src/env_subst.rs
// ============================================================================
// Module: Environment Substitution
// Description: Expand ${NAME} and ${NAME:-default} in configuration strings.
// Purpose: Keep secrets out of configuration files.
// Dependencies: toml
// ============================================================================

//! ## Overview
//! Substitution runs over every string value of the parsed document before
//! deserialization. `${NAME}` expands to the environment variable's value
//! and fails fast when it is unset; `${NAME:-default}` falls back to the
//! literal default. `$${` escapes a literal `${`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::ConfigError;

// ============================================================================
// SECTION: Substitution
// ============================================================================

/// Expands substitutions in every string value of a TOML document.
///
/// # Errors
///
/// Returns [`ConfigError::MissingEnvVar`] for `${NAME}` references whose
/// variable is unset and [`ConfigError::Invalid`] for unterminated
/// references.
pub fn substitute_document(value: &mut toml::Value) -> Result<(), ConfigError> {
    match value {
        toml::Value::String(text) => {
            *text = substitute_string(text)?;
            Ok(())
        }
        toml::Value::Array(items) => {
            for item in items {
                substitute_document(item)?;
            }
            Ok(())
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                substitute_document(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Expands substitutions in one string.
///
/// # Errors
///
/// Returns [`ConfigError`] for missing variables or unterminated references.
pub fn substitute_string(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    while let Some((index, ch)) = chars.next() {
        if ch == '$' {
            match chars.peek() {
                Some((_, '$')) => {
                    chars.next();
                    output.push('$');
                    continue;
                }
                Some((_, '{')) => {
                    chars.next();
                    let start = index;
                    let mut reference = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        reference.push(inner);
                    }
                    if !closed {
                        return Err(ConfigError::Invalid(format!(
                            "unterminated substitution starting at byte {start}"
                        )));
                    }
                    output.push_str(&resolve(&reference)?);
                    continue;
                }
                _ => {}
            }
        }
        output.push(ch);
    }
    Ok(output)
}

/// Resolves one `NAME` or `NAME:-default` reference.
fn resolve(reference: &str) -> Result<String, ConfigError> {
    let (name, default) = reference
        .split_once(":-")
        .map_or((reference, None), |(name, default)| (name, Some(default)));
    if name.is_empty() {
        return Err(ConfigError::Invalid("empty environment variable reference".to_string()));
    }
    match std::env::var(name) {
        Ok(value) => Ok(value),
        Err(_) => default.map(str::to_string).ok_or_else(|| ConfigError::MissingEnvVar {
            name: name.to_string(),
        }),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use super::substitute_string;
    use crate::ConfigError;

    #[test]
    fn expands_set_variables_and_defaults() {
        // PATH is present in every supported environment.
        let path = std::env::var("PATH").unwrap();
        assert_eq!(substitute_string("${PATH}").unwrap(), path);
        assert_eq!(
            substitute_string("${DATATRUST_TEST_SUBST_MISSING:-fallback}").unwrap(),
            "fallback"
        );
        assert_eq!(
            substitute_string("prefix-${PATH}-suffix").unwrap(),
            format!("prefix-{path}-suffix")
        );
    }

    #[test]
    fn missing_variable_fails_fast() {
        let err = substitute_string("${DATATRUST_TEST_SUBST_ABSENT}").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar { .. }));
    }

    #[test]
    fn dollar_dollar_escapes_literal_braces() {
        assert_eq!(substitute_string("$${NOT_A_VAR}").unwrap(), "${NOT_A_VAR}");
        assert_eq!(substitute_string("price $5").unwrap(), "price $5");
    }

    #[test]
    fn unterminated_reference_is_invalid() {
        assert!(substitute_string("${OOPS").is_err());
    }
}
