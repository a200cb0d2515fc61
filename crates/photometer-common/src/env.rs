//! `${VAR}` / `${VAR:-default}` substitution for configuration documents.

use crate::error::{ReaderError, ReaderResult};

/// Expand environment references in a configuration document.
///
/// A reference without a default must resolve, otherwise the whole document
/// is rejected. Nested braces inside a default are kept verbatim.
pub fn expand_env_vars(content: &str) -> ReaderResult<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();

        let mut expr = String::new();
        let mut depth = 1;
        while depth > 0 {
            match chars.next() {
                Some('{') => {
                    depth += 1;
                    expr.push('{');
                }
                Some('}') => {
                    depth -= 1;
                    if depth > 0 {
                        expr.push('}');
                    }
                }
                Some(c) => expr.push(c),
                None => {
                    return Err(ReaderError::Config(format!(
                        "Unclosed variable substitution: ${{{}",
                        expr
                    )))
                }
            }
        }

        result.push_str(&resolve(&expr)?);
    }

    Ok(result)
}

fn resolve(expr: &str) -> ReaderResult<String> {
    match expr.split_once(":-") {
        Some((name, default)) => match std::env::var(name.trim()) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Ok(default.to_string()),
        },
        None => std::env::var(expr.trim())
            .map_err(|_| ReaderError::Config(format!("Environment variable {} not set", expr))),
    }
}
