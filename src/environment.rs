use std::env;
use std::str::FromStr;

/// Retrieves an environment variable and parses it, falling back to a default
/// when the variable is unset or fails to parse.
///
/// # Arguments
/// - `var`: The name of the environment variable.
/// - `default`: The value to use when the variable is unset or unparsable.
pub fn get_env_parsed<T: FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_fallback() {
        assert_eq!(get_env_parsed("SIBYL_DOES_NOT_EXIST", 42usize), 42);
        assert_eq!(get_env_parsed("SIBYL_DOES_NOT_EXIST", 0.9f32), 0.9);
    }

    #[test]
    fn test_parsed_from_env() {
        env::set_var("SIBYL_TEST_PARSE_VAR", "7");
        assert_eq!(get_env_parsed("SIBYL_TEST_PARSE_VAR", 0usize), 7);
        env::remove_var("SIBYL_TEST_PARSE_VAR");
    }
}
