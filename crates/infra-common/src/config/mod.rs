//! Layered configuration loading.
//!
//! A file (format picked from its extension) is read first, then
//! environment variables named `<PREFIX>__<FIELD>` override it. Nested
//! fields use `__` as separator, e.g. `MGCP__PORT_RANGE__MIN`.

use crate::errors::types::{Error, Result};
use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Load a configuration value from `path`, overlaid with `env_prefix` variables.
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>, env_prefix: &str) -> Result<T> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::Config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let settings = Config::builder()
        .add_source(File::from(path))
        .add_source(Environment::with_prefix(env_prefix).separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        limit: u32,
    }

    #[test]
    #[serial]
    fn loads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "name = \"gateway\"\nlimit = 7").unwrap();

        let sample: Sample = load_config(file.path(), "INFRA_TEST_A").unwrap();
        assert_eq!(sample.name, "gateway");
        assert_eq!(sample.limit, 7);
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "name = \"gateway\"\nlimit = 7").unwrap();

        // SAFETY: serialized with the other env-touching tests
        unsafe { std::env::set_var("INFRA_TEST_B__LIMIT", "42") };
        let sample: Result<Sample> = load_config(file.path(), "INFRA_TEST_B");
        unsafe { std::env::remove_var("INFRA_TEST_B__LIMIT") };

        assert_eq!(sample.unwrap().limit, 42);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load_config::<Sample>("/nonexistent/mgcp.toml", "X").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
