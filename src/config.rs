//! Network shape and training-loop settings.
//!
//! [`Config::default`] is a 3-input `[4, 4, 1]` network trained for 100 steps.
//! [`from_env`] overrides any field from `MICRODIFF_*` environment variables.

use crate::error::{Error, Result};

const ENV_PREFIX: &str = "MICRODIFF_";

const ENV_SEED: &str = "SEED";
const ENV_INPUT_SIZE: &str = "INPUT_SIZE";
const ENV_LAYER_SIZES: &str = "LAYER_SIZES";
const ENV_LEARNING_RATE: &str = "LEARNING_RATE";
const ENV_NUM_STEPS: &str = "NUM_STEPS";
const ENV_LOG_EVERY: &str = "LOG_EVERY";

const DEFAULT_SEED: u64 = 42;
const DEFAULT_INPUT_SIZE: usize = 3;
const DEFAULT_LAYER_SIZES: [usize; 3] = [4, 4, 1];
const DEFAULT_LEARNING_RATE: f64 = 0.1;
const DEFAULT_NUM_STEPS: usize = 100;
const DEFAULT_LOG_EVERY: usize = 10;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Seed for parameter initialisation.
    pub seed: u64,
    /// Values fed to the first layer.
    pub input_size: usize,
    /// Neurons per layer, input side first.
    pub layer_sizes: Vec<usize>,
    /// Step size for `value -= learning_rate * grad`.
    pub learning_rate: f64,
    pub num_steps: usize,
    /// Log the loss every this many steps; 0 disables.
    pub log_every: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            input_size: DEFAULT_INPUT_SIZE,
            layer_sizes: DEFAULT_LAYER_SIZES.to_vec(),
            learning_rate: DEFAULT_LEARNING_RATE,
            num_steps: DEFAULT_NUM_STEPS,
            log_every: DEFAULT_LOG_EVERY,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(Error::Config("input_size must be greater than 0".to_string()));
        }
        if self.layer_sizes.is_empty() {
            return Err(Error::Config("layer_sizes must not be empty".to_string()));
        }
        if self.layer_sizes.contains(&0) {
            return Err(Error::Config(format!(
                "layer_sizes must all be greater than 0, got {:?}",
                self.layer_sizes
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::Config(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }

    /// Width of the last layer.
    pub fn output_size(&self) -> usize {
        self.layer_sizes.last().copied().unwrap_or(0)
    }
}

/// Full environment variable name for a key suffix, e.g. `SEED` → `MICRODIFF_SEED`.
pub fn env_key(suffix: &str) -> String {
    format!("{ENV_PREFIX}{suffix}")
}

fn env_string(key: &str) -> Result<Option<String>> {
    match std::env::var(key) {
        Ok(s) => Ok(Some(s)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(Error::EnvVar {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| Error::Parse {
        key: key.to_string(),
        value: raw.to_string(),
        message: e.to_string(),
    })
}

fn env_parsed<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_string(key)?
        .map(|raw| parse_value(key, &raw))
        .transpose()
}

/// Comma separated sizes, e.g. `4,4,1`.
fn env_sizes(key: &str) -> Result<Option<Vec<usize>>> {
    env_string(key)?
        .map(|raw| {
            raw.split(',')
                .map(|part| parse_value(key, part))
                .collect::<Result<Vec<usize>>>()
        })
        .transpose()
}

/// Builds a [`Config`] from the environment, using defaults for unset variables.
///
/// Fails if a set variable does not parse. The result is not validated.
pub fn from_env() -> Result<Config> {
    let default = Config::default();

    let seed = env_parsed(&env_key(ENV_SEED))?.unwrap_or(default.seed);
    let input_size = env_parsed(&env_key(ENV_INPUT_SIZE))?.unwrap_or(default.input_size);
    let layer_sizes = env_sizes(&env_key(ENV_LAYER_SIZES))?.unwrap_or(default.layer_sizes);
    let learning_rate =
        env_parsed(&env_key(ENV_LEARNING_RATE))?.unwrap_or(default.learning_rate);
    let num_steps = env_parsed(&env_key(ENV_NUM_STEPS))?.unwrap_or(default.num_steps);
    let log_every = env_parsed(&env_key(ENV_LOG_EVERY))?.unwrap_or(default.log_every);

    Ok(Config {
        seed,
        input_size,
        layer_sizes,
        learning_rate,
        num_steps,
        log_every,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // env tests must not interleave
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output_size(), 1);
    }

    #[test]
    fn validate_rejects_bad_shapes() {
        let empty = Config {
            layer_sizes: vec![],
            ..Config::default()
        };
        assert!(matches!(empty.validate(), Err(Error::Config(_))));

        let zero_width = Config {
            layer_sizes: vec![4, 0, 1],
            ..Config::default()
        };
        assert!(zero_width.validate().is_err());

        let no_inputs = Config {
            input_size: 0,
            ..Config::default()
        };
        assert!(no_inputs.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_learning_rate() {
        for learning_rate in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            let config = Config {
                learning_rate,
                ..Config::default()
            };
            assert!(config.validate().is_err(), "accepted {learning_rate}");
        }
    }

    #[test]
    fn from_env_falls_back_to_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        for suffix in [ENV_SEED, ENV_LAYER_SIZES, ENV_LEARNING_RATE] {
            std::env::remove_var(env_key(suffix));
        }
        let config = from_env().unwrap();
        assert_eq!(config.seed, DEFAULT_SEED);
        assert_eq!(config.layer_sizes, DEFAULT_LAYER_SIZES.to_vec());
    }

    #[test]
    fn from_env_overrides_with_env_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(env_key(ENV_LAYER_SIZES), "8, 2");
        std::env::set_var(env_key(ENV_LEARNING_RATE), "0.05");
        let config = from_env().unwrap();
        assert_eq!(config.layer_sizes, vec![8, 2]);
        assert_eq!(config.learning_rate, 0.05);
        std::env::remove_var(env_key(ENV_LAYER_SIZES));
        std::env::remove_var(env_key(ENV_LEARNING_RATE));
    }

    #[test]
    fn from_env_reports_parse_errors() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(env_key(ENV_SEED), "not_a_number");
        let err = from_env().unwrap_err();
        std::env::remove_var(env_key(ENV_SEED));
        assert!(matches!(err, Error::Parse { ref key, .. } if key == "MICRODIFF_SEED"));
    }
}
