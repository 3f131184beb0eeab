//! Load a settings object from the config locations.

use std::{env, error::Error, fmt::Debug, path::Path, path::PathBuf};

use config::{Config, Environment, File};
use eyre::{eyre, Context};
use serde::de::DeserializeOwned;

use ortege_core::config::*;

/// Directory whose JSON files are always loaded.
pub const DEFAULT_CONFIG_DIR: &str = "./config";

/// Deserialize a settings object from the configs.
///
/// Sources, later ones overriding earlier ones:
/// 1. every `*.json` file in `./config`, in file name order
/// 2. the comma separated files in `CONFIG_FILES`
/// 3. environment variables prefixed with `ORT_`, nested keys separated by
///    `__`, e.g. `ORT_CHAINS__ETHEREUM__RPC_URL`
pub fn load_settings<T, R>() -> ConfigResult<R>
where
    T: DeserializeOwned + Debug,
    R: FromRawConf<T>,
{
    let config_file_paths: Vec<PathBuf> = env::var("CONFIG_FILES")
        .map(|s| s.split(',').map(PathBuf::from).collect())
        .unwrap_or_default();
    load_settings_from(Path::new(DEFAULT_CONFIG_DIR), &config_file_paths, ENV_PREFIX)
}

/// Same as `load_settings` with explicit sources.
pub fn load_settings_from<T, R>(
    config_dir: &Path,
    config_file_paths: &[PathBuf],
    env_prefix: &str,
) -> ConfigResult<R>
where
    T: DeserializeOwned + Debug,
    R: FromRawConf<T>,
{
    let root_path = ConfigPath::default();

    let mut base_config_sources = vec![];
    let mut builder = Config::builder();

    if config_dir.is_dir() {
        let mut entries = config_dir
            .read_dir()
            .context("Failed to open config directory")
            .into_config_result(|| root_path.clone())?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list config directory")
            .into_config_result(|| root_path.clone())?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let entry_path = entry.path();
            if !entry_path.is_file() {
                continue;
            }
            if entry_path.extension() == Some("json".as_ref()) {
                base_config_sources.push(format!("{:?}", entry_path));
                builder = builder.add_source(File::from(entry_path));
            }
        }
    }

    for p in config_file_paths {
        if p.is_file() {
            if p.extension() == Some("json".as_ref()) {
                builder = builder.add_source(File::from(p.clone()));
            } else {
                return Err(eyre!(
                    "Provided config path via CONFIG_FILES is of an unsupported type ({p:?})"
                ))
                .into_config_result(|| root_path.clone());
            }
        } else if !p.exists() {
            return Err(eyre!(
                "Provided config path via CONFIG_FILES does not exist ({p:?})"
            ))
            .into_config_result(|| root_path.clone());
        } else {
            return Err(eyre!(
                "Provided config path via CONFIG_FILES is not a file ({p:?})"
            ))
            .into_config_result(|| root_path.clone());
        }
    }

    let config_deserializer = builder
        .add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to load config sources")
        .into_config_result(|| root_path.clone())?;

    let formatted_config = format!("{config_deserializer:#?}");

    let raw_config = Config::try_deserialize::<T>(config_deserializer)
        .or_else(|err| {
            let mut err = if let Some(source_err) = err.source() {
                let source = format!("Config error source: {source_err}");
                Err(err).context(source)
            } else {
                Err(err.into())
            };

            for cfg_path in base_config_sources
                .iter()
                .cloned()
                .chain(config_file_paths.iter().map(|p| format!("{p:?}")))
            {
                err = err.with_context(|| format!("Config loaded: {cfg_path}"));
            }
            eprintln!("Loaded config for debugging: {formatted_config}");
            err.context("Config deserialization error")
        })
        .into_config_result(|| root_path.clone())?;

    let res = raw_config.parse_config(&root_path);
    if res.is_err() {
        eprintln!("Loaded config for debugging: {formatted_config}");
    }
    res
}

#[cfg(test)]
mod test {
    use std::fs;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct RawExample {
        name: Option<String>,
        poll_interval_ms: Option<u64>,
    }

    #[derive(Debug)]
    struct Example {
        name: String,
        poll_interval_ms: u64,
    }

    impl FromRawConf<RawExample> for Example {
        fn from_config(raw: RawExample, cwp: &ConfigPath) -> ConfigResult<Self> {
            let mut err = ConfigParsingError::default();
            let name = raw
                .name
                .ok_or_else(|| eyre!("Missing `name`"))
                .take_err(&mut err, || cwp + "name");
            let poll_interval_ms = raw
                .poll_interval_ms
                .ok_or_else(|| eyre!("Missing `poll_interval_ms`"))
                .take_err(&mut err, || cwp + "poll_interval_ms");
            err.into_result()?;
            Ok(Self {
                name: name.unwrap_or_default(),
                poll_interval_ms: poll_interval_ms.unwrap_or_default(),
            })
        }
    }

    #[test]
    fn later_files_override_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a_base.json"),
            r#"{ "name": "base", "poll_interval_ms": 6000 }"#,
        )
        .unwrap();
        fs::write(dir.path().join("ignored.txt"), "not json").unwrap();

        let override_file = dir.path().join("override.json");
        fs::write(&override_file, r#"{ "poll_interval_ms": 1000 }"#).unwrap();

        let settings: Example = load_settings_from::<RawExample, _>(
            dir.path(),
            &[override_file],
            "ORT_LOADER_TEST_UNSET",
        )
        .unwrap();
        assert_eq!(settings.name, "base");
        assert_eq!(settings.poll_interval_ms, 1000);
    }

    #[test]
    fn missing_extra_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_settings_from::<RawExample, Example>(
            dir.path(),
            &[dir.path().join("missing.json")],
            "ORT_LOADER_TEST_UNSET",
        );
        assert!(result.is_err());
    }

    #[test]
    fn every_missing_field_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings_from::<RawExample, Example>(
            dir.path(),
            &[],
            "ORT_LOADER_TEST_UNSET",
        )
        .unwrap_err();
        let paths: Vec<_> = err.paths().map(ConfigPath::json_name).collect();
        assert_eq!(paths, vec!["name", "pollIntervalMs"]);
    }
}
