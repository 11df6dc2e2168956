//! Secret values of the helm chart.
//!
//! Encryption itself is an external service behind [`SecretManager`]. This
//! module decides whether secrets are present and decodes secret values files
//! read through the giterminism [`FileReader`], so they obey the same commit
//! policy as the rest of the config.

use anyhow::{Context, Result, bail};
use serde_yaml::{Mapping, Value};
use tracing::info;

use crate::giterminism::FileReader;

/// Directory of secret files inside the chart.
pub const SECRET_DIR_NAME: &str = "secret";

/// Secret values file picked up from the chart by default.
pub const DEFAULT_SECRET_VALUES_FILE_NAME: &str = "secret-values.yaml";

/// Decrypts and encrypts YAML documents with secret values.
pub trait SecretManager: Send + Sync {
    fn decrypt_yaml_data(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn encrypt_yaml_data(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Used when no key is available or decryption is disabled: every scalar
/// becomes an empty string, keeping the structure of the values.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreKeySecretManager;

fn blank_scalars(value: Value) -> Value {
    match value {
        Value::Mapping(mapping) => {
            Value::Mapping(mapping.into_iter().map(|(key, value)| (key, blank_scalars(value))).collect())
        }
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(blank_scalars).collect()),
        Value::Tagged(mut tagged) => {
            tagged.value = blank_scalars(tagged.value);
            Value::Tagged(tagged)
        }
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => Value::String(String::new()),
    }
}

impl SecretManager for IgnoreKeySecretManager {
    fn decrypt_yaml_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let value: Value = serde_yaml::from_slice(data).context("secret data is not valid YAML")?;
        let blanked = serde_yaml::to_string(&blank_scalars(value))?;
        Ok(blanked.into_bytes())
    }

    fn encrypt_yaml_data(&self, _data: &[u8]) -> Result<Vec<u8>> {
        bail!("cannot encrypt secret data: the secret key is not available")
    }
}

fn chart_path(chart_dir: &str, name: &str) -> String {
    match chart_dir.trim_end_matches('/') {
        "" | "." => name.to_string(),
        dir => format!("{dir}/{name}"),
    }
}

/// Whether the chart has a `secret` directory or a `secret-values.yaml`, or
/// extra secret values files were given.
pub fn secrets_exist(reader: &FileReader, chart_dir: &str, values_files: &[String]) -> Result<bool> {
    if !values_files.is_empty() {
        return Ok(true);
    }

    let secret_dir = chart_path(chart_dir, SECRET_DIR_NAME);
    if reader
        .is_helm_directory_exist(&secret_dir)
        .with_context(|| format!("unable to check existence of the directory '{secret_dir}'"))?
    {
        return Ok(true);
    }

    let values_file = chart_path(chart_dir, DEFAULT_SECRET_VALUES_FILE_NAME);
    reader
        .is_helm_file_exist(&values_file)
        .with_context(|| format!("unable to check existence of the file '{values_file}'"))
}

/// Picks the manager for a chart: `keyed` when secrets exist and decryption
/// is enabled, [`IgnoreKeySecretManager`] otherwise.
pub fn secret_manager_for<F>(
    reader: &FileReader,
    chart_dir: &str,
    values_files: &[String],
    ignore_secret_key: bool,
    keyed: F,
) -> Result<Box<dyn SecretManager>>
where
    F: FnOnce() -> Result<Box<dyn SecretManager>>,
{
    if !secrets_exist(reader, chart_dir, values_files)? {
        return Ok(Box::new(IgnoreKeySecretManager));
    }
    if ignore_secret_key {
        info!("Secrets decryption disabled");
        return Ok(Box::new(IgnoreKeySecretManager));
    }
    keyed()
}

/// Reads a secret values file through the resolver and decrypts it.
pub fn decode_secret_values_file(
    reader: &FileReader,
    rel_path: &str,
    manager: &dyn SecretManager,
) -> Result<Mapping> {
    let data = reader.read_helm_file(rel_path)?;
    let decoded = manager
        .decrypt_yaml_data(&data)
        .with_context(|| format!("cannot decode file '{rel_path}' secret data"))?;

    let values: Option<Mapping> = serde_yaml::from_slice(&decoded)
        .with_context(|| format!("cannot unmarshal secret values file '{rel_path}'"))?;
    Ok(values.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::giterminism::{GiterminismError, GiterminismManager, GiterminismOptions};
    use crate::test_utils::{MemoryGitRepo, TestProject};
    use std::sync::Arc;

    /// Reverses every string value, enough to tell decrypted data apart.
    struct ReversingManager;

    impl SecretManager for ReversingManager {
        fn decrypt_yaml_data(&self, data: &[u8]) -> Result<Vec<u8>> {
            let mut mapping: Mapping = serde_yaml::from_slice(data)?;
            for (_, value) in mapping.iter_mut() {
                if let Value::String(s) = value {
                    *s = s.chars().rev().collect();
                }
            }
            Ok(serde_yaml::to_string(&mapping)?.into_bytes())
        }

        fn encrypt_yaml_data(&self, data: &[u8]) -> Result<Vec<u8>> {
            self.decrypt_yaml_data(data)
        }
    }

    fn strict_reader(project: &TestProject, repo: MemoryGitRepo) -> FileReader {
        let manager =
            GiterminismManager::new(project.path(), Some(Arc::new(repo)), &GiterminismOptions::default())
                .unwrap();
        FileReader::new(Arc::new(manager))
    }

    #[test]
    fn test_ignore_key_manager_blanks_scalars() {
        let out = IgnoreKeySecretManager
            .decrypt_yaml_data(b"password: s3cr3t\nnested:\n  port: 5432\n  list: [a, true]\nempty: null\n")
            .unwrap();
        let value: Value = serde_yaml::from_slice(&out).unwrap();
        assert_eq!(value["password"], Value::String(String::new()));
        assert_eq!(value["nested"]["port"], Value::String(String::new()));
        assert_eq!(value["nested"]["list"][1], Value::String(String::new()));
        assert_eq!(value["empty"], Value::Null);
        assert!(IgnoreKeySecretManager.encrypt_yaml_data(b"a: b").is_err());
    }

    #[test]
    fn test_secrets_exist_in_working_tree() {
        let project = TestProject::new().unwrap();
        let reader = project.reader(true).unwrap();
        assert!(!secrets_exist(&reader, ".helm", &[]).unwrap());
        assert!(secrets_exist(&reader, ".helm", &["extra.yaml".to_string()]).unwrap());

        project.write(".helm/secret/tls.crt", "cert").unwrap();
        assert!(secrets_exist(&reader, ".helm", &[]).unwrap());
    }

    #[test]
    fn test_secrets_exist_in_commit() {
        let project = TestProject::new().unwrap();
        let repo = MemoryGitRepo::new().with_file(".helm/secret-values.yaml", "a: b\n");
        let reader = strict_reader(&project, repo);
        assert!(secrets_exist(&reader, ".helm", &[]).unwrap());
    }

    #[test]
    fn test_secret_manager_selection() {
        let project = TestProject::new().unwrap();
        project.write(".helm/secret-values.yaml", "a: b\n").unwrap();
        let reader = project.reader(true).unwrap();

        let manager = secret_manager_for(&reader, ".helm", &[], false, || {
            Ok(Box::new(ReversingManager) as Box<dyn SecretManager>)
        })
        .unwrap();
        let decoded = decode_secret_values_file(&reader, ".helm/secret-values.yaml", manager.as_ref()).unwrap();
        assert_eq!(decoded.get("a"), Some(&Value::String("b".chars().rev().collect())));

        let manager = secret_manager_for(&reader, ".helm", &[], true, || panic!("key must not be loaded")).unwrap();
        let decoded = decode_secret_values_file(&reader, ".helm/secret-values.yaml", manager.as_ref()).unwrap();
        assert_eq!(decoded.get("a"), Some(&Value::String(String::new())));
    }

    #[test]
    fn test_decode_from_commit_detects_local_changes() {
        let project = TestProject::new().unwrap();
        project.write(".helm/secret-values.yaml", "token: abc\n").unwrap();
        let repo = MemoryGitRepo::new().with_file(".helm/secret-values.yaml", "token: cba\n");
        let reader = strict_reader(&project, repo);

        let err = decode_secret_values_file(&reader, ".helm/secret-values.yaml", &ReversingManager).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GiterminismError>(),
            Some(GiterminismError::UncommittedChanges { .. })
        ));

        project.write(".helm/secret-values.yaml", "token: cba\n").unwrap();
        let decoded = decode_secret_values_file(&reader, ".helm/secret-values.yaml", &ReversingManager).unwrap();
        assert_eq!(decoded.get("token"), Some(&Value::String("abc".to_string())));
    }
}
