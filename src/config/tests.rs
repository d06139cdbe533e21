use super::*;
use std::collections::HashMap;
use tempfile::TempDir;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults() {
    let config = DispatchConfig::default();

    assert!(config.scratch_dir.ends_with(".nfmap/scratch"));
    assert_eq!(config.work_dir(), config.scratch_dir.join("work"));
    assert_eq!(config.scheduler_program, "nextflow");
    assert_eq!(config.interpreter, "python3");
    assert_eq!(config.pool_weights.weight("bigmem"), 3);
    assert_eq!(config.pool_weights.weight("ycga_bigmem"), 1);
    assert_eq!(config.pool_weights.weight("scavenge"), 2);
    assert_eq!(config.serialize_concurrency, 16);
    assert_eq!(config.preserve_in_work_dir, vec!["conda".to_string()]);
    assert!(!config.keep_job_dirs);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_yaml_keeps_defaults() {
    let yaml = r#"
scratch_dir: /shared/scratch
pool_weights:
  day: 2
  week: 1
"#;
    let config = DispatchConfig::from_yaml(yaml).unwrap();

    assert_eq!(config.scratch_dir, PathBuf::from("/shared/scratch"));
    assert_eq!(config.work_dir(), PathBuf::from("/shared/scratch/work"));
    assert_eq!(config.pool_weights.weight("day"), 2);
    assert_eq!(config.pool_weights.weight("bigmem"), 0);
    assert_eq!(config.scheduler_program, "nextflow");
}

#[test]
fn test_empty_yaml_is_default() {
    assert_eq!(
        DispatchConfig::from_yaml("  \n").unwrap(),
        DispatchConfig::default()
    );
}

#[test]
fn test_unknown_field_is_rejected() {
    assert!(DispatchConfig::from_yaml("scrach_dir: /tmp\n").is_err());
}

#[test]
fn test_env_overrides() {
    let mut config = DispatchConfig::default();
    config.merge_from(lookup(&[
        (SCRATCH_DIR_ENV, "/gpfs/scratch"),
        (WORK_DIR_ENV, "/gpfs/work"),
        (ENV_FILE_ENV, "/home/me/env.yml"),
        (SCHEDULER_ENV, "/opt/nextflow"),
    ]));

    assert_eq!(config.scratch_dir, PathBuf::from("/gpfs/scratch"));
    assert_eq!(config.work_dir(), PathBuf::from("/gpfs/work"));
    assert_eq!(
        config.environment_file,
        Some(PathBuf::from("/home/me/env.yml"))
    );
    assert_eq!(config.scheduler_program, "/opt/nextflow");
}

#[test]
fn test_empty_env_values_are_ignored() {
    let mut config = DispatchConfig::default().with_scratch_dir("/keep");
    config.merge_from(lookup(&[(SCRATCH_DIR_ENV, ""), (SCHEDULER_ENV, "  ")]));

    assert_eq!(config.scratch_dir, PathBuf::from("/keep"));
    assert_eq!(config.scheduler_program, "nextflow");
}

#[test]
fn test_from_file_errors() {
    let dir = TempDir::new().unwrap();

    let missing = DispatchConfig::from_file(&dir.path().join("absent.yml"));
    assert!(matches!(missing, Err(ConfigError::Read { .. })));

    let bad = dir.path().join("bad.yml");
    std::fs::write(&bad, "serialize_concurrency: [1, 2]\n").unwrap();
    assert!(matches!(
        DispatchConfig::from_file(&bad),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_validate_rejects_zero_concurrency() {
    let config = DispatchConfig {
        serialize_concurrency: 0,
        ..DispatchConfig::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_validate_rejects_zero_pool_weight() {
    let yaml = "pool_weights:\n  bigmem: 0\n  scavenge: 2\n";
    let config = DispatchConfig::from_yaml(yaml).unwrap();
    match config.validate() {
        Err(ConfigError::Invalid(message)) => assert!(message.contains("bigmem"), "{message}"),
        other => panic!("expected Invalid, got {other:?}"),
    }

    let dir = TempDir::new().unwrap();
    let file = dir.path().join("nfmap.yml");
    std::fs::write(&file, "pool_weights:\n  gpu: 0\n").unwrap();
    assert!(matches!(
        DispatchConfig::load(Some(file.as_path())),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_helper_program_override() {
    let config = DispatchConfig {
        helper_program: Some(PathBuf::from("/usr/local/bin/nfmap")),
        ..DispatchConfig::default()
    };
    assert_eq!(
        config.helper_program().unwrap(),
        PathBuf::from("/usr/local/bin/nfmap")
    );
}
