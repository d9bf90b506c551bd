//! The shipped config file must load and point at sensible defaults.

use std::path::Path;

use askdb::config::{Overrides, load_from};

#[test]
fn default_config_loads() {
    let config = load_from(Path::new("config/default.toml"), &Overrides::default()).unwrap();
    assert_eq!(config.app_name, "askdb");
    assert!(config.database.read_only);
    assert_eq!(config.llm.provider, "openai");
    assert_eq!(config.llm.openai.model, "codegemma:latest");
    assert_eq!(config.embeddings.openai.model, "llama3");
    assert_eq!(config.agent.top_k, 5);
    assert_eq!(config.lookup.sources.len(), 2);
    assert!(config.checkpoint.enabled);
    assert!(config.lookup_index_path().starts_with(&config.work_dir));
}

#[test]
fn env_style_overrides_apply() {
    let overrides = Overrides {
        work_dir: Some("/tmp/askdb-test".into()),
        log_level: Some("trace".into()),
        database_uri: Some("sqlite:////tmp/other.db".into()),
    };
    let config = load_from(Path::new("config/default.toml"), &overrides).unwrap();
    assert_eq!(config.work_dir, Path::new("/tmp/askdb-test"));
    assert_eq!(config.log_level, "trace");
    assert_eq!(config.database.uri, "sqlite:////tmp/other.db");
    assert_eq!(config.checkpoint_dir(), Path::new("/tmp/askdb-test/checkpoints"));
}
