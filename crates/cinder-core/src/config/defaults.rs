//! Default configuration values

/// Default plan file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "cinder.yaml";

/// Default plan file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "cinder.toml";

/// Alternative plan file name
pub const ALT_CONFIG_FILE: &str = ".cinder.yaml";

/// Get list of plan file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_YAML,
        DEFAULT_CONFIG_TOML,
        ALT_CONFIG_FILE,
        ".cinder.toml",
    ]
}

/// Starter plan written by `cinder init`
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Cinder plan
# Targets run in dependency order; unchanged targets are skipped.

scheduler:
  concurrency: 1
  keep_going: true

cache:
  enabled: true
  dir: .cinder/cache

targets:
  - name: raw_data
    command:
      kind: read
      path: data/churn.csv
    reads: [data/churn.csv]

  - name: prepare
    command:
      kind: shell
      run: printf '%s' "$CINDER_DEP_RAW_DATA" | wc -c
    depends_on: [raw_data]

  - name: summary
    command:
      kind: collect
    depends_on: [prepare]
"#;

/// Starter plan in TOML form
pub const DEFAULT_CONFIG_TEMPLATE_TOML: &str = r#"# Cinder plan
# Targets run in dependency order; unchanged targets are skipped.

[scheduler]
concurrency = 1
keep_going = true

[cache]
enabled = true
dir = ".cinder/cache"

[[targets]]
name = "raw_data"
reads = ["data/churn.csv"]
[targets.command]
kind = "read"
path = "data/churn.csv"

[[targets]]
name = "prepare"
depends_on = ["raw_data"]
[targets.command]
kind = "shell"
run = "echo preparing"

[[targets]]
name = "summary"
depends_on = ["prepare"]
[targets.command]
kind = "collect"
"#;
