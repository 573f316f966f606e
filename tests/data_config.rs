use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use reid_data::config::DataConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "REID_DATA_CONFIG",
        "REID_DATA_ROOT",
        "REID_DATA_DATASET",
        "REID_DATA_VAL_SPLIT",
        "REID_DATA_DEL_LABELS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DataConfig::load().expect("load defaults");
    assert_eq!(cfg.root, PathBuf::from("data"));
    assert_eq!(cfg.dataset, "personx");
    assert_eq!(cfg.val_split, 0.2);
    assert!(!cfg.del_labels);
    assert!(cfg.verbose);
    assert!(cfg.sort);
    assert!(cfg.download.sha256.is_none());
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let sha = "ab".repeat(32);
    let json = format!(
        r#"{{
            "root": "/srv/reid",
            "dataset": "PersonX",
            "val_split": 0.3,
            "verbose": false,
            "download": {{
                "sha256": "{}"
            }}
        }}"#,
        sha
    );
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("REID_DATA_CONFIG", file.path());
    std::env::set_var("REID_DATA_VAL_SPLIT", "0.25");
    std::env::set_var("REID_DATA_DEL_LABELS", "yes");

    let cfg = DataConfig::load().expect("load config");

    assert_eq!(cfg.root, PathBuf::from("/srv/reid"));
    assert_eq!(cfg.dataset, "personx");
    assert_eq!(cfg.val_split, 0.25);
    assert!(cfg.del_labels);
    assert!(!cfg.verbose);
    assert!(cfg.sort);
    assert_eq!(cfg.download.sha256.as_deref(), Some(sha.as_str()));

    let options = cfg.dataset_options();
    assert_eq!(options.val_split, 0.25);
    assert!(options.del_labels);
    assert!(options.pseudo_labels.is_none());

    clear_env();
}

#[test]
fn quiet_options_only_turn_off_the_summary() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("REID_DATA_DEL_LABELS", "1");

    let cfg = DataConfig::load().expect("load config");
    clear_env();
    assert!(cfg.verbose);
    assert!(cfg.dataset_options().verbose);

    let quiet = cfg.quiet_dataset_options();
    assert!(!quiet.verbose);
    assert!(quiet.del_labels);
    assert_eq!(quiet.val_split, cfg.val_split);
    assert_eq!(quiet.sort, cfg.sort);
}

#[test]
fn rejects_out_of_range_val_split() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("REID_DATA_VAL_SPLIT", "1.0");
    assert!(DataConfig::load().is_err());
    std::env::set_var("REID_DATA_VAL_SPLIT", "abc");
    assert!(DataConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_unknown_dataset() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("REID_DATA_DATASET", "market1501");
    let err = DataConfig::load().unwrap_err();
    assert!(err.to_string().contains("unknown dataset"));

    clear_env();
}
