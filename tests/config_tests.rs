//! Tests for YAML service configuration loading.

use restgate::ServiceConfig;
use std::io::Write;

#[test]
fn test_config_loads_from_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "title: File API\ndescription: from disk\nroot_url: http://api.test\napi_key: sekrit\n"
    )
    .unwrap();

    let config = ServiceConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.title, "File API");
    assert_eq!(config.description, "from disk");
    assert_eq!(config.root_url, "http://api.test");
    assert_eq!(config.api_key.as_deref(), Some("sekrit"));
    // Unspecified fields keep their defaults.
    assert!(config.jsonp_enabled);
}

#[test]
fn test_missing_config_file_is_an_error() {
    let err = ServiceConfig::from_yaml_file("/nonexistent/config.yaml").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/config.yaml"));
}

#[test]
fn test_invalid_yaml_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "title: [unclosed").unwrap();
    assert!(ServiceConfig::from_yaml_file(file.path()).is_err());
}
