use super::*;
use serial_test::serial;
use std::env;
use std::net::IpAddr;

fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    for (key, value) in vars {
        unsafe { env::set_var(key, value) };
    }

    let result = f();

    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    for (key, _) in vars {
        unsafe { env::remove_var(key) };
    }

    result
}

fn clear_cacheway_env() {
    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    unsafe {
        env::remove_var("CACHEWAY_PORT");
        env::remove_var("CACHEWAY_BIND_ADDR");
        env::remove_var("SEMANTIC_CACHE_THRESHOLD");
        env::remove_var("CACHEWAY_DETERMINISTIC_CACHE_CAPACITY");
        env::remove_var("CACHEWAY_PROVIDER_BASE_URL");
        env::remove_var("CACHEWAY_MOCK_PROVIDER");
    }
}

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.port, 8080);
    assert_eq!(
        config.bind_addr,
        IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))
    );
    assert!((0.50..=0.99).contains(&config.semantic_cache_threshold));
    assert!(!config.mock_provider);
}

#[test]
fn test_socket_addr() {
    let config = Config::default();
    assert_eq!(config.socket_addr(), "127.0.0.1:8080");

    let config = Config {
        port: 3000,
        bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        ..Default::default()
    };
    assert_eq!(config.socket_addr(), "0.0.0.0:3000");
}

#[test]
#[serial]
fn test_from_env_with_defaults() {
    clear_cacheway_env();

    let config = Config::from_env().expect("should parse with defaults");

    assert_eq!(config.port, 8080);
}

#[test]
#[serial]
fn test_from_env_custom_port() {
    clear_cacheway_env();

    with_env_vars(&[("CACHEWAY_PORT", "3000")], || {
        let config = Config::from_env().expect("should parse");
        assert_eq!(config.port, 3000);
    });
}

#[test]
#[serial]
fn test_from_env_custom_threshold() {
    clear_cacheway_env();

    with_env_vars(&[("SEMANTIC_CACHE_THRESHOLD", "0.92")], || {
        let config = Config::from_env().expect("should parse");
        assert!((config.semantic_cache_threshold - 0.92).abs() < 1e-6);
    });
}

#[test]
#[serial]
fn test_from_env_threshold_out_of_range() {
    clear_cacheway_env();

    with_env_vars(&[("SEMANTIC_CACHE_THRESHOLD", "0.10")], || {
        let result = Config::from_env();
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidThreshold { .. }
        ));
    });
}

#[test]
#[serial]
fn test_invalid_port_zero() {
    clear_cacheway_env();

    with_env_vars(&[("CACHEWAY_PORT", "0")], || {
        let result = Config::from_env();
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidPort { .. }
        ));
    });
}

#[test]
#[serial]
fn test_invalid_port_not_number() {
    clear_cacheway_env();

    with_env_vars(&[("CACHEWAY_PORT", "not_a_port")], || {
        let result = Config::from_env();
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::PortParseError { .. }
        ));
    });
}

#[test]
#[serial]
fn test_invalid_bind_addr() {
    clear_cacheway_env();

    with_env_vars(&[("CACHEWAY_BIND_ADDR", "not.an.ip.address")], || {
        let result = Config::from_env();
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidBindAddr { .. }
        ));
    });
}

#[test]
fn test_validate_rejects_non_http_provider_url() {
    let config = Config {
        provider_base_url: "ftp://example.com".to_string(),
        ..Default::default()
    };

    let result = config.validate();
    assert!(result.is_err());
    assert!(matches!(
        result.unwrap_err(),
        ConfigError::InvalidProviderUrl { .. }
    ));
}

#[test]
fn test_validate_success_with_defaults() {
    let config = Config::default();
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_from_env_mock_provider_flag() {
    clear_cacheway_env();

    with_env_vars(&[("CACHEWAY_MOCK_PROVIDER", "true")], || {
        let config = Config::from_env().expect("should parse");
        assert!(config.mock_provider);
    });
}
