//! Tests for environment configuration
//!
//! Parsing is tested on injected values; the environment itself is shared by
//! every test thread and is only read here.

use super::*;
use std::net::Ipv4Addr;

#[test]
fn test_health_check_port_parsing() {
    assert_eq!(parse_health_check_port(None), DEFAULT_HEALTH_CHECK_PORT);
    assert_eq!(parse_health_check_port(Some("9090")), 9090);
    assert_eq!(parse_health_check_port(Some(" 9090\n")), 9090);
    assert_eq!(
        parse_health_check_port(Some("not-a-port")),
        DEFAULT_HEALTH_CHECK_PORT,
        "Invalid port should fall back to default"
    );
    assert_eq!(
        parse_health_check_port(Some("70000")),
        DEFAULT_HEALTH_CHECK_PORT,
        "Out of range port should fall back to default"
    );
}

#[test]
fn test_ipc_dir_parsing() {
    assert_eq!(parse_ipc_dir(None), std::env::temp_dir());
    assert_eq!(
        parse_ipc_dir(Some(OsString::new())),
        std::env::temp_dir(),
        "Empty dir means unset"
    );
    assert_eq!(
        parse_ipc_dir(Some(OsString::from("/mnt/deputy-ipc"))),
        PathBuf::from("/mnt/deputy-ipc")
    );
}

#[test]
fn test_from_env_matches_current_environment() {
    let expected = parse_health_check_port(std::env::var(HEALTH_CHECK_PORT_ENV).ok().as_deref());

    let config = HealthServerConfig::from_env();

    assert_eq!(config.port, expected);
    assert_eq!(config.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
}

#[test]
fn test_health_server_config_builders() {
    let config = HealthServerConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 8081,
    }
    .with_host(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    .with_port(0);

    assert_eq!(config.socket_addr(), "0.0.0.0:0".parse::<SocketAddr>().unwrap());
}

#[test]
fn test_timeout_constants_are_ordered() {
    // The terminator callback usually wraps the deputy shutdown handler
    assert!(DEFAULT_SHUTDOWN_HANDLER_TIMEOUT < DEFAULT_TERMINATOR_TIMEOUT);
}
