use cg_domain::config::Config;

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn default_port_is_8080() {
    let config = Config::default();
    assert_eq!(config.server.port, 8080);
}

#[test]
fn explicit_host_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 8080
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
fn defaults_roundtrip_through_toml() {
    let config = Config::default();
    let serialized = toml::to_string(&config).unwrap();
    let parsed: Config = toml::from_str(&serialized).unwrap();
    assert_eq!(parsed.pool.pool_size, config.pool.pool_size);
    assert_eq!(parsed.bus.subscriber_buffer, config.bus.subscriber_buffer);
}
