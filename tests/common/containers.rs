// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for Redis.
//!
//! Provides helpers to spin up a Redis broker for integration tests.

use netevents::config::{NetEventsConfig, RedisConfig};
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

/// Create a vanilla Redis container.
///
/// Uses official redis:7 image. Waits for "Ready to accept connections".
pub fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

/// Redis container that requires `password`.
pub fn redis_container_with_password<'a>(docker: &'a Cli, password: &str) -> Container<'a, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    // The image entrypoint hands flag-only args to redis-server
    let args = vec!["--requirepass".to_string(), password.to_string()];
    docker.run((image, args))
}

/// Get the Redis URL for a container.
pub fn redis_url(container: &Container<'_, GenericImage>) -> String {
    let port = container.get_host_port_ipv4(6379);
    format!("redis://127.0.0.1:{}", port)
}

/// Test config pointed at a container's mapped port.
pub fn redis_config(container: &Container<'_, GenericImage>, server_name: &str) -> NetEventsConfig {
    let mut config = NetEventsConfig::for_testing();
    config.redis = RedisConfig {
        host: "127.0.0.1".to_string(),
        port: container.get_host_port_ipv4(6379),
        password: None,
        client_name: Some(server_name.to_string()),
    };
    config
}
