// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! Server registration: ephemeral children keyed by network address.

use crate::session::Session;
use serde_json::Value;
use std::net::Ipv4Addr;
use tracing::info;
use zelkova_core::{acl, path, props, Acl, PropertyMap, TreeError};

/// A `host:port` pair. The host may be blank, in which case
/// registration expands it to every usable interface address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    fn format(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Conversions accepted by [`Session::register`]: `"host:port"` strings
/// (numeric port required) and `(host, port)` pairs.
pub trait IntoServerAddress {
    fn into_server_address(self) -> Result<ServerAddress, TreeError>;
}

impl IntoServerAddress for ServerAddress {
    fn into_server_address(self) -> Result<ServerAddress, TreeError> {
        Ok(self)
    }
}

impl IntoServerAddress for &str {
    fn into_server_address(self) -> Result<ServerAddress, TreeError> {
        let (host, port) = self
            .rsplit_once(':')
            .ok_or_else(|| TreeError::BadArguments(self.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| TreeError::BadArguments(self.to_string()))?;
        Ok(ServerAddress {
            host: host.to_string(),
            port,
        })
    }
}

impl IntoServerAddress for (&str, u16) {
    fn into_server_address(self) -> Result<ServerAddress, TreeError> {
        Ok(ServerAddress {
            host: self.0.to_string(),
            port: self.1,
        })
    }
}

/// Event handed to registration subscribers just before the ephemeral
/// node is written. Subscribers may augment the properties.
#[derive(Debug, Clone)]
pub struct RegisteringServer {
    /// The concrete `host:port` being registered.
    pub name: String,
    /// Resolved path the registration lands under.
    pub path: String,
    pub properties: PropertyMap,
}

impl Session {
    /// Subscribe to [`RegisteringServer`] events.
    pub fn on_register(
        &self,
        f: impl FnMut(&mut RegisteringServer) + Send + 'static,
    ) {
        self.core.register_hooks.lock().push(Box::new(f));
    }

    /// Register a server at `path`: one ephemeral child per concrete
    /// address, world-readable, carrying `properties` plus the process
    /// pid under `pid`.
    pub fn register(
        &self,
        path: &str,
        addr: impl IntoServerAddress,
        properties: PropertyMap,
    ) -> Result<(), TreeError> {
        self.register_with_acl(path, addr, &acl::read_acl_unsafe(), properties)
    }

    /// `register` under a caller-chosen ACL.
    pub fn register_with_acl(
        &self,
        path: &str,
        addr: impl IntoServerAddress,
        acls: &[Acl],
        mut properties: PropertyMap,
    ) -> Result<(), TreeError> {
        let addr = addr.into_server_address()?;
        let rpath = self.core.resolve(path)?;
        let names = if addr.host.is_empty() {
            expand_blank_host(addr.port)
        } else {
            vec![addr.format()]
        };
        properties.insert("pid".to_string(), Value::from(std::process::id()));

        for name in names {
            let mut event = RegisteringServer {
                name,
                path: rpath.clone(),
                properties: properties.clone(),
            };
            {
                let mut hooks = self.core.register_hooks.lock();
                for hook in hooks.iter_mut() {
                    hook(&mut event);
                }
            }
            let node_path = path::join(&rpath, &event.name);
            info!(path = %node_path, "registering server");
            self.core
                .create(&node_path, &props::encode(&event.properties), acls, true)?;
        }
        Ok(())
    }

    /// Alias for [`Session::register`].
    pub fn register_server(
        &self,
        path: &str,
        addr: impl IntoServerAddress,
        properties: PropertyMap,
    ) -> Result<(), TreeError> {
        self.register(path, addr, properties)
    }
}

/// Expand a blank host into one address per usable IPv4 interface:
/// non-loopback interfaces when any exist, loopback otherwise, and the
/// host name when enumeration is unavailable or empty.
fn expand_blank_host(port: u16) -> Vec<String> {
    let addrs: Vec<(Ipv4Addr, bool)> = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .iter()
            .filter_map(|iface| match &iface.addr {
                if_addrs::IfAddr::V4(v4) => Some((v4.ip, v4.ip.is_loopback())),
                _ => None,
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    let picked = pick_addresses(&addrs);
    if picked.is_empty() {
        return vec![format!("{}:{}", local_host_name(), port)];
    }
    picked.iter().map(|ip| format!("{ip}:{port}")).collect()
}

/// Prefer non-loopback addresses; fall back to loopback.
fn pick_addresses(addrs: &[(Ipv4Addr, bool)]) -> Vec<Ipv4Addr> {
    let non_loopback: Vec<Ipv4Addr> = addrs
        .iter()
        .filter(|(_, loopback)| !loopback)
        .map(|(ip, _)| *ip)
        .collect();
    if !non_loopback.is_empty() {
        return non_loopback;
    }
    addrs.iter().map(|(ip, _)| *ip).collect()
}

fn local_host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
#[path = "register_tests.rs"]
mod tests;
