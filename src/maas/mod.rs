//! MAAS REST adapter
//!
//! Implements [`MachineGateway`] against the MAAS 2.0 REST API using
//! form-encoded requests signed with the caller's API key.

pub mod auth;

pub use auth::ApiKey;

use crate::domain::ports::{
    BlockDevice, DeployRequest, Domain, Interface, LinkRequest, Machine, MachineGateway,
    PowerParameters, Subnet, VolumeGroup,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the MAAS client
#[derive(Debug, Clone)]
pub struct MaasConfig {
    /// MAAS base URL, e.g. `http://maas:5240/MAAS/`
    pub url: String,
    /// API key `consumer_key:token_key:token_secret`
    pub api_key: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for MaasConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5240/MAAS/".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl MaasConfig {
    /// Base URL with exactly one trailing slash
    pub fn base_url(&self) -> String {
        format!("{}/", self.url.trim().trim_end_matches('/'))
    }
}

// =============================================================================
// MAAS Client
// =============================================================================

/// Authenticated session against one MAAS region
#[derive(Debug)]
pub struct MaasClient {
    base_url: String,
    api_key: ApiKey,
    http: reqwest::Client,
}

impl MaasClient {
    /// Build a session and verify that the server answers with these credentials
    pub async fn connect(config: MaasConfig) -> Result<Self> {
        let base_url = config.base_url();
        if config.url.trim().is_empty() {
            return Err(Error::Connection {
                url: base_url,
                reason: "no MAAS URL given (set --maas-url or MAAS_URL)".into(),
            });
        }

        let api_key = ApiKey::parse(&config.api_key).map_err(|e| match e {
            Error::Connection { reason, .. } => Error::Connection {
                url: base_url.clone(),
                reason,
            },
            other => other,
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Connection {
                url: base_url.clone(),
                reason: e.to_string(),
            })?;

        let client = Self {
            base_url,
            api_key,
            http,
        };
        client.probe().await?;

        info!(url = %client.base_url, "Connected to MAAS");
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn probe(&self) -> Result<()> {
        let connection_error = |reason: String| Error::Connection {
            url: self.base_url.clone(),
            reason,
        };

        let response = self
            .request(Method::GET, "api/2.0/version/")
            .send()
            .await
            .map_err(|e| connection_error(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(connection_error("API key not authorised".into()))
            }
            s => Err(connection_error(format!("unexpected HTTP {} from version probe", s))),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "MAAS request");
        self.http
            .request(method, url)
            .header(header::ACCEPT, "application/json")
            .header(header::AUTHORIZATION, self.api_key.authorization_header())
    }

    /// Send and turn non-2xx answers into errors
    async fn send(&self, builder: RequestBuilder, operation: &str) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Connection {
                url: self.base_url.clone(),
                reason: format!("API key not authorised for {}", operation),
            }),
            _ => Err(Error::Remote {
                operation: operation.to_string(),
                status: status.as_u16(),
                body,
            }),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, operation: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path), operation).await?;
        decode(response, operation).await
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, String)],
        operation: &str,
    ) -> Result<Response> {
        self.send(self.request(Method::POST, path).form(form), operation)
            .await
    }

    async fn delete(&self, path: &str, operation: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, path), operation)
            .await?;
        Ok(())
    }
}

/// Parse a successful answer; a body that does not match is not a transport problem
async fn decode<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T> {
    response.json::<T>().await.map_err(|e| {
        if e.is_decode() {
            Error::Internal(format!("Unexpected MAAS answer to {}: {}", operation, e))
        } else {
            Error::Http(e)
        }
    })
}

fn machine_path(system_id: &str) -> String {
    format!("api/2.0/machines/{}/", system_id)
}

fn node_path(system_id: &str, rest: &str) -> String {
    format!("api/2.0/nodes/{}/{}", system_id, rest)
}

fn not_found_as(kind: &str, name: &str) -> impl FnOnce(Error) -> Error {
    let kind = kind.to_string();
    let name = name.to_string();
    move |e| match e {
        Error::Remote { status: 404, .. } => Error::NotFound { kind, name },
        other => other,
    }
}

#[async_trait]
impl MachineGateway for MaasClient {
    async fn get_machine(&self, system_id: &str) -> Result<Machine> {
        self.get_json(&machine_path(system_id), "get machine")
            .await
            .map_err(not_found_as("machine", system_id))
    }

    async fn list_machines(&self, hostname: Option<&str>) -> Result<Vec<Machine>> {
        let mut builder = self.request(Method::GET, "api/2.0/machines/");
        if let Some(hostname) = hostname {
            builder = builder.query(&[("hostname", hostname)]);
        }
        let response = self.send(builder, "list machines").await?;
        decode(response, "list machines").await
    }

    async fn power_parameters(&self, system_id: &str) -> Result<PowerParameters> {
        let path = format!("{}?op=power_parameters", machine_path(system_id));
        self.get_json(&path, "power parameters")
            .await
            .map_err(not_found_as("machine", system_id))
    }

    async fn commission(&self, system_id: &str, scripts: &[String]) -> Result<()> {
        let path = format!("{}?op=commission", machine_path(system_id));
        let mut form = Vec::new();
        if !scripts.is_empty() {
            form.push(("commissioning_scripts", scripts.join(",")));
        }
        self.post_form(&path, &form, "commission").await?;
        Ok(())
    }

    async fn release(&self, system_id: &str) -> Result<()> {
        let path = format!("{}?op=release", machine_path(system_id));
        self.post_form(&path, &[], "release").await?;
        Ok(())
    }

    async fn deploy(&self, system_id: &str, request: &DeployRequest) -> Result<()> {
        let path = format!("{}?op=deploy", machine_path(system_id));
        let mut form = Vec::new();
        if let Some(distro) = &request.distro_series {
            form.push(("distro_series", distro.clone()));
        }
        if let Some(user_data) = &request.user_data {
            form.push(("user_data", user_data.clone()));
        }
        self.post_form(&path, &form, "deploy").await?;
        Ok(())
    }

    async fn abort(&self, system_id: &str) -> Result<()> {
        let path = format!("{}?op=abort", machine_path(system_id));
        self.post_form(&path, &[], "abort").await?;
        Ok(())
    }

    async fn update_identity(
        &self,
        system_id: &str,
        hostname: Option<&str>,
        domain_id: Option<i64>,
    ) -> Result<Machine> {
        let mut form = Vec::new();
        if let Some(hostname) = hostname {
            form.push(("hostname", hostname.to_string()));
        }
        if let Some(domain_id) = domain_id {
            form.push(("domain", domain_id.to_string()));
        }
        let builder = self
            .request(Method::PUT, &machine_path(system_id))
            .form(&form);
        let response = self.send(builder, "update machine").await?;
        decode(response, "update machine").await
    }

    async fn list_domains(&self) -> Result<Vec<Domain>> {
        self.get_json("api/2.0/domains/", "list domains").await
    }

    async fn list_volume_groups(&self, system_id: &str) -> Result<Vec<VolumeGroup>> {
        self.get_json(&node_path(system_id, "volume-groups/"), "list volume groups")
            .await
    }

    async fn delete_volume_group(&self, system_id: &str, volume_group_id: i64) -> Result<()> {
        let path = node_path(system_id, &format!("volume-group/{}/", volume_group_id));
        self.delete(&path, "delete volume group").await
    }

    async fn list_block_devices(&self, system_id: &str) -> Result<Vec<BlockDevice>> {
        self.get_json(&node_path(system_id, "blockdevices/"), "list block devices")
            .await
    }

    async fn delete_block_device(&self, system_id: &str, device_id: i64) -> Result<()> {
        let path = node_path(system_id, &format!("blockdevices/{}/", device_id));
        self.delete(&path, "delete block device").await
    }

    async fn delete_partition(
        &self,
        system_id: &str,
        device_id: i64,
        partition_id: i64,
    ) -> Result<()> {
        let path = node_path(
            system_id,
            &format!("blockdevices/{}/partition/{}", device_id, partition_id),
        );
        self.delete(&path, "delete partition").await
    }

    async fn set_boot_disk(&self, system_id: &str, device_id: i64) -> Result<()> {
        let path = node_path(
            system_id,
            &format!("blockdevices/{}/?op=set_boot_disk", device_id),
        );
        self.post_form(&path, &[], "set boot disk").await?;
        Ok(())
    }

    async fn set_storage_layout(&self, system_id: &str, layout: &str) -> Result<()> {
        let path = format!("{}?op=set_storage_layout", machine_path(system_id));
        let form = [("storage_layout", layout.to_string())];
        let response = self.post_form(&path, &form, "set storage layout").await?;

        // Only a plain 200 counts as the layout being applied
        if response.status() != StatusCode::OK {
            return Err(Error::Remote {
                operation: "set storage layout".into(),
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn list_interfaces(&self, system_id: &str) -> Result<Vec<Interface>> {
        self.get_json(&node_path(system_id, "interfaces/"), "list interfaces")
            .await
    }

    async fn delete_interface(&self, system_id: &str, interface_id: i64) -> Result<()> {
        let path = node_path(system_id, &format!("interfaces/{}/", interface_id));
        self.delete(&path, "delete interface").await
    }

    async fn disconnect_interface(&self, system_id: &str, interface_id: i64) -> Result<()> {
        let path = node_path(
            system_id,
            &format!("interfaces/{}/?op=disconnect", interface_id),
        );
        self.post_form(&path, &[], "disconnect interface").await?;
        Ok(())
    }

    async fn create_vlan_interface(
        &self,
        system_id: &str,
        parent_id: i64,
        vlan_id: i64,
    ) -> Result<Interface> {
        let path = node_path(system_id, "interfaces/?op=create_vlan");
        let form = [("parent", parent_id.to_string()), ("vlan", vlan_id.to_string())];
        let response = self.post_form(&path, &form, "create vlan interface").await?;
        decode(response, "create vlan interface").await
    }

    async fn link_subnet(
        &self,
        system_id: &str,
        interface_id: i64,
        link: &LinkRequest,
    ) -> Result<()> {
        let path = node_path(
            system_id,
            &format!("interfaces/{}/?op=link_subnet", interface_id),
        );
        let mut form = vec![("mode", link.mode.as_str().to_string())];
        if let Some(subnet_id) = link.subnet_id {
            form.push(("subnet", subnet_id.to_string()));
        }
        if let Some(ip) = &link.ip_address {
            form.push(("ip_address", ip.clone()));
        }
        if link.force {
            form.push(("force", "true".to_string()));
        }
        self.post_form(&path, &form, "link subnet").await?;
        Ok(())
    }

    async fn subnet_by_cidr(&self, cidr: &str) -> Result<Subnet> {
        let subnets: Vec<Subnet> = self.get_json("api/2.0/subnets/", "list subnets").await?;
        subnets
            .into_iter()
            .find(|s| s.cidr == cidr)
            .ok_or_else(|| Error::not_found("subnet", cidr))
    }
}
