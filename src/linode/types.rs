//! Wire types for the Linode API v4.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Status the provider reports once an instance has booted.
pub const STATUS_RUNNING: &str = "running";

/// Body of `POST /linode/instances`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CreateInstanceRequest {
    /// Region id (for example `us-east`).
    pub region: String,
    /// Instance type id (for example `g6-nanode-1`).
    #[serde(rename = "type")]
    pub instance_type: String,
    /// Image id (for example `linode/ubuntu22.04`).
    pub image: String,
    /// Unique label for the instance.
    pub label: String,
    /// Tags applied to the instance.
    pub tags: Vec<String>,
    /// Kernel id, when one was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    /// StackScript to deploy with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stackscript_id: Option<u64>,
    /// User-defined fields passed to the StackScript.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stackscript_data: Option<BTreeMap<String, String>>,
    /// Swap size in MB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_size: Option<u32>,
    /// Whether to allocate a private IPv4 address.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub private_ip: bool,
    /// Root password for the instance.
    pub root_pass: String,
    /// Public keys authorised for root.
    pub authorized_keys: Vec<String>,
    /// Account users whose keys are authorised for root.
    pub authorized_users: Vec<String>,
}

/// Instance record returned by the provider.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Instance {
    /// Provider-assigned numeric id.
    pub id: u64,
    /// Label actually stored by the provider.
    pub label: String,
    /// Lifecycle status (`provisioning`, `booting`, `running`, ...).
    #[serde(default)]
    pub status: String,
    /// Public and private IPv4 addresses, public first.
    #[serde(default)]
    pub ipv4: Vec<String>,
    /// Tags attached to the instance.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Instance {
    /// First IPv4 address, if one was assigned.
    #[must_use]
    pub fn first_ipv4(&self) -> Option<&str> {
        self.ipv4.first().map(String::as_str)
    }

    /// Returns `true` once the instance has booted.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == STATUS_RUNNING
    }

    /// Returns `true` when the instance carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }
}

/// Paginated list envelope.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Page<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// One-based page number.
    pub page: u32,
    /// Total number of pages.
    pub pages: u32,
    /// Total number of results across all pages.
    #[serde(default)]
    pub results: u32,
}

/// Entry of a lookup catalogue (regions, types, images, kernels).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct CatalogueEntry {
    /// Concrete provider id.
    pub id: String,
    /// Human readable label.
    #[serde(default)]
    pub label: String,
}

impl CatalogueEntry {
    /// Matches either the id or, ignoring case, the label.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.id == name || self.label.eq_ignore_ascii_case(name)
    }
}

/// Catalogues a provision spec is resolved against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CatalogueKind {
    /// `GET /regions`.
    Region,
    /// `GET /linode/types`.
    Type,
    /// `GET /images`.
    Image,
    /// `GET /linode/kernels`.
    Kernel,
}

impl CatalogueKind {
    /// API path of the catalogue, relative to the base URL.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Region => "regions",
            Self::Type => "linode/types",
            Self::Image => "images",
            Self::Kernel => "linode/kernels",
        }
    }

    /// Name of the provision field resolved against this catalogue.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Type => "type",
            Self::Image => "image",
            Self::Kernel => "kernel",
        }
    }
}
