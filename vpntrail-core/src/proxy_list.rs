//! ZenMate proxy reference table
//!
//! ZenMate logs only record a country code. The vendor's published node list
//! maps each country to the host names and addresses it served, which lets an
//! examiner resolve a `Proxy` value to concrete endpoints. The dataset is a
//! JSON array of regions, each with a list of nodes:
//!
//! ```json
//! [{ "nodes": [{ "countrycode": "US", "dnsname": "us-1.zenguard.biz", "serverLookup": "1.2.3.4" }] }]
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default file name of the reference dataset.
pub const DEFAULT_FILE_NAME: &str = "zenmate_proxy_list.json";

/// One row of the `proxy_list` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyNode {
    /// 1-based position across all regions
    pub id: i64,
    pub country_code: String,
    pub hostname: String,
    pub ip: String,
}

#[derive(Debug, Deserialize)]
struct Region {
    #[serde(default)]
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(default)]
    countrycode: String,
    #[serde(default)]
    dnsname: String,
    #[serde(default, rename = "serverLookup")]
    server_lookup: String,
}

/// Parse the reference dataset from a JSON string.
pub fn parse_str(json: &str) -> Result<Vec<ProxyNode>> {
    let regions: Vec<Region> = serde_json::from_str(json)?;

    let nodes = regions
        .into_iter()
        .flat_map(|region| region.nodes)
        .enumerate()
        .map(|(i, node)| ProxyNode {
            id: i as i64 + 1,
            country_code: node.countrycode,
            hostname: node.dnsname,
            ip: node.server_lookup,
        })
        .collect();
    Ok(nodes)
}

/// Load the reference dataset from disk.
pub fn load(path: &Path) -> Result<Vec<ProxyNode>> {
    let content = std::fs::read_to_string(path)?;
    let nodes = parse_str(&content)?;
    tracing::debug!(path = %path.display(), nodes = nodes.len(), "Proxy list loaded");
    Ok(nodes)
}
