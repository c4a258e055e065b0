//! Image catalog: the published list of VM archives keyed by
//! platform / hypervisor / browser, and the checksum helpers shared with the
//! download pipeline.

mod checksum;
mod feed;
mod image;

pub use checksum::{ChecksumKind, HexCase, RunningHash};
pub use feed::Feed;
pub use image::{ImageDescriptor, InstallSpec};

use regex::Regex;
use reqwest::Client;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::{debug, info};

fn embedded_json_regex() -> &'static Regex {
    static VMS_RE: OnceLock<Regex> = OnceLock::new();
    VMS_RE.get_or_init(|| {
        Regex::new(r"(?s)vms = (.*?);").expect("invalid embedded catalog regex")
    })
}

/// ---- Errors ----
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("failed to GET catalog page '{url}': {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} for catalog page '{url}'")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("catalog page does not embed a `vms = ...;` document")]
    JsonNotFound,
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Download the catalog page as text.
pub async fn fetch_catalog_page(
    client: &Client,
    url: &str,
    user_agent: &str,
) -> Result<String, CatalogError> {
    info!(%url, "downloading catalog page");

    let res = client
        .get(url)
        .header("User-Agent", user_agent)
        .send()
        .await
        .map_err(|source| CatalogError::Network {
            url: url.to_string(),
            source,
        })?;

    let status = res.status();
    if !status.is_success() {
        return Err(CatalogError::HttpStatus {
            url: url.to_string(),
            status,
        });
    }

    res.text().await.map_err(|source| CatalogError::Network {
        url: url.to_string(),
        source,
    })
}

/// The page is HTML with the catalog assigned to a script variable; pull
/// out the JSON literal.
pub fn extract_catalog_json(page: &str) -> Result<&str, CatalogError> {
    embedded_json_regex()
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or(CatalogError::JsonNotFound)
}

/// Parsed catalog with the choice lists the wizard walks through.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    platforms: Vec<String>,
    hypervisors: BTreeMap<String, Vec<String>>,
    browsers: BTreeMap<String, Vec<String>>,
    images: HashMap<InstallSpec, ImageDescriptor>,
}

impl Catalog {
    /// Build the catalog from the embedded JSON. Software entries named in
    /// `skip` (eg. Vagrant, which is not a hypervisor) are ignored, and files
    /// without a checksum location are never offered.
    pub fn from_json(json: &str, skip: &[String]) -> Result<Self, CatalogError> {
        let feed: Feed = serde_json::from_str(json)?;
        Ok(Self::from_feed(feed, skip))
    }

    pub fn from_feed(feed: Feed, skip: &[String]) -> Self {
        let mut catalog = Catalog::default();

        for software in feed.software_list {
            let hypervisor = software.software_name;
            if skip.iter().any(|s| s == &hypervisor) {
                debug!(%hypervisor, "skipping software entry");
                continue;
            }

            let mut offered = Vec::new();
            for vm in &software.vms {
                let browser_os = vm.browser_os();
                for file in &vm.files {
                    let Some(checksum_url) = file.md5.as_deref().filter(|s| !s.is_empty()) else {
                        debug!(%hypervisor, %browser_os, url = %file.url, "no checksum location, not offered");
                        continue;
                    };
                    let descriptor = ImageDescriptor::new(file.url.clone(), checksum_url);
                    for platform in &software.os_list {
                        catalog.images.insert(
                            InstallSpec::new(platform.clone(), hypervisor.clone(), browser_os.clone()),
                            descriptor.clone(),
                        );
                    }
                    if !offered.contains(&browser_os) {
                        offered.push(browser_os.clone());
                    }
                }
            }

            // A hypervisor with nothing installable is not a choice.
            if offered.is_empty() || software.os_list.is_empty() {
                continue;
            }
            for platform in &software.os_list {
                if !catalog.platforms.contains(platform) {
                    catalog.platforms.push(platform.clone());
                }
                catalog
                    .hypervisors
                    .entry(platform.clone())
                    .or_default()
                    .push(hypervisor.clone());
            }
            catalog
                .browsers
                .entry(hypervisor)
                .or_default()
                .extend(offered);
        }

        catalog
    }

    /// Sorted list of host platforms.
    pub fn platforms(&self) -> Vec<String> {
        sorted(&self.platforms)
    }

    /// Sorted hypervisors available for `platform`.
    pub fn hypervisors(&self, platform: &str) -> Vec<String> {
        self.hypervisors.get(platform).map(|v| sorted(v)).unwrap_or_default()
    }

    /// Sorted browser/OS labels published for `hypervisor`.
    pub fn browsers(&self, hypervisor: &str) -> Vec<String> {
        self.browsers.get(hypervisor).map(|v| sorted(v)).unwrap_or_default()
    }

    pub fn resolve(&self, spec: &InstallSpec) -> Option<&ImageDescriptor> {
        self.images.get(spec)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.images.len()
    }
}

fn sorted(items: &[String]) -> Vec<String> {
    let mut out = items.to_vec();
    out.sort();
    out.dedup();
    out
}
