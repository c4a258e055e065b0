use serde::Deserialize;

/// Top-level document embedded in the catalog page. Bookkeeping fields the
/// publisher adds (`_ts`, `_etag`, ...) are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    #[serde(default)]
    pub(crate) software_list: Vec<Software>,
}

/// One hypervisor and the images published for it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Software {
    pub(crate) software_name: String,
    #[serde(default)]
    pub(crate) os_list: Vec<String>,
    #[serde(default)]
    pub(crate) vms: Vec<Vm>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vm {
    pub(crate) browser_name: String,
    pub(crate) os_version: String,
    #[serde(default)]
    pub(crate) files: Vec<VmFile>,
}

#[derive(Debug, Deserialize)]
pub struct VmFile {
    #[serde(default)]
    #[allow(unused)]
    pub(crate) name: Option<String>,
    pub(crate) url: String,
    // The publisher stores a URL to a file holding the checksum here, not
    // the checksum itself.
    #[serde(default)]
    pub(crate) md5: Option<String>,
}

impl Vm {
    /// Label shown to the user and used as the third key component.
    pub fn browser_os(&self) -> String {
        format!("{} {}", self.browser_name, self.os_version)
    }
}
