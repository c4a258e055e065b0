use url::Url;
use std::fmt;

/// Key used to look up an image in the catalog. Equality and hashing are
/// plain value semantics over the three selections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstallSpec {
    platform: String,
    hypervisor: String,
    browser_os: String,
}

impl InstallSpec {
    pub fn new(
        platform: impl Into<String>,
        hypervisor: impl Into<String>,
        browser_os: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            hypervisor: hypervisor.into(),
            browser_os: browser_os.into(),
        }
    }

    /// Host platform
    /// eg. Windows, Mac, Linux
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Backend selector, passed to the pipeline as-is.
    pub fn hypervisor(&self) -> &str {
        &self.hypervisor
    }

    /// Browser and guest OS, eg. "MSEdge Win10"
    pub fn browser_os(&self) -> &str {
        &self.browser_os
    }
}

impl fmt::Display for InstallSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / {}",
            self.platform, self.hypervisor, self.browser_os
        )
    }
}

/// One downloadable archive plus the location of its published checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    file_url: String,
    checksum_source_url: String,
}

impl ImageDescriptor {
    pub fn new(file_url: impl Into<String>, checksum_source_url: impl Into<String>) -> Self {
        Self {
            file_url: file_url.into(),
            checksum_source_url: checksum_source_url.into(),
        }
    }

    pub fn file_url(&self) -> &str {
        &self.file_url
    }

    pub fn checksum_source_url(&self) -> &str {
        &self.checksum_source_url
    }

    /// Last non-empty path segment of the archive URL, used as the local
    /// file name. Query strings and fragments are ignored.
    pub fn file_name(&self) -> Option<String> {
        match Url::parse(&self.file_url) {
            Ok(url) => url
                .path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
                .map(str::to_string),
            Err(_) => self
                .file_url
                .rsplit('/')
                .find(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}
