//! Acquisition → verification → extraction → installation.
//!
//! Every stage is safe to repeat: an archive that is already on disk is
//! verified instead of downloaded, and files that were already extracted
//! are kept. A failed run is therefore resumed by running it again once the
//! reported cause is fixed.

pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod oracle;
pub mod progress;
pub mod stream;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::backends::{BackendKind, BackendSession, CommandRunner, SystemRunner};
use crate::catalog::{ImageDescriptor, InstallSpec};
use crate::settings::Settings;

pub use error::{ErrorKind, PipelineError, Stage, StageFailure};
pub use extractor::{ArchiveExtractor, ExtractionResult};
pub use fetcher::{LocalArchive, StreamingFetcher};
pub use oracle::{ChecksumOracle, FixedOracle, HttpOracle};
pub use progress::{BarProgress, LogProgress, ProgressObserver};

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub backend: BackendKind,
    pub archive: LocalArchive,
    pub extraction: ExtractionResult,
    /// The file handed to the hypervisor, after any conversion.
    pub vm_path: PathBuf,
    pub manual_steps: Vec<String>,
}

pub struct Pipeline {
    oracle: Arc<dyn ChecksumOracle>,
    fetcher: StreamingFetcher,
    runner: Arc<dyn CommandRunner>,
}

impl Pipeline {
    /// HTTP oracle and fetcher sharing one client, real process runner.
    pub fn new(settings: &Settings) -> Self {
        let client = Client::new();
        Self {
            oracle: Arc::new(HttpOracle::new(client.clone(), settings.user_agent())),
            fetcher: StreamingFetcher::new(client, settings),
            runner: Arc::new(SystemRunner),
        }
    }

    pub fn with_parts(
        oracle: Arc<dyn ChecksumOracle>,
        fetcher: StreamingFetcher,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            oracle,
            fetcher,
            runner,
        }
    }

    /// `<download_dir>/<last segment of the archive URL>`.
    pub fn archive_path(
        download_dir: &Path,
        descriptor: &ImageDescriptor,
    ) -> Result<PathBuf, PipelineError> {
        let name = descriptor.file_name().ok_or_else(|| {
            PipelineError::archive_format(
                format!("no file name in '{}'", descriptor.file_url()),
                download_dir,
            )
        })?;
        Ok(download_dir.join(name))
    }

    pub async fn run(
        &self,
        spec: &InstallSpec,
        descriptor: &ImageDescriptor,
        download_dir: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> Result<InstallReport, StageFailure> {
        let at = |stage: Stage| move |cause: PipelineError| StageFailure::new(stage, cause);

        // Unknown hypervisors stop here, before anything touches the disk.
        let session = BackendSession::for_hypervisor(spec.hypervisor(), self.runner.clone())
            .map_err(at(Stage::Resolve))?;
        let archive_path = Self::archive_path(download_dir, descriptor).map_err(at(Stage::Resolve))?;
        ArchiveExtractor::destination_for(&archive_path).map_err(at(Stage::Resolve))?;
        info!(spec = %spec, url = descriptor.file_url(), path = %archive_path.display(), "resolved");

        let expected = self
            .oracle
            .expected_checksum(descriptor.checksum_source_url())
            .await
            .map_err(at(Stage::Checksum))?;

        let archive = self
            .fetcher
            .fetch(descriptor.file_url(), &archive_path, &expected, observer)
            .await
            .map_err(at(Stage::Fetch))?;

        let extractor = ArchiveExtractor::new(session.kind());
        let to_extract = archive.clone();
        let extraction = tokio::task::spawn_blocking(move || extractor.extract(&to_extract))
            .await
            .map_err(|e| PipelineError::filesystem(io::Error::other(e), archive.path()))
            .and_then(|r| r)
            .map_err(at(Stage::Extract))?;

        let backend = session.kind();
        let manual_steps = session.manual_steps();
        let entry_point = extraction.entry_point().to_path_buf();
        let vm_path = tokio::task::spawn_blocking(move || install(session, &entry_point))
            .await
            .map_err(|e| {
                StageFailure::new(
                    Stage::Import,
                    PipelineError::import_failed(backend, format!("backend task failed: {e}")),
                )
            })??;

        Ok(InstallReport {
            backend,
            manual_steps,
            archive,
            extraction,
            vm_path,
        })
    }
}

/// check → prepare → import; the tools are synchronous processes.
fn install(mut session: BackendSession, entry_point: &Path) -> Result<PathBuf, StageFailure> {
    let at = |stage: Stage| move |cause: PipelineError| StageFailure::new(stage, cause);
    session.check().map_err(at(Stage::Check))?;
    session.prepare(entry_point).map_err(at(Stage::Prepare))?;
    session.import().map_err(at(Stage::Import))
}

#[cfg(test)]
mod tests {
    use super::{FixedOracle, Pipeline, Stage, StreamingFetcher};
    use crate::backends::runner::CommandOutput;
    use crate::backends::runner::tests::FakeRunner;
    use crate::catalog::{ChecksumKind, HexCase, ImageDescriptor, InstallSpec};
    use crate::pipeline::error::ErrorKind;
    use crate::pipeline::extractor::tests::build_zip;
    use crate::pipeline::progress::tests::RecordingProgress;
    use crate::settings::Settings;
    use crate::test_support::TestHttpServer;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    fn md5_upper(bytes: &[u8]) -> String {
        let mut h = ChecksumKind::Md5.hasher();
        h.update(bytes);
        h.finalize_hex(HexCase::Upper)
    }

    fn vbox_zip(dir: &Path) -> Vec<u8> {
        let path = dir.join("fixture.zip");
        build_zip(
            &path,
            &[
                ("IE11 - Win7.ova", Some(b"appliance".as_slice())),
                ("readme.txt", Some(b"hello".as_slice())),
            ],
        );
        std::fs::read(path).unwrap()
    }

    fn pipeline(oracle: FixedOracle, runner: Arc<FakeRunner>) -> Pipeline {
        let fetcher = StreamingFetcher::new(reqwest::Client::new(), &Settings::default());
        Pipeline::with_parts(Arc::new(oracle), fetcher, runner)
    }

    fn vbox_runner() -> Arc<FakeRunner> {
        Arc::new(FakeRunner::new().answer("vboxmanage", CommandOutput::ok("7.0.14\n")))
    }

    #[test]
    fn archive_path_uses_url_basename() {
        let d = ImageDescriptor::new("https://h/vms/IE11.Win7.VirtualBox.zip", "https://h/md5");
        assert_eq!(
            Pipeline::archive_path(Path::new("/home/u/Downloads"), &d).unwrap(),
            PathBuf::from("/home/u/Downloads/IE11.Win7.VirtualBox.zip")
        );
    }

    #[tokio::test]
    async fn full_run_and_rerun() {
        let fixtures = tempfile::tempdir().unwrap();
        let body = vbox_zip(fixtures.path());
        let server = TestHttpServer::spawn()
            .await
            .with_file("/vms/IE11.Win7.VirtualBox.zip", body.clone());
        let downloads = tempfile::tempdir().unwrap();
        let descriptor = ImageDescriptor::new(
            server.url("/vms/IE11.Win7.VirtualBox.zip"),
            server.url("/vms/md5.txt"),
        );
        let spec = InstallSpec::new("Linux", "VirtualBox", "IE11 Win7");
        let runner = vbox_runner();
        let p = pipeline(FixedOracle(md5_upper(&body)), runner.clone());

        let report = p
            .run(&spec, &descriptor, downloads.path(), &mut RecordingProgress::default())
            .await
            .unwrap();

        let extracted = downloads.path().join("IE11.Win7.VirtualBox");
        assert_eq!(report.extraction.destination_dir(), extracted);
        assert_eq!(report.vm_path, extracted.join("IE11 - Win7.ova"));
        assert!(report.manual_steps.is_empty());
        assert_eq!(server.hits(), 1);

        // Second run: nothing downloaded, nothing rewritten, imported again.
        let again = p
            .run(&spec, &descriptor, downloads.path(), &mut RecordingProgress::default())
            .await
            .unwrap();
        assert_eq!(again.vm_path, report.vm_path);
        assert_eq!(server.hits(), 1);
        assert_eq!(
            runner
                .calls()
                .iter()
                .filter(|c| c.starts_with("vboxmanage import"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn unsupported_backend_has_no_side_effects() {
        let server = TestHttpServer::spawn().await;
        let downloads = tempfile::tempdir().unwrap();
        let descriptor = ImageDescriptor::new(server.url("/a.zip"), server.url("/a.md5"));
        let runner = Arc::new(FakeRunner::new());

        let failure = pipeline(FixedOracle("x".into()), runner.clone())
            .run(
                &InstallSpec::new("Linux", "Vagrant", "IE11 Win7"),
                &descriptor,
                downloads.path(),
                &mut RecordingProgress::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Resolve);
        assert_eq!(failure.kind(), ErrorKind::UnsupportedBackend);
        assert_eq!(server.hits(), 0);
        assert!(runner.calls().is_empty());
        assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn archive_url_without_extension_fails_at_resolve() {
        let server = TestHttpServer::spawn().await;
        let downloads = tempfile::tempdir().unwrap();
        let descriptor = ImageDescriptor::new(server.url("/vms/download"), server.url("/vms/md5"));

        let failure = pipeline(FixedOracle("x".into()), vbox_runner())
            .run(
                &InstallSpec::new("Linux", "VirtualBox", "IE11 Win7"),
                &descriptor,
                downloads.path(),
                &mut RecordingProgress::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Resolve);
        assert_eq!(failure.kind(), ErrorKind::ArchiveFormat);
        assert_eq!(server.hits(), 0);
        assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn backend_tools_run_off_the_async_thread() {
        let fixtures = tempfile::tempdir().unwrap();
        let body = vbox_zip(fixtures.path());
        let server = TestHttpServer::spawn().await.with_file("/a.zip", body.clone());
        let downloads = tempfile::tempdir().unwrap();
        let descriptor = ImageDescriptor::new(server.url("/a.zip"), server.url("/a.md5"));

        let threads = Arc::new(Mutex::new(Vec::new()));
        let seen = threads.clone();
        let runner = Arc::new(FakeRunner::new().on("vboxmanage", move |_| {
            seen.lock().unwrap().push(std::thread::current().id());
            Ok(CommandOutput::ok("7.0.14\n"))
        }));

        pipeline(FixedOracle(md5_upper(&body)), runner)
            .run(
                &InstallSpec::new("Linux", "VirtualBox", "IE11 Win7"),
                &descriptor,
                downloads.path(),
                &mut RecordingProgress::default(),
            )
            .await
            .unwrap();

        let threads = threads.lock().unwrap();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|id| *id != std::thread::current().id()));
    }

    #[tokio::test]
    async fn checksum_mismatch_stops_before_extraction() {
        let fixtures = tempfile::tempdir().unwrap();
        let body = vbox_zip(fixtures.path());
        let server = TestHttpServer::spawn().await.with_file("/a.zip", body);
        let downloads = tempfile::tempdir().unwrap();
        let descriptor = ImageDescriptor::new(server.url("/a.zip"), server.url("/a.md5"));
        let runner = vbox_runner();

        let failure = pipeline(FixedOracle("NOT-THE-SUM".into()), runner.clone())
            .run(
                &InstallSpec::new("Linux", "VirtualBox", "IE11 Win7"),
                &descriptor,
                downloads.path(),
                &mut RecordingProgress::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Fetch);
        assert_eq!(failure.kind(), ErrorKind::IntegrityMismatch);
        assert!(downloads.path().join("a.zip").exists());
        assert!(!downloads.path().join("a").exists());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn wrong_backend_archive_fails_at_extract_and_keeps_files() {
        let fixtures = tempfile::tempdir().unwrap();
        let body = vbox_zip(fixtures.path());
        let server = TestHttpServer::spawn().await.with_file("/a.zip", body.clone());
        let downloads = tempfile::tempdir().unwrap();
        let descriptor = ImageDescriptor::new(server.url("/a.zip"), server.url("/a.md5"));

        let failure = pipeline(FixedOracle(md5_upper(&body)), Arc::new(FakeRunner::new()))
            .run(
                &InstallSpec::new("Mac", "Parallels", "IE11 Win7"),
                &descriptor,
                downloads.path(),
                &mut RecordingProgress::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Extract);
        assert_eq!(failure.kind(), ErrorKind::EntryPointNotFound);
        assert!(downloads.path().join("a").join("readme.txt").exists());
    }

    #[tokio::test]
    async fn missing_tool_fails_at_check() {
        let fixtures = tempfile::tempdir().unwrap();
        let body = vbox_zip(fixtures.path());
        let server = TestHttpServer::spawn().await.with_file("/a.zip", body.clone());
        let downloads = tempfile::tempdir().unwrap();
        let descriptor = ImageDescriptor::new(server.url("/a.zip"), server.url("/a.md5"));

        let failure = pipeline(FixedOracle(md5_upper(&body)), Arc::new(FakeRunner::new()))
            .run(
                &InstallSpec::new("Linux", "VirtualBox", "IE11 Win7"),
                &descriptor,
                downloads.path(),
                &mut RecordingProgress::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Check);
        assert_eq!(failure.kind(), ErrorKind::ToolMissing);
        assert!(failure.to_string().contains("install the hypervisor command line tools"));
    }
}
