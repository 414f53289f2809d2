//! A libgit2 transport that runs fetches and pushes through an external `ssh`
//! executable.
//!
//! - [`target`]: decomposes the remote URL
//! - [`launcher`]: builds and spawns the ssh command line
//! - [`capture`]: drains the process's stderr into a bounded buffer
//! - [`stream`]: the lazily started, liveness-checked duplex stream
//!
//! [`register`] binds all of it to a URL scheme through
//! [`git2::transport::register`].

mod capture;
mod error;
mod launcher;
mod stream;
mod target;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use git2::transport::Service;
use git2::transport::SmartSubtransport;
use git2::transport::SmartSubtransportStream;
use git2::transport::Transport;
use log::debug;
use log::warn;
use parking_lot::Mutex;

pub use capture::CAPTURE_LIMIT;
pub use capture::ErrorCapture;
pub use error::TransportError;
pub use launcher::LaunchSpec;
pub use launcher::Launcher;
pub use launcher::SystemLauncher;
pub use stream::DEFAULT_CLOSE_GRACE;
pub use stream::MAX_WRITE_CHUNK;
pub use stream::READ_CHUNK;
pub use stream::SshExeStream;
pub use target::ConnectionTarget;

use stream::CloseReport;

/// Schemes already handed to libgit2 in this process.
static REGISTERED: Mutex<Vec<String>> = parking_lot::const_mutex(Vec::new());

// -----------------------------------------------------------------------------
// Options

/// How the transport invokes ssh.
#[derive(Debug, Clone)]
pub struct SshExeOptions {
    /// The ssh executable.
    pub program: PathBuf,
    /// Remote command serving fetches.
    pub upload_pack: String,
    /// Remote command accepting pushes.
    pub receive_pack: String,
    /// How long close waits for ssh to exit before killing it.
    pub close_grace: Duration,
}

impl Default for SshExeOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ssh"),
            upload_pack: "git-upload-pack".to_string(),
            receive_pack: "git-receive-pack".to_string(),
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }
}

impl SshExeOptions {
    /// The remote command serving `service`.
    pub fn remote_command(&self, service: Service) -> &str {
        match service {
            Service::UploadPackLs | Service::UploadPack => &self.upload_pack,
            Service::ReceivePackLs | Service::ReceivePack => &self.receive_pack,
        }
    }
}

// -----------------------------------------------------------------------------
// Registration

/// Route every URL with `scheme` through the ssh executable.
///
/// Registering a scheme that is already registered in this process is a
/// no-op; the options of the first registration stay in effect.
pub fn register(scheme: &str, options: SshExeOptions) -> Result<(), TransportError> {
    register_with(scheme, options, Arc::new(SystemLauncher))
}

pub fn register_with(
    scheme: &str,
    options: SshExeOptions,
    launcher: Arc<dyn Launcher>,
) -> Result<(), TransportError> {
    let mut registered = REGISTERED.lock();
    if registered.iter().any(|s| s == scheme) {
        warn!("transport for {scheme}:// is already registered");
        return Ok(());
    }

    let options = Arc::new(options);
    // SAFETY: registrations are serialized by the REGISTERED lock, and the
    // factory only captures owned, thread-safe state.
    let result = unsafe {
        git2::transport::register(scheme, move |remote| {
            let subtransport = SshExeSubtransport::new(options.clone(), launcher.clone());
            Transport::smart(remote, false, subtransport)
        })
    };
    result.map_err(|err| TransportError::Configuration {
        url: format!("{scheme}://"),
        reason: err.message().to_string(),
    })?;

    debug!("registered ssh executable transport for {scheme}://");
    registered.push(scheme.to_string());
    Ok(())
}

// -----------------------------------------------------------------------------
// SshExeSubtransport

/// The per-connection object libgit2 asks for streams.
///
/// The transport is registered as non-RPC, so libgit2 asks for a stream only
/// for the advertisement services and reuses it for the negotiation that
/// follows.
pub struct SshExeSubtransport {
    options: Arc<SshExeOptions>,
    launcher: Arc<dyn Launcher>,
    close_report: CloseReport,
}

impl SshExeSubtransport {
    pub fn new(options: Arc<SshExeOptions>, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            options,
            launcher,
            close_report: CloseReport::default(),
        }
    }

    /// Build the (not yet started) stream for `url`.
    pub fn open(&self, url: &str, service: Service) -> Result<SshExeStream, TransportError> {
        let target = ConnectionTarget::parse(url)?;
        let spec = LaunchSpec::new(
            &self.options.program,
            &target,
            self.options.remote_command(service),
        );
        Ok(SshExeStream::new(spec, self.launcher.clone())
            .with_close_grace(self.options.close_grace)
            .with_close_report(self.close_report.clone()))
    }

    /// The first close error recorded by a stream of this subtransport.
    pub fn take_close_error(&self) -> Option<TransportError> {
        self.close_report.lock().take()
    }
}

impl SmartSubtransport for SshExeSubtransport {
    fn action(
        &self,
        url: &str,
        action: Service,
    ) -> Result<Box<dyn SmartSubtransportStream>, git2::Error> {
        Ok(Box::new(self.open(url, action)?))
    }

    fn close(&self) -> Result<(), git2::Error> {
        match self.take_close_error() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}
