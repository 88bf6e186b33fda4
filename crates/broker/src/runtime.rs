use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use svckit_core::{BrokerConfig, ServiceError, ServiceResult};

use crate::subscriber::{listen, ListenConfig, Subscriber};

const PID_DIR: &str = "/tmp/service";

/// Record the current process id under `/tmp/service/service_{name}.pid`.
///
/// Fails if the file already exists, which usually means another instance
/// of the service is running on this host.
pub fn register_service_pid(service_name: &str) -> ServiceResult<PathBuf> {
    register_service_pid_in(Path::new(PID_DIR), service_name)
}

pub fn register_service_pid_in(dir: &Path, service_name: &str) -> ServiceResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| {
        ServiceError::config_error(format!("cannot create pid directory {}: {e}", dir.display()))
    })?;

    let path = dir.join(format!("service_{service_name}.pid"));
    if path.exists() {
        return Err(ServiceError::config_error(format!(
            "pid file {} already exists, is another instance running?",
            path.display()
        )));
    }

    fs::write(&path, format!("{}\n", std::process::id())).map_err(|e| {
        ServiceError::config_error(format!("cannot write pid file {}: {e}", path.display()))
    })?;
    info!(pid = std::process::id(), path = %path.display(), "service pid registered");
    Ok(path)
}

/// Run the consume loop until it fails or a ctrl-c arrives, with the
/// service registered in the pid directory for the duration.
///
/// The pid file is removed on every exit path, including listen errors.
pub async fn run_service(
    broker: &BrokerConfig,
    config: ListenConfig,
    subscriber: Subscriber,
) -> ServiceResult<()> {
    let pid_path = register_service_pid(&config.exchange)?;

    let result = tokio::select! {
        outcome = listen(broker, config, subscriber) => outcome,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => warn!("cannot listen for shutdown signal: {e}"),
            }
            Ok(())
        }
    };

    if let Err(e) = fs::remove_file(&pid_path) {
        warn!(path = %pid_path.display(), "cannot remove pid file: {e}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_file_holds_the_current_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = register_service_pid_in(dir.path(), "billing").unwrap();

        assert_eq!(path.file_name().unwrap(), "service_billing.pid");
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim().parse::<u32>().unwrap(), std::process::id());
    }

    #[test]
    fn second_registration_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        register_service_pid_in(dir.path(), "billing").unwrap();

        let err = register_service_pid_in(dir.path(), "billing").unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn services_get_distinct_pid_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = register_service_pid_in(dir.path(), "billing").unwrap();
        let b = register_service_pid_in(dir.path(), "mailer").unwrap();
        assert_ne!(a, b);
    }
}
