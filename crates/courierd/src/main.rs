use std::process::ExitCode;
use std::sync::Arc;

use courier_core::Dispatcher;
use courierd::{SystemConfigLoader, bootstrap_with};

fn main() -> ExitCode {
    let dispatcher = Arc::new(Dispatcher::builder().build());
    let mut daemon = match bootstrap_with(&SystemConfigLoader, dispatcher) {
        Ok(daemon) => daemon,
        Err(error) => {
            eprintln!("courierd: {error}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = daemon.serve() {
        eprintln!("courierd: {error}");
        return ExitCode::FAILURE;
    }
    match daemon.wait() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("courierd: {error}");
            ExitCode::FAILURE
        }
    }
}
