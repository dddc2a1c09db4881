use clap::Parser;
use log::{error, info};
use bluefruit_counter::{init_logging, run, Args};
use bluefruit_counter::error::{AppRunError, ConfigError};

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();
    init_logging(args.log_level);
    info!(concat!("Bluefruit Counter ", env!("CARGO_PKG_VERSION")));

    match run(args) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("This application has already been started");
            Ok(())
        },
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => Ok(())
    }
}
