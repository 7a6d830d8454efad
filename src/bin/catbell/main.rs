//! catbell entrypoint: parse flags, install logging, hand over to the device
//! startup path.

use catbell::{init_tracing, run_device, AppConfig};
use std::process;
use tracing::error;

fn main() {
    let config = match AppConfig::parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("catbell: {err:#}");
            process::exit(2);
        }
    };
    init_tracing(&config);

    if let Err(err) = run_device(&config) {
        error!("fatal: {err:#}");
        eprintln!("catbell: {err:#}");
        process::exit(1);
    }
}
