use std::process::ExitCode;

use rfb::RfbConnector;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // stdout is for confirmations only
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let result = match vnc_control::parse_args(std::env::args_os()) {
        Ok(args) => vnc_control::execute(&args, &RfbConnector, &mut std::io::stdout()).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = vnc_control::report(&e, &mut std::io::stdout(), &mut std::io::stderr());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
