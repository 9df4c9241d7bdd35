//! pwclient binary entry point.

use std::process::ExitCode;

// Network requests run strictly one at a time, so a single-threaded
// runtime is all the binary needs.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match pwclient::cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            pwclient::ui::error(format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}
