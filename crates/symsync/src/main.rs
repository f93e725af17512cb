//! Symsync.
//!
//! Symsync makes the binaries and debug symbols of labeled builds available for offline crash
//! analysis. Artifacts are synced from source control and kept in a local PDB cache, so that
//! repeated analysis of the same build does not fetch them again.

#![warn(missing_debug_implementations, unused_crate_dependencies, clippy::all)]

mod cli;
mod logging;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
