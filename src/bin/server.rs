//! canon-fusion retrieval server.
//! Run with: cargo run --bin canon-fusion-server

use std::process::ExitCode;

use canon_fusion::start_canon_fusion;

fn main() -> ExitCode {
    start_canon_fusion::run()
}
