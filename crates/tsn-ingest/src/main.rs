//! tsn-ingest CLI: ingest a catalog of spreadsheet sources into streams.

use std::process::ExitCode;

use tsn_ingest::Application;

fn main() -> ExitCode {
    Application::run()
}
