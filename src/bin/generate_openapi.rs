//! Prints the OpenAPI spec as JSON, for frontend client generation.
//!
//! Usage: `cargo run --bin generate_openapi > openapi.json`

use std::io::{self, Write};

use air_monitor_service::api::handlers::ApiDoc;
use utoipa::OpenApi;

fn main() {
    let json = ApiDoc::openapi()
        .to_pretty_json()
        .expect("Failed to serialise OpenAPI spec");

    io::stdout()
        .write_all(json.as_bytes())
        .expect("Failed to write to stdout");
}
