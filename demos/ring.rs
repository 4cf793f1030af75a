//! Ring traffic demo.
//!
//! Builds a 4-router ring, seeds three sources with shift-by-2 traffic and
//! prints the end-of-run report. Pass `-d` for a per-cycle pipeline trace.
//!
//! Run with: `cargo run --example ring -- [-d]`

use nocsim::{Sim, SimConfigBuilder};

fn main() {
    let debug = std::env::args().any(|arg| arg == "-d");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(if debug { "trace" } else { "warn" })
            }),
        )
        .with_target(false)
        .without_time()
        .init();

    let config = SimConfigBuilder::new()
        .ring(4)
        .input_buf_size(8)
        .packet_length(4)
        .packets_per_source(4)
        .max_time(10_000)
        .build()
        .expect("demo config is valid");

    let mut sim = Sim::from_config(&config).expect("demo sim builds");
    sim.start_source(0);
    sim.start_source(1);
    sim.start_source(2);
    sim.run();

    let report = sim.report();
    print!("{}", report.summary());
}
