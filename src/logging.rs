use std::{fs::File, sync::Mutex};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Env var naming a file that receives every event as a JSON line.
pub const TRACE_FILE_ENV: &str = "JIRA_SYNC_TRACE_FILE";

/// Human-readable events go to stderr; filter from `RUST_LOG`, else the directives embedded at build time, else `info`.
pub fn init_subscriber() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(option_env!("LOG_DIRECTIVES").unwrap_or("info")));

	let trace_file = std::env::var_os(TRACE_FILE_ENV).and_then(|path| match File::create(&path) {
		Ok(file) => Some(file),
		Err(e) => {
			eprintln!("[jira_sync] could not open trace file {}: {e}", path.to_string_lossy());
			None
		}
	});
	let json_layer = trace_file.map(|file| fmt::layer().json().with_writer(Mutex::new(file)));

	let _ = tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_writer(std::io::stderr).with_target(false))
		.with(json_layer)
		.try_init();
}
