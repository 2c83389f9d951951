use chrono::Local;
use env_logger::Builder;
use std::io::Write;

/// Used when neither `--log-level` nor `RUST_LOG` is set. Dependencies only
/// report warnings.
const DEFAULT_FILTER: &str = "warn,fad_drift=info";

/// Initialise the global logger.
///
/// `level` accepts anything `RUST_LOG` does (`debug`,
/// `fad_drift::field=trace,info`). A bare level applies to this crate only.
pub fn init_logging(level: Option<&str>) {
    let spec = filter_spec(level, std::env::var("RUST_LOG").ok().as_deref());

    Builder::new()
        .parse_filters(&spec)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5} {}] {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                module_name(record.target()),
                record.args()
            )
        })
        .init();
    log::debug!("Logger initialized with filter {:?}", spec);
}

fn filter_spec(flag: Option<&str>, env: Option<&str>) -> String {
    match flag.map(str::trim).filter(|s| !s.is_empty()) {
        Some(level) if level.parse::<log::LevelFilter>().is_ok() => {
            format!("warn,fad_drift={}", level)
        }
        Some(spec) => spec.to_string(),
        None => env
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_FILTER)
            .to_string(),
    }
}

/// `fad_drift::field::fieldset` prints as `field::fieldset`.
fn module_name(target: &str) -> &str {
    target.strip_prefix("fad_drift::").unwrap_or(target)
}
