use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

const DEFAULT_FILTER: &str = "warn,artist_audio_tools=info,artist_audio=info";

/// Initialise env_logger. `RUST_LOG` overrides the default filter;
/// `verbose` lifts our own modules to debug.
pub fn init_logger(verbose: bool) {
    let env = Env::default().filter_or("RUST_LOG", DEFAULT_FILTER);
    let mut builder = Builder::from_env(env);

    builder
        .filter_module("symphonia", LevelFilter::Warn)
        .filter_module("symphonia_core", LevelFilter::Warn)
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("mio", LevelFilter::Error);

    if verbose {
        builder.filter_module("artist_audio_tools", LevelFilter::Debug);
    }

    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr);

    // Повторная инициализация (например, в тестах) не должна паниковать
    let _ = builder.try_init();
}
