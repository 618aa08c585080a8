use clap::Parser;

mod app;
mod opts;
mod shell;

fn main() {
    let opts = opts::Opt::parse();

    let log_level_filter = if opts.debug { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::init_timed();
    } else {
        pretty_env_logger::formatted_timed_builder()
            .filter(Some("traybar"), log_level_filter)
            .filter(Some("xembed_host"), log_level_filter)
            .init();
    }

    if let Err(err) = app::run(opts) {
        log::error!("traybar exiting with error: {:?}", err);
        std::process::exit(1);
    }
}
