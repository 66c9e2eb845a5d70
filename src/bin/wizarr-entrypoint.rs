fn main() {
    if let Err(err) = wizarr_entrypoint::cli::run() {
        log::error!("{:#}", err);
        std::process::exit(wizarr_entrypoint::cli::exit_code(&err));
    }
}
